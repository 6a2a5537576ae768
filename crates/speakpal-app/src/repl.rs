//! Terminal front end: input commands and message rendering.

use chrono::Local;
use speakpal_core::types::{Message, MessageId, Role};

pub const HELP: &str = "\
Type a message and press Enter to chat.
Commands:
  /stop         stop reading the current reply
  /replay [n]   read the n-th assistant message again (default: latest)
  /history      show the conversation so far
  /export       print the conversation as JSON
  /help         show this help
  /quit         leave";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to submit, verbatim.
    Say(String),
    Stop,
    /// 1-based index into the assistant messages; `None` means the latest.
    Replay(Option<usize>),
    History,
    Export,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', type /help for a list")]
    Unknown(String),
    #[error("'{0}' is not a message number")]
    BadIndex(String),
}

impl Command {
    /// Parse a line. Anything not starting with `/` is chat text.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        match name.as_str() {
            "stop" => Ok(Command::Stop),
            "replay" => match parts.next() {
                None => Ok(Command::Replay(None)),
                Some(n) => match n.parse::<usize>() {
                    Ok(i) if i > 0 => Ok(Command::Replay(Some(i))),
                    _ => Err(CommandError::BadIndex(n.to_string())),
                },
            },
            "history" => Ok(Command::History),
            "export" => Ok(Command::Export),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err(CommandError::Unknown(trimmed.to_string())),
        }
    }
}

/// Id of the assistant message a `/replay` refers to.
pub fn replay_target(messages: &[Message], index: Option<usize>) -> Option<MessageId> {
    let mut assistant = messages.iter().filter(|m| m.is_assistant());
    match index {
        None => assistant.last(),
        Some(n) => assistant.nth(n.checked_sub(1)?),
    }
    .map(|m| m.id)
}

/// One message as shown in the transcript.
pub fn render_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::Assistant => "SpeakPal",
        Role::User => "You",
    };
    let time = message
        .timestamp
        .to_datetime()
        .with_timezone(&Local)
        .format("%H:%M");
    format!("[{time}] {speaker}: {}", message.content)
}

/// The whole log with assistant messages numbered for `/replay`.
pub fn render_history(messages: &[Message]) -> String {
    let mut n = 0;
    messages
        .iter()
        .map(|m| {
            if m.is_assistant() {
                n += 1;
                format!("#{n} {}", render_message(m))
            } else {
                format!("   {}", render_message(m))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
