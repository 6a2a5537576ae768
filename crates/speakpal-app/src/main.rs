//! SpeakPal application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing on stderr
//! 3. Pick a speech device and build the chat session
//! 4. Run the line-based chat loop until /quit, end of input, or Ctrl-C

mod cli;
mod repl;

use std::sync::Arc;

use clap::Parser;
use speakpal_chat::{ChatError, ChatSession, RandomSource, SeededRandom, ThreadRandom};
use speakpal_core::config::SpeechConfig;
use speakpal_core::types::Role;
use speakpal_core::SessionEvent;
use speakpal_speech::{CommandSpeechDevice, NullSpeechDevice, SpeechDevice};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use cli::CliArgs;
use repl::{render_history, render_message, replay_target, Command, HELP};

/// Pick the speech device for the configured engine.
fn speech_device(speech: &SpeechConfig) -> Arc<dyn SpeechDevice> {
    if !speech.enabled || speech.engine == "none" {
        tracing::info!("Speech output disabled");
        return Arc::new(NullSpeechDevice);
    }
    Arc::new(CommandSpeechDevice::detect(
        &speech.engine,
        speech.voice.clone(),
    ))
}

/// Print session events that matter to the person at the terminal.
fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::ProcessingStarted { .. } => println!("SpeakPal is thinking..."),
        SessionEvent::MessageAppended { message, .. } if message.role == Role::Assistant => {
            println!("{}", render_message(message));
        }
        other => tracing::trace!(event = other.event_name(), "Session event"),
    }
}

/// Handle one input line. Returns `false` when the loop should end.
fn handle_line(session: &ChatSession, line: &str) -> bool {
    let command = match Command::parse(line) {
        Ok(c) => c,
        Err(e) => {
            println!("{e}");
            return true;
        }
    };

    match command {
        Command::Say(text) => match session.submit(&text) {
            Ok(_pending) => {}
            Err(e) if e.is_rejection() => {
                tracing::debug!(error = %e, "Input ignored");
            }
            Err(ChatError::Closed) => return false,
            Err(e) => tracing::warn!(error = %e, "Submission failed"),
        },
        Command::Stop => {
            if !session.stop() {
                tracing::debug!("Nothing to stop");
            }
        }
        Command::Replay(index) => match replay_target(&session.messages(), index) {
            Some(id) => {
                if !session.replay(id) {
                    println!("(speech is not available)");
                }
            }
            None => println!("No such assistant message."),
        },
        Command::History => println!("{}", render_history(&session.messages())),
        Command::Export => match serde_json::to_string_pretty(&session.messages()) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "Export failed"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing so its log level can seed the filter;
    // a load error is logged once the subscriber is up.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = cli::load_config(&config_file);

    // Tracing. Logs go to stderr; stdout carries the conversation.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    tracing::info!("Starting SpeakPal v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
        None => tracing::debug!(path = %config_file.display(), "Configuration resolved"),
    }

    config.chat.response_latency_ms = args.resolve_latency_ms(config.chat.response_latency_ms);
    config.speech.enabled = args.resolve_speech_enabled(config.speech.enabled);

    let random: Arc<dyn RandomSource> = match args.seed {
        Some(seed) => Arc::new(SeededRandom::new(seed)),
        None => Arc::new(ThreadRandom),
    };

    let session = ChatSession::builder()
        .config(&config)
        .device(speech_device(&config.speech))
        .random(random)
        .build();
    let mut events = session.subscribe();

    for message in session.messages() {
        println!("{}", render_message(&message));
    }
    println!("(type /help for commands)");
    tracing::debug!(
        session_id = %session.session_id(),
        latency_ms = session.latency().as_millis() as u64,
        speech = session.speech_available(),
        "Chat loop starting"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(&session, &line) {
                        break;
                    }
                }
                None => {
                    tracing::debug!("End of input");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => render_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown();
    tracing::info!("SpeakPal stopped");
    Ok(())
}
