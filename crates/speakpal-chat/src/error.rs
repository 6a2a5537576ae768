//! Error types for the chat session.

use speakpal_core::error::SpeakPalError;

/// Errors from the chat session.
///
/// `EmptyMessage` and `Busy` are silent rejections: nothing changed and the
/// caller is free to ignore them.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("a reply is already being prepared")]
    Busy,
    #[error("chat session is closed")]
    Closed,
    #[error("speech error: {0}")]
    Speech(String),
    #[error("core error: {0}")]
    Core(String),
}

impl ChatError {
    /// Whether this is one of the silent submission rejections.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::Busy)
    }
}

impl From<SpeakPalError> for ChatError {
    fn from(err: SpeakPalError) -> Self {
        match err {
            SpeakPalError::Speech(msg) | SpeakPalError::Playback(msg) => ChatError::Speech(msg),
            SpeakPalError::ShuttingDown => ChatError::Closed,
            other => ChatError::Core(other.to_string()),
        }
    }
}
