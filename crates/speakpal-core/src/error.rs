use thiserror::Error;

/// Top-level error type for SpeakPal.
///
/// Subsystem crates define their own error types and implement
/// `From<SpeakPalError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpeakPalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Speech device error: {0}")]
    Speech(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for SpeakPalError {
    fn from(err: toml::de::Error) -> Self {
        SpeakPalError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SpeakPalError {
    fn from(err: toml::ser::Error) -> Self {
        SpeakPalError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SpeakPalError {
    fn from(err: serde_json::Error) -> Self {
        SpeakPalError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for SpeakPal operations.
pub type Result<T> = std::result::Result<T, SpeakPalError>;
