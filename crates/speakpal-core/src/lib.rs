pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::SpeakPalConfig;
pub use error::{Result, SpeakPalError};
pub use events::{RejectReason, SessionEvent};
pub use types::*;
