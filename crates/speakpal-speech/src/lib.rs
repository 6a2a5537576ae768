//! SpeakPal speech crate - playback state machine, controller, and speech devices.
//!
//! The `PlaybackController` owns a single utterance slot on a `SpeechDevice`
//! and moves it through Idle -> Speaking -> Idle. Devices that cannot speak
//! turn every controller operation into a no-op.

pub mod command;
pub mod controller;
pub mod device;
pub mod state;

pub use command::{CommandSpeechDevice, ProgramKind, SpeechProgram};
pub use controller::PlaybackController;
pub use device::{
    CompletionFn, DeliveryParams, MemorySpeechDevice, NullSpeechDevice, SpeechDevice, Utterance,
};
pub use state::{PlaybackSlot, PlaybackState};
