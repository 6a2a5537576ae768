//! Speech device abstraction.
//!
//! The playback controller is the only client of a [`SpeechDevice`]. Two
//! in-process devices live here: [`NullSpeechDevice`] for hosts without
//! speech output and [`MemorySpeechDevice`] for headless runs and tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use speakpal_core::config::SpeechConfig;
use speakpal_core::error::SpeakPalError;
use uuid::Uuid;

/// Delivery parameters applied to every utterance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryParams {
    /// Rate multiplier; 1.0 is the engine's normal speed.
    pub rate: f32,
    /// Pitch multiplier; 1.0 is the engine default.
    pub pitch: f32,
    /// Volume from 0.0 to 1.0.
    pub volume: f32,
}

impl Default for DeliveryParams {
    /// Slightly slower than normal for clarity, default pitch, full volume.
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl From<&SpeechConfig> for DeliveryParams {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

/// One playable unit of synthesized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    pub params: DeliveryParams,
}

impl Utterance {
    pub fn new(text: impl Into<String>, params: DeliveryParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            params,
        }
    }
}

/// Callback a device invokes when an utterance finishes on its own.
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// Capability interface over a text-to-speech engine.
///
/// Implementations hold at most the utterances they were handed; the
/// playback controller guarantees it cancels before speaking again.
pub trait SpeechDevice: Send + Sync {
    /// Whether the device can produce speech at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Start speaking `utterance`, calling `on_end` once it ends naturally.
    fn speak(&self, utterance: &Utterance, on_end: CompletionFn) -> Result<(), SpeakPalError>;

    /// Cancel whatever the device is currently speaking. Idempotent.
    fn cancel(&self);
}

// =============================================================================
// NullSpeechDevice
// =============================================================================

/// Device for hosts with no speech output. Reports itself unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSpeechDevice;

impl SpeechDevice for NullSpeechDevice {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(&self, _utterance: &Utterance, _on_end: CompletionFn) -> Result<(), SpeakPalError> {
        Err(SpeakPalError::Speech("speech output is unavailable".to_string()))
    }

    fn cancel(&self) {}
}

// =============================================================================
// MemorySpeechDevice
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    active: Option<(Utterance, CompletionFn)>,
    spoken: Vec<Utterance>,
    overlaps: usize,
    cancels: usize,
}

/// Headless device that keeps utterances in memory.
///
/// Speech never ends by itself: call [`MemorySpeechDevice::finish`] to
/// simulate the natural end of the active utterance. With
/// `notify_on_cancel` set, cancelling also fires the completion callback,
/// the way browser engines report an end event for cancelled speech.
#[derive(Default)]
pub struct MemorySpeechDevice {
    inner: Mutex<MemoryInner>,
    notify_on_cancel: bool,
}

impl std::fmt::Debug for MemorySpeechDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemorySpeechDevice")
            .field("active", &inner.active.as_ref().map(|(u, _)| u.id))
            .field("spoken", &inner.spoken.len())
            .field("overlaps", &inner.overlaps)
            .field("cancels", &inner.cancels)
            .field("notify_on_cancel", &self.notify_on_cancel)
            .finish()
    }
}

impl MemorySpeechDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire completion callbacks for cancelled utterances as well.
    pub fn notify_on_cancel(mut self, notify: bool) -> Self {
        self.notify_on_cancel = notify;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The utterance currently being spoken.
    pub fn active(&self) -> Option<Utterance> {
        self.lock().active.as_ref().map(|(u, _)| u.clone())
    }

    /// Every utterance handed to the device, oldest first.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.lock().spoken.clone()
    }

    /// How many times `speak` arrived while another utterance was active.
    pub fn overlaps(&self) -> usize {
        self.lock().overlaps
    }

    /// How many times `cancel` was called.
    pub fn cancels(&self) -> usize {
        self.lock().cancels
    }

    /// End the active utterance naturally. Returns `false` when silent.
    pub fn finish(&self) -> bool {
        let taken = self.lock().active.take();
        match taken {
            Some((_, on_end)) => {
                on_end();
                true
            }
            None => false,
        }
    }
}

impl SpeechDevice for MemorySpeechDevice {
    fn speak(&self, utterance: &Utterance, on_end: CompletionFn) -> Result<(), SpeakPalError> {
        let mut inner = self.lock();
        if inner.active.is_some() {
            inner.overlaps += 1;
        }
        inner.spoken.push(utterance.clone());
        inner.active = Some((utterance.clone(), on_end));
        Ok(())
    }

    fn cancel(&self) {
        let taken = {
            let mut inner = self.lock();
            inner.cancels += 1;
            inner.active.take()
        };
        if let Some((_, on_end)) = taken {
            if self.notify_on_cancel {
                on_end();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
