//! Playback controller managing the lifecycle of a single spoken utterance.
//!
//! The controller owns the device's single-utterance slot: every `speak`
//! cancels whatever was playing before starting anew, `stop` releases the
//! slot, and dropping the controller cancels any speech still running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use speakpal_core::events::SessionEvent;
use speakpal_core::types::Timestamp;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::device::{CompletionFn, DeliveryParams, SpeechDevice, Utterance};
use crate::state::{PlaybackSlot, PlaybackState};

/// Drives a [`SpeechDevice`] through the idle/speaking state machine.
///
/// When the device reports itself unavailable every operation is a no-op.
pub struct PlaybackController {
    device: Arc<dyn SpeechDevice>,
    slot: PlaybackSlot,
    params: DeliveryParams,
    events: Option<broadcast::Sender<SessionEvent>>,
    /// Serializes device access across speak/stop/shutdown.
    ops: Mutex<()>,
    /// Set by `shutdown` under `ops`; no utterance starts afterwards.
    closed: AtomicBool,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("available", &self.device.is_available())
            .field("slot", &self.slot)
            .field("params", &self.params)
            .finish()
    }
}

fn emit(events: &Option<broadcast::Sender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = events {
        // No subscribers is fine.
        let _ = tx.send(event);
    }
}

impl PlaybackController {
    /// Create a controller over `device` with the default delivery parameters.
    pub fn new(device: Arc<dyn SpeechDevice>) -> Self {
        Self {
            device,
            slot: PlaybackSlot::new(),
            params: DeliveryParams::default(),
            events: None,
            ops: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Use `params` for every utterance created from now on.
    pub fn with_params(mut self, params: DeliveryParams) -> Self {
        self.params = params;
        self
    }

    /// Publish playback events on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether `shutdown` has run.
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the underlying device can speak.
    pub fn is_available(&self) -> bool {
        self.device.is_available()
    }

    /// Returns the current playback state.
    pub fn current_state(&self) -> PlaybackState {
        self.slot.current()
    }

    /// Returns the id of the utterance being spoken, if any.
    pub fn active_utterance(&self) -> Option<Uuid> {
        self.slot.active()
    }

    pub fn params(&self) -> DeliveryParams {
        self.params
    }

    /// Speak `text`, cancelling any utterance that is still playing.
    ///
    /// Returns the id of the new utterance, or `None` when the device is
    /// unavailable or refused to start.
    pub fn speak(&self, text: &str) -> Option<Uuid> {
        if !self.device.is_available() {
            tracing::debug!("Speech device unavailable, skipping playback");
            return None;
        }
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("Playback shut down, skipping utterance");
            return None;
        }

        let utterance = Utterance::new(text, self.params);
        let id = utterance.id;

        // Claim the slot first so a late completion from the superseded
        // utterance no longer matches.
        let superseded = self.slot.begin(id);
        self.device.cancel();
        if let Some(prev) = superseded {
            tracing::debug!(utterance_id = %prev, "Utterance preempted");
            emit(
                &self.events,
                SessionEvent::PlaybackStopped {
                    utterance_id: prev,
                    timestamp: Timestamp::now(),
                },
            );
        }

        emit(
            &self.events,
            SessionEvent::PlaybackStarted {
                utterance_id: id,
                timestamp: Timestamp::now(),
            },
        );

        let slot = self.slot.clone();
        let events = self.events.clone();
        let on_end: CompletionFn = Box::new(move || {
            if slot.finish(id) {
                tracing::debug!(utterance_id = %id, "Utterance finished");
                emit(
                    &events,
                    SessionEvent::PlaybackFinished {
                        utterance_id: id,
                        timestamp: Timestamp::now(),
                    },
                );
            }
        });

        match self.device.speak(&utterance, on_end) {
            Ok(()) => {
                tracing::info!(
                    utterance_id = %id,
                    chars = utterance.text.chars().count(),
                    rate = utterance.params.rate,
                    "Utterance started"
                );
                Some(id)
            }
            Err(e) => {
                tracing::warn!(utterance_id = %id, error = %e, "Speech device refused utterance");
                self.slot.abandon(id);
                emit(
                    &self.events,
                    SessionEvent::PlaybackStopped {
                        utterance_id: id,
                        timestamp: Timestamp::now(),
                    },
                );
                None
            }
        }
    }

    /// Re-speak any text, typically an earlier assistant message.
    pub fn replay(&self, text: &str) -> Option<Uuid> {
        self.speak(text)
    }

    /// Cancel the active utterance. Returns `false` when already idle.
    pub fn stop(&self) -> bool {
        if !self.device.is_available() {
            return false;
        }
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);

        match self.slot.stop() {
            Some(id) => {
                self.device.cancel();
                tracing::info!(utterance_id = %id, "Utterance stopped");
                emit(
                    &self.events,
                    SessionEvent::PlaybackStopped {
                        utterance_id: id,
                        timestamp: Timestamp::now(),
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Release the device slot unconditionally and refuse further speech.
    ///
    /// Called on teardown; also runs when the controller is dropped.
    pub fn shutdown(&self) {
        if !self.device.is_available() {
            return;
        }
        let _ops = self.ops.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::Release);

        let taken = self.slot.stop();
        self.device.cancel();
        if let Some(id) = taken {
            tracing::info!(utterance_id = %id, "Utterance cancelled on shutdown");
            emit(
                &self.events,
                SessionEvent::PlaybackStopped {
                    utterance_id: id,
                    timestamp: Timestamp::now(),
                },
            );
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Tests
// =============================================================================
