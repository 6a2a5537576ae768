//! Playback state machine guarding the single active-utterance slot.
//!
//! Valid transitions:
//! - Idle -> Speaking (speak)
//! - Speaking -> Speaking (speak preempts the active utterance)
//! - Speaking -> Idle (natural end, stop, teardown)

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use speakpal_core::error::SpeakPalError;
use uuid::Uuid;

/// Operational state of the playback controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Nothing is being spoken.
    #[default]
    Idle,
    /// One utterance is active on the device.
    Speaking,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Speaking => write!(f, "Speaking"),
        }
    }
}

impl PlaybackState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &PlaybackState) -> bool {
        matches!(
            (self, target),
            (PlaybackState::Idle, PlaybackState::Speaking)
                | (PlaybackState::Speaking, PlaybackState::Idle)
                // Preemption by a new utterance
                | (PlaybackState::Speaking, PlaybackState::Speaking)
        )
    }
}

#[derive(Debug, Default)]
struct SlotInner {
    state: PlaybackState,
    active: Option<Uuid>,
}

/// Shared slot holding the playback state and the active utterance id.
///
/// State and utterance identity live under one mutex so that a completion
/// notification can compare its utterance id and transition atomically.
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl PlaybackSlot {
    /// Create a new slot initialized to `Idle` with no active utterance.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    pub fn current(&self) -> PlaybackState {
        self.lock().state
    }

    /// Returns the id of the active utterance, if any.
    pub fn active(&self) -> Option<Uuid> {
        self.lock().active
    }

    /// Attempt to transition to the target state without touching the
    /// active utterance.
    pub fn transition(&self, target: PlaybackState) -> Result<(), SpeakPalError> {
        let mut inner = self.lock();
        Self::apply(&mut inner, target)
    }

    fn apply(inner: &mut SlotInner, target: PlaybackState) -> Result<(), SpeakPalError> {
        if inner.state.can_transition_to(&target) {
            tracing::debug!("Playback state: {} -> {}", inner.state, target);
            inner.state = target;
            Ok(())
        } else {
            Err(SpeakPalError::Playback(format!(
                "Invalid state transition: {} -> {}",
                inner.state, target
            )))
        }
    }

    /// Make `id` the active utterance and enter `Speaking`.
    ///
    /// Returns the utterance that was superseded, if one was active.
    pub fn begin(&self, id: Uuid) -> Option<Uuid> {
        let mut inner = self.lock();
        // Idle -> Speaking and Speaking -> Speaking are both valid.
        let _ = Self::apply(&mut inner, PlaybackState::Speaking);
        inner.active.replace(id)
    }

    /// Record the natural end of utterance `id`.
    ///
    /// Only applies when `id` is still the active utterance; returns whether
    /// the slot went back to `Idle`.
    pub fn finish(&self, id: Uuid) -> bool {
        let mut inner = self.lock();
        if inner.active != Some(id) {
            return false;
        }
        inner.active = None;
        Self::apply(&mut inner, PlaybackState::Idle).is_ok()
    }

    /// Release the active utterance, returning it. `None` when already idle.
    pub fn stop(&self) -> Option<Uuid> {
        let mut inner = self.lock();
        if inner.state == PlaybackState::Idle {
            return None;
        }
        let taken = inner.active.take();
        let _ = Self::apply(&mut inner, PlaybackState::Idle);
        taken
    }

    /// Abandon `id` if it is still active (used when the device refused it).
    pub fn abandon(&self, id: Uuid) {
        let mut inner = self.lock();
        if inner.active == Some(id) {
            inner.active = None;
            let _ = Self::apply(&mut inner, PlaybackState::Idle);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PlaybackState::Idle.to_string(), "Idle");
        assert_eq!(PlaybackState::Speaking.to_string(), "Speaking");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(PlaybackState::Idle.can_transition_to(&PlaybackState::Speaking));
        assert!(PlaybackState::Speaking.can_transition_to(&PlaybackState::Idle));
        assert!(PlaybackState::Speaking.can_transition_to(&PlaybackState::Speaking));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!PlaybackState::Idle.can_transition_to(&PlaybackState::Idle));
    }

    #[test]
    fn test_slot_initial_state() {
        let slot = PlaybackSlot::new();
        assert_eq!(slot.current(), PlaybackState::Idle);
        assert!(slot.active().is_none());
    }

    #[test]
    fn test_begin_then_finish() {
        let slot = PlaybackSlot::new();
        let id = Uuid::new_v4();

        assert!(slot.begin(id).is_none());
        assert_eq!(slot.current(), PlaybackState::Speaking);
        assert_eq!(slot.active(), Some(id));

        assert!(slot.finish(id));
        assert_eq!(slot.current(), PlaybackState::Idle);
        assert!(slot.active().is_none());
    }

    #[test]
    fn test_begin_preempts_previous() {
        let slot = PlaybackSlot::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        slot.begin(first);
        assert_eq!(slot.begin(second), Some(first));
        assert_eq!(slot.current(), PlaybackState::Speaking);
        assert_eq!(slot.active(), Some(second));
    }

    #[test]
    fn test_stale_finish_is_ignored() {
        let slot = PlaybackSlot::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        slot.begin(first);
        slot.begin(second);
        assert!(!slot.finish(first));
        assert_eq!(slot.current(), PlaybackState::Speaking);
        assert_eq!(slot.active(), Some(second));
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let slot = PlaybackSlot::new();
        assert!(slot.stop().is_none());
        assert_eq!(slot.current(), PlaybackState::Idle);
    }

    #[test]
    fn test_stop_releases_active() {
        let slot = PlaybackSlot::new();
        let id = Uuid::new_v4();
        slot.begin(id);
        assert_eq!(slot.stop(), Some(id));
        assert_eq!(slot.current(), PlaybackState::Idle);
        assert!(!slot.finish(id));
    }

    #[test]
    fn test_abandon_only_matching_id() {
        let slot = PlaybackSlot::new();
        let id = Uuid::new_v4();
        slot.begin(id);
        slot.abandon(Uuid::new_v4());
        assert_eq!(slot.current(), PlaybackState::Speaking);
        slot.abandon(id);
        assert_eq!(slot.current(), PlaybackState::Idle);
    }

    #[test]
    fn test_transition_error_message() {
        let slot = PlaybackSlot::new();
        match slot.transition(PlaybackState::Idle) {
            Err(SpeakPalError::Playback(msg)) => {
                assert!(msg.contains("Idle -> Idle"));
            }
            _ => panic!("Expected Playback error variant"),
        }
    }

    #[test]
    fn test_slot_clone_is_shared() {
        let a = PlaybackSlot::new();
        let b = a.clone();
        a.begin(Uuid::new_v4());
        assert_eq!(b.current(), PlaybackState::Speaking);
    }
}
