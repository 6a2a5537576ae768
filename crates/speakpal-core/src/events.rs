use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Message, Timestamp};

/// Why a submission was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Input was empty or whitespace only.
    Empty,
    /// Another submission is still waiting for its reply.
    InFlight,
}

/// Everything the rendering layer may want to react to during a session.
///
/// Events are broadcast by the chat session and the playback controller
/// after the corresponding state change has been applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    // =========================================================================
    // Conversation
    // =========================================================================
    /// A message was appended to the conversation log.
    MessageAppended {
        message: Message,
        timestamp: Timestamp,
    },

    /// A submission was accepted and the reply is being prepared.
    ProcessingStarted {
        session_id: Uuid,
        timestamp: Timestamp,
    },

    /// The pending reply was appended and the in-flight guard cleared.
    ProcessingFinished {
        session_id: Uuid,
        timestamp: Timestamp,
    },

    /// A submission was silently rejected.
    SubmissionRejected {
        reason: RejectReason,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Playback
    // =========================================================================
    /// A new utterance became the active one.
    PlaybackStarted {
        utterance_id: Uuid,
        timestamp: Timestamp,
    },

    /// The active utterance was cancelled by the user or on teardown.
    PlaybackStopped {
        utterance_id: Uuid,
        timestamp: Timestamp,
    },

    /// The active utterance reached its natural end.
    PlaybackFinished {
        utterance_id: Uuid,
        timestamp: Timestamp,
    },
}

impl SessionEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SessionEvent::MessageAppended { timestamp, .. }
            | SessionEvent::ProcessingStarted { timestamp, .. }
            | SessionEvent::ProcessingFinished { timestamp, .. }
            | SessionEvent::SubmissionRejected { timestamp, .. }
            | SessionEvent::PlaybackStarted { timestamp, .. }
            | SessionEvent::PlaybackStopped { timestamp, .. }
            | SessionEvent::PlaybackFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::MessageAppended { .. } => "message_appended",
            SessionEvent::ProcessingStarted { .. } => "processing_started",
            SessionEvent::ProcessingFinished { .. } => "processing_finished",
            SessionEvent::SubmissionRejected { .. } => "submission_rejected",
            SessionEvent::PlaybackStarted { .. } => "playback_started",
            SessionEvent::PlaybackStopped { .. } => "playback_stopped",
            SessionEvent::PlaybackFinished { .. } => "playback_finished",
        }
    }
}
