use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the person using the widget.
    User,
    /// Reply produced by the response engine.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Reply category selected by the classifier.
///
/// `Fallback` has no canned text; its reply is templated from the input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Greeting,
    Introduction,
    Capabilities,
    Limitations,
    Language,
    Education,
    Technology,
    Fallback,
}

impl Category {
    /// All categories, in matching priority order, with `Fallback` last.
    pub const ALL: [Category; 8] = [
        Category::Greeting,
        Category::Introduction,
        Category::Capabilities,
        Category::Limitations,
        Category::Language,
        Category::Education,
        Category::Technology,
        Category::Fallback,
    ];

    /// Stable snake_case name used in logs and config.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Greeting => "greeting",
            Category::Introduction => "introduction",
            Category::Capabilities => "capabilities",
            Category::Limitations => "limitations",
            Category::Language => "language",
            Category::Education => "education",
            Category::Technology => "technology",
            Category::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Unix timestamp in milliseconds since epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

/// Identifier of a message within one conversation.
///
/// Allocated by the conversation log from a monotonic counter, so ids
/// order the same way as creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Message
// =============================================================================

/// A single entry of the conversation log. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub role: Role,
    pub timestamp: Timestamp,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            role,
            timestamp: Timestamp::now(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

// =============================================================================
// Tests
// =============================================================================
