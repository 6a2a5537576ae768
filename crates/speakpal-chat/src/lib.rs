//! SpeakPal conversational core.
//!
//! Rule-based reply generation, the append-only conversation log, and the
//! chat session that turns a submission into a delayed, spoken reply.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod response;
pub mod scheduler;

pub use context::ConversationLog;
pub use error::ChatError;
pub use orchestrator::{ChatSession, ChatSessionBuilder, PendingReply};
pub use parser::{IntentClassifier, PatternRule};
pub use response::{
    fallback_reply, variants, RandomSource, Reply, ResponseEngine, SeededRandom, SequenceRandom,
    ThreadRandom,
};
pub use scheduler::{LatencyTimer, TokioTimer, VirtualTimer};
