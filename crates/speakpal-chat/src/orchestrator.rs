//! Chat session: wires the conversation log, response engine, latency timer,
//! and playback controller together.
//!
//! A session accepts one submission at a time. The user message is appended
//! immediately; the reply is produced by a spawned task after the configured
//! latency, appended to the log, and then spoken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use speakpal_core::config::{ChatConfig, SpeakPalConfig};
use speakpal_core::events::{RejectReason, SessionEvent};
use speakpal_core::types::{Message, MessageId, Role, Timestamp};
use speakpal_speech::{
    DeliveryParams, NullSpeechDevice, PlaybackController, PlaybackState, SpeechDevice,
};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::ConversationLog;
use crate::error::ChatError;
use crate::response::{RandomSource, ResponseEngine};
use crate::scheduler::{LatencyTimer, TokioTimer};

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 256;

// =============================================================================
// PendingReply
// =============================================================================

/// Handle to the assistant reply of an accepted submission.
#[derive(Debug)]
pub struct PendingReply {
    user_message: Message,
    rx: oneshot::Receiver<Message>,
}

impl PendingReply {
    /// The user message that was appended on submit.
    pub fn user_message(&self) -> &Message {
        &self.user_message
    }

    /// Wait for the assistant message.
    ///
    /// Fails with [`ChatError::Closed`] when the session shut down before the
    /// reply was appended.
    pub async fn wait(self) -> Result<Message, ChatError> {
        self.rx.await.map_err(|_| ChatError::Closed)
    }
}

// =============================================================================
// Shared state
// =============================================================================

struct Shared {
    session_id: Uuid,
    log: Mutex<ConversationLog>,
    in_flight: AtomicBool,
    closed: AtomicBool,
    engine: ResponseEngine,
    playback: PlaybackController,
    timer: Arc<dyn LatencyTimer>,
    latency: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn log(&self) -> MutexGuard<'_, ConversationLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Deferred half of a submission.
    async fn complete(self: Arc<Self>, input: String, reply_tx: oneshot::Sender<Message>) {
        self.timer.wait(self.latency).await;

        let reply = self.engine.respond(&input);

        // `shutdown` flips `closed` under the log lock, so a closed session
        // never gains a reply here.
        let message = {
            let mut log = self.log();
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!(session_id = %self.session_id, "Session closed before reply");
                return;
            }
            log.append(Role::Assistant, reply.text)
        };
        self.in_flight.store(false, Ordering::Release);

        tracing::info!(
            session_id = %self.session_id,
            message_id = %message.id,
            category = %reply.category,
            latency_ms = self.latency.as_millis() as u64,
            "Reply appended"
        );
        self.emit(SessionEvent::MessageAppended {
            message: message.clone(),
            timestamp: Timestamp::now(),
        });
        self.emit(SessionEvent::ProcessingFinished {
            session_id: self.session_id,
            timestamp: Timestamp::now(),
        });

        self.playback.speak(&message.content);

        // The submitter may have dropped its handle.
        let _ = reply_tx.send(message);
    }
}

// =============================================================================
// ChatSession
// =============================================================================

/// One conversation with its own log, in-flight guard, and playback slot.
pub struct ChatSession {
    shared: Arc<Shared>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("session_id", &self.shared.session_id)
            .field("messages", &self.shared.log().len())
            .field("processing", &self.is_processing())
            .field("playback", &self.playback_state())
            .finish()
    }
}

impl ChatSession {
    pub fn builder() -> ChatSessionBuilder {
        ChatSessionBuilder::default()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// Simulated latency applied before every reply.
    pub fn latency(&self) -> Duration {
        self.shared.latency
    }

    /// Submit user input.
    ///
    /// Appends the user message at once and schedules the reply. Empty or
    /// whitespace-only input and submissions made while a reply is pending
    /// are rejected without touching the log. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, text: &str) -> Result<PendingReply, ChatError> {
        let shared = &self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(ChatError::Closed);
        }
        if text.trim().is_empty() {
            return Err(self.reject(RejectReason::Empty));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Core(format!("no async runtime: {e}")))?;
        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.reject(RejectReason::InFlight));
        }

        let user_message = shared.log().append(Role::User, text);
        tracing::info!(
            session_id = %shared.session_id,
            message_id = %user_message.id,
            chars = text.chars().count(),
            "Message submitted"
        );
        shared.emit(SessionEvent::MessageAppended {
            message: user_message.clone(),
            timestamp: Timestamp::now(),
        });
        shared.emit(SessionEvent::ProcessingStarted {
            session_id: shared.session_id,
            timestamp: Timestamp::now(),
        });

        let (reply_tx, rx) = oneshot::channel();
        let handle = runtime.spawn(Arc::clone(shared).complete(text.to_string(), reply_tx));
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(PendingReply { user_message, rx })
    }

    fn reject(&self, reason: RejectReason) -> ChatError {
        tracing::debug!(session_id = %self.shared.session_id, ?reason, "Submission rejected");
        self.shared.emit(SessionEvent::SubmissionRejected {
            reason,
            timestamp: Timestamp::now(),
        });
        match reason {
            RejectReason::Empty => ChatError::EmptyMessage,
            RejectReason::InFlight => ChatError::Busy,
        }
    }

    /// Stop the current utterance. Returns `false` when nothing was playing.
    pub fn stop(&self) -> bool {
        self.shared.playback.stop()
    }

    /// Speak an earlier assistant message again.
    ///
    /// Returns whether playback started. User messages, unknown ids, and an
    /// unavailable speech device all yield `false`.
    pub fn replay(&self, id: MessageId) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            return false;
        }
        let content = match self.shared.log().get(id) {
            Some(m) if m.is_assistant() => m.content.clone(),
            Some(_) => {
                tracing::debug!(message_id = %id, "Replay ignored for user message");
                return false;
            }
            None => {
                tracing::debug!(message_id = %id, "Replay ignored for unknown message");
                return false;
            }
        };
        self.shared.playback.replay(&content).is_some()
    }

    /// Snapshot of the conversation log.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.log().messages().to_vec()
    }

    /// Id of the most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<MessageId> {
        self.shared.log().assistant_messages().last().map(|m| m.id)
    }

    /// Whether a reply is pending.
    pub fn is_processing(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.playback.current_state()
    }

    /// Whether replies will be spoken.
    pub fn speech_available(&self) -> bool {
        self.shared.playback.is_available()
    }

    /// Subscribe to session and playback events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Abort any pending reply and silence playback.
    ///
    /// Idempotent. Later submissions fail with [`ChatError::Closed`].
    pub fn shutdown(&self) {
        {
            let _log = self.shared.log();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        if let Some(handle) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.shared.in_flight.store(false, Ordering::Release);
        self.shared.playback.shutdown();
        tracing::info!(session_id = %self.shared.session_id, "Chat session closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`ChatSession`].
///
/// Defaults: built-in config, no speech, thread-local randomness, and a
/// real tokio timer.
#[derive(Default)]
pub struct ChatSessionBuilder {
    chat: ChatConfig,
    params: DeliveryParams,
    device: Option<Arc<dyn SpeechDevice>>,
    random: Option<Arc<dyn RandomSource>>,
    timer: Option<Arc<dyn LatencyTimer>>,
    engine: Option<ResponseEngine>,
}

impl ChatSessionBuilder {
    /// Take chat settings and delivery parameters from a loaded config.
    pub fn config(mut self, config: &SpeakPalConfig) -> Self {
        self.chat = config.chat.clone();
        self.params = DeliveryParams::from(&config.speech);
        self
    }

    pub fn chat_config(mut self, chat: ChatConfig) -> Self {
        self.chat = chat;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.chat.response_latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.chat.greeting = greeting.into();
        self
    }

    pub fn delivery(mut self, params: DeliveryParams) -> Self {
        self.params = params;
        self
    }

    pub fn device(mut self, device: Arc<dyn SpeechDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn timer(mut self, timer: Arc<dyn LatencyTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Use a preconfigured engine. Its random source is replaced when
    /// [`random`](Self::random) is also set.
    pub fn engine(mut self, engine: ResponseEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> ChatSession {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let device = self.device.unwrap_or_else(|| Arc::new(NullSpeechDevice));
        let playback = PlaybackController::new(device)
            .with_params(self.params)
            .with_events(events.clone());

        let mut engine = self.engine.unwrap_or_default();
        if let Some(random) = self.random {
            engine = engine.with_random(random);
        }

        let session_id = Uuid::new_v4();
        let log = if self.chat.greeting.trim().is_empty() {
            ConversationLog::new()
        } else {
            ConversationLog::with_greeting(&self.chat.greeting)
        };

        tracing::info!(
            session_id = %session_id,
            latency_ms = self.chat.response_latency_ms,
            speech = playback.is_available(),
            "Chat session created"
        );

        ChatSession {
            shared: Arc::new(Shared {
                session_id,
                log: Mutex::new(log),
                in_flight: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                engine,
                playback,
                timer: self.timer.unwrap_or_else(|| Arc::new(TokioTimer)),
                latency: Duration::from_millis(self.chat.response_latency_ms),
                events,
            }),
            pending: Mutex::new(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SequenceRandom;
    use crate::scheduler::VirtualTimer;
    use speakpal_core::config::DEFAULT_GREETING;
    use speakpal_speech::MemorySpeechDevice;

    struct Fixture {
        session: ChatSession,
        timer: Arc<VirtualTimer>,
        device: Arc<MemorySpeechDevice>,
    }

    fn fixture() -> Fixture {
        let timer = Arc::new(VirtualTimer::new());
        let device = Arc::new(MemorySpeechDevice::new());
        let session = ChatSession::builder()
            .device(Arc::clone(&device) as Arc<dyn SpeechDevice>)
            .timer(Arc::clone(&timer) as Arc<dyn LatencyTimer>)
            .random(Arc::new(SequenceRandom::new(vec![0])))
            .build();
        Fixture {
            session,
            timer,
            device,
        }
    }

    async fn elapse(f: &Fixture) {
        f.timer.wait_for_waiters(1).await;
        f.timer.advance(f.session.latency());
    }

    #[test]
    fn test_new_session_has_greeting() {
        let f = fixture();
        let messages = f.session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, DEFAULT_GREETING);
        assert!(!f.session.is_processing());
        assert_eq!(f.session.playback_state(), PlaybackState::Idle);
        assert_eq!(f.session.latency(), Duration::from_millis(1500));
    }

    #[test]
    fn test_empty_greeting_starts_with_empty_log() {
        let session = ChatSession::builder().greeting("  ").build();
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_submit_appends_user_message_immediately() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();

        assert_eq!(pending.user_message().content, "Hello");
        assert_eq!(f.session.messages().len(), 2);
        assert!(f.session.is_processing());
        assert_eq!(f.session.playback_state(), PlaybackState::Idle);

        elapse(&f).await;
        let reply = pending.wait().await.unwrap();
        assert_eq!(reply.content, "Hello! How can I assist you today?");
        assert!(!f.session.is_processing());
        assert_eq!(f.session.messages().len(), 3);
        assert_eq!(f.session.playback_state(), PlaybackState::Speaking);
        assert_eq!(f.device.active().unwrap().text, reply.content);
    }

    #[tokio::test]
    async fn test_empty_submission_rejected() {
        let f = fixture();
        for input in ["", "   ", "\n\t"] {
            let err = f.session.submit(input).unwrap_err();
            assert!(matches!(err, ChatError::EmptyMessage));
        }
        assert_eq!(f.session.messages().len(), 1);
        assert!(!f.session.is_processing());
    }

    #[tokio::test]
    async fn test_submission_while_in_flight_rejected() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();
        let err = f.session.submit("Who are you?").unwrap_err();
        assert!(matches!(err, ChatError::Busy));
        assert_eq!(f.session.messages().len(), 2);

        elapse(&f).await;
        pending.wait().await.unwrap();
        assert_eq!(f.session.messages().len(), 3);

        // Guard is cleared once the reply lands.
        assert!(f.session.submit("Who are you?").is_ok());
    }

    #[tokio::test]
    async fn test_rejection_events() {
        let f = fixture();
        let mut rx = f.session.subscribe();
        let _ = f.session.submit(" ");

        match rx.recv().await.unwrap() {
            SessionEvent::SubmissionRejected { reason, .. } => {
                assert_eq!(reason, RejectReason::Empty)
            }
            other => panic!("unexpected event {}", other.event_name()),
        }
    }

    #[tokio::test]
    async fn test_replay_only_assistant_messages() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();
        let user_id = pending.user_message().id;
        elapse(&f).await;
        pending.wait().await.unwrap();

        assert!(!f.session.replay(user_id));
        assert!(!f.session.replay(MessageId(999)));

        let greeting_id = f.session.messages()[0].id;
        assert!(f.session.replay(greeting_id));
        assert_eq!(f.device.active().unwrap().text, DEFAULT_GREETING);
        assert_eq!(f.device.overlaps(), 0);
    }

    #[tokio::test]
    async fn test_stop_after_reply() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();
        elapse(&f).await;
        pending.wait().await.unwrap();

        assert!(f.session.stop());
        assert_eq!(f.session.playback_state(), PlaybackState::Idle);
        assert!(!f.session.stop());
    }

    /// Blocks inside `pick` until released, announcing when it got there.
    struct GatedRandom {
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl RandomSource for GatedRandom {
        fn pick(&self, _len: usize) -> usize {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            0
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_while_reply_is_generated_discards_it() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let device = Arc::new(MemorySpeechDevice::new());
        let session = ChatSession::builder()
            .device(Arc::clone(&device) as Arc<dyn SpeechDevice>)
            .latency(Duration::ZERO)
            .random(Arc::new(GatedRandom {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            }))
            .build();

        let pending = session.submit("Hello").unwrap();
        // The reply task is now past its last await, parked in `pick`.
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        session.shutdown();
        assert!(session.is_closed());
        release_tx.send(()).unwrap();

        assert!(matches!(pending.wait().await, Err(ChatError::Closed)));
        assert_eq!(session.messages().len(), 2);
        assert!(device.active().is_none());
        assert!(device.spoken().is_empty());
        assert_eq!(session.playback_state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_reply() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();
        f.timer.wait_for_waiters(1).await;

        f.session.shutdown();
        assert!(f.session.is_closed());
        assert!(!f.session.is_processing());
        assert!(matches!(pending.wait().await, Err(ChatError::Closed)));
        assert_eq!(f.session.messages().len(), 2);
        assert!(matches!(f.session.submit("again"), Err(ChatError::Closed)));
    }

    #[tokio::test]
    async fn test_drop_silences_device() {
        let f = fixture();
        let pending = f.session.submit("Hello").unwrap();
        elapse(&f).await;
        pending.wait().await.unwrap();
        assert!(f.device.active().is_some());

        let Fixture { session, device, .. } = f;
        drop(session);
        assert!(device.active().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_speech_still_replies() {
        let timer = Arc::new(VirtualTimer::new());
        let session = ChatSession::builder()
            .timer(Arc::clone(&timer) as Arc<dyn LatencyTimer>)
            .build();
        assert!(!session.speech_available());

        let pending = session.submit("Who are you?").unwrap();
        timer.wait_for_waiters(1).await;
        timer.advance(session.latency());
        let reply = pending.wait().await.unwrap();

        assert!(reply.content.starts_with("I'm an AI assistant"));
        assert_eq!(session.playback_state(), PlaybackState::Idle);
        assert!(!session.replay(reply.id));
    }

    #[test]
    fn test_submit_outside_runtime_fails_cleanly() {
        let session = ChatSession::builder().build();
        let err = session.submit("Hello").unwrap_err();
        assert!(matches!(err, ChatError::Core(_)));
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_processing());
    }

    #[test]
    fn test_builder_applies_config() {
        let mut config = SpeakPalConfig::default();
        config.chat.response_latency_ms = 10;
        config.chat.greeting = "Hey!".to_string();
        config.speech.rate = 1.2;

        let session = ChatSession::builder().config(&config).build();
        assert_eq!(session.latency(), Duration::from_millis(10));
        assert_eq!(session.messages()[0].content, "Hey!");
        assert_eq!(session.shared.playback.params().rate, 1.2);
    }
}
