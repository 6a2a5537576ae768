//! End-to-end conversation flows.
//!
//! Each test builds its own session over an in-memory speech device, a
//! virtual clock, and scripted randomness, then drives it the way the
//! terminal front end does.

use std::sync::Arc;
use std::time::Duration;

use speakpal_chat::{
    fallback_reply, variants, ChatError, ChatSession, LatencyTimer, SequenceRandom, VirtualTimer,
};
use speakpal_core::types::{Category, Role};
use speakpal_core::SessionEvent;
use speakpal_speech::{MemorySpeechDevice, PlaybackState, SpeechDevice};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    session: ChatSession,
    timer: Arc<VirtualTimer>,
    device: Arc<MemorySpeechDevice>,
}

impl Harness {
    fn new(picks: Vec<usize>) -> Self {
        Self::with_device(MemorySpeechDevice::new(), picks)
    }

    fn with_device(device: MemorySpeechDevice, picks: Vec<usize>) -> Self {
        let timer = Arc::new(VirtualTimer::new());
        let device = Arc::new(device);
        let session = ChatSession::builder()
            .device(Arc::clone(&device) as Arc<dyn SpeechDevice>)
            .timer(Arc::clone(&timer) as Arc<dyn LatencyTimer>)
            .random(Arc::new(SequenceRandom::new(picks)))
            .build();
        Self {
            session,
            timer,
            device,
        }
    }

    /// Submit `text` and let the full latency elapse.
    async fn exchange(&self, text: &str) -> speakpal_core::types::Message {
        let pending = self.session.submit(text).unwrap();
        self.timer.wait_for_waiters(1).await;
        self.timer.advance(self.session.latency());
        pending.wait().await.unwrap()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<&'static str> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.event_name())
        .collect()
}

// =============================================================================
// Conversation flows
// =============================================================================

#[tokio::test]
async fn test_hello_gets_greeting_and_is_spoken() {
    let h = Harness::new(vec![1]);
    assert_eq!(h.session.playback_state(), PlaybackState::Idle);

    let reply = h.exchange("Hello").await;

    let messages = h.session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Hello");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2], reply);
    assert_eq!(reply.content, variants(Category::Greeting)[1]);

    assert_eq!(h.session.playback_state(), PlaybackState::Speaking);
    assert_eq!(h.device.active().unwrap().text, reply.content);
}

#[tokio::test]
async fn test_machine_learning_gets_technology_variant() {
    for pick in 0..3 {
        let h = Harness::new(vec![pick]);
        let reply = h.exchange("What is machine learning?").await;
        assert_eq!(reply.content, variants(Category::Technology)[pick]);
    }
}

#[tokio::test]
async fn test_unmatched_input_gets_fallback_quoting_input() {
    let h = Harness::new(vec![2]);
    let reply = h.exchange("asdkj random text").await;

    assert!(reply.content.contains("\"asdkj random text...\""));
    assert_eq!(reply.content, fallback_reply("asdkj random text", 2));
}

#[tokio::test]
async fn test_log_grows_by_two_per_exchange() {
    let h = Harness::new(vec![0]);
    let inputs = ["Hello", "Who are you?", "What are your limitations", "xyz"];
    for (i, input) in inputs.iter().enumerate() {
        h.exchange(input).await;
        assert_eq!(h.session.messages().len(), 1 + 2 * (i + 1));
    }

    let roles: Vec<Role> = h.session.messages().iter().map(|m| m.role).collect();
    for pair in roles[1..].chunks(2) {
        assert_eq!(pair, [Role::User, Role::Assistant]);
    }
    let ids: Vec<u64> = h.session.messages().iter().map(|m| m.id.0).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_whitespace_submission_changes_nothing() {
    let h = Harness::new(vec![0]);
    let before = h.session.messages();

    assert!(matches!(h.session.submit("   \t"), Err(ChatError::EmptyMessage)));
    assert_eq!(h.session.messages(), before);
    assert!(!h.session.is_processing());
}

#[tokio::test]
async fn test_second_submission_during_latency_is_dropped() {
    let h = Harness::new(vec![0]);
    let pending = h.session.submit("Hello").unwrap();
    h.timer.wait_for_waiters(1).await;

    h.timer.advance(Duration::from_millis(700));
    let err = h.session.submit("Who are you?").unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(h.session.messages().len(), 2);

    h.timer.advance(Duration::from_millis(800));
    pending.wait().await.unwrap();
    let contents: Vec<String> = h.session.messages().into_iter().map(|m| m.content).collect();
    assert!(!contents.iter().any(|c| c == "Who are you?"));
}

#[tokio::test]
async fn test_reply_waits_for_full_latency() {
    let h = Harness::new(vec![0]);
    let _pending = h.session.submit("Hello").unwrap();
    h.timer.wait_for_waiters(1).await;

    h.timer.advance(Duration::from_millis(1499));
    tokio::task::yield_now().await;
    assert!(h.session.is_processing());
    assert_eq!(h.session.messages().len(), 2);
}

// =============================================================================
// Playback
// =============================================================================

#[tokio::test]
async fn test_new_reply_preempts_previous_speech() {
    let h = Harness::new(vec![0]);
    h.exchange("Hello").await;
    let second = h.exchange("Who are you?").await;

    assert_eq!(h.device.overlaps(), 0);
    assert_eq!(h.device.active().unwrap().text, second.content);
    assert_eq!(h.device.spoken().len(), 2);
}

#[tokio::test]
async fn test_natural_end_returns_to_idle() {
    let h = Harness::new(vec![0]);
    h.exchange("Hello").await;

    assert!(h.device.finish());
    assert_eq!(h.session.playback_state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_stop_then_replay_older_message() {
    let h = Harness::new(vec![0]);
    let first = h.exchange("Hello").await;
    h.exchange("Who are you?").await;

    assert!(h.session.stop());
    assert_eq!(h.session.playback_state(), PlaybackState::Idle);
    assert!(!h.session.stop());

    assert!(h.session.replay(first.id));
    assert_eq!(h.device.active().unwrap().text, first.content);
    assert_eq!(h.session.playback_state(), PlaybackState::Speaking);
}

#[tokio::test]
async fn test_stale_completion_after_replay_is_ignored() {
    let h = Harness::with_device(MemorySpeechDevice::new().notify_on_cancel(true), vec![0]);
    let first = h.exchange("Hello").await;
    h.exchange("Who are you?").await;

    // Cancelling the second reply fires its completion late.
    assert!(h.session.replay(first.id));
    assert_eq!(h.session.playback_state(), PlaybackState::Speaking);
    assert_eq!(h.device.active().unwrap().text, first.content);
}

#[tokio::test]
async fn test_shutdown_while_speaking_silences_device() {
    let h = Harness::new(vec![0]);
    h.exchange("Hello").await;
    assert!(h.device.active().is_some());

    h.session.shutdown();
    assert!(h.device.active().is_none());
    assert_eq!(h.session.playback_state(), PlaybackState::Idle);
    assert!(!h.session.replay(h.session.messages()[0].id));
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_event_sequence_for_one_exchange() {
    let h = Harness::new(vec![0]);
    let mut rx = h.session.subscribe();

    h.exchange("Hello").await;
    h.device.finish();

    assert_eq!(
        drain(&mut rx),
        vec![
            "message_appended",
            "processing_started",
            "message_appended",
            "processing_finished",
            "playback_started",
            "playback_finished",
        ]
    );
}

#[tokio::test]
async fn test_rejections_are_published() {
    let h = Harness::new(vec![0]);
    let mut rx = h.session.subscribe();

    let _ = h.session.submit("");
    let _pending = h.session.submit("Hello").unwrap();
    let _ = h.session.submit("again");

    assert_eq!(
        drain(&mut rx),
        vec![
            "submission_rejected",
            "message_appended",
            "processing_started",
            "submission_rejected",
        ]
    );
}
