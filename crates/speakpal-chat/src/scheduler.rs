//! Latency timers for the deferred reply.
//!
//! The session waits on a [`LatencyTimer`] between accepting a message and
//! appending the reply. `TokioTimer` sleeps for real; `VirtualTimer` only
//! moves when told to, so tests can step through the thinking interval.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

/// Something that can wait for a duration to elapse.
#[async_trait]
pub trait LatencyTimer: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Wall-clock timer backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[async_trait]
impl LatencyTimer for TokioTimer {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually advanced clock.
///
/// Virtual time starts at zero and only moves through [`advance`].
/// A `wait(d)` started at virtual time `t` returns once the clock reaches
/// `t + d`.
///
/// [`advance`]: VirtualTimer::advance
#[derive(Debug)]
pub struct VirtualTimer {
    clock: watch::Sender<Duration>,
    waiters: watch::Sender<usize>,
}

impl Default for VirtualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimer {
    pub fn new() -> Self {
        Self {
            clock: watch::Sender::new(Duration::ZERO),
            waiters: watch::Sender::new(0),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        *self.clock.borrow()
    }

    /// Move the clock forward, waking every wait whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        self.clock.send_modify(|now| *now += by);
        tracing::trace!(now_ms = self.now().as_millis() as u64, "Virtual clock advanced");
    }

    /// Number of waits currently blocked on the clock.
    pub fn waiters(&self) -> usize {
        *self.waiters.borrow()
    }

    /// Resolve once at least `count` waits are blocked on the clock.
    ///
    /// Lets a test make sure the deadline was taken before it advances.
    pub async fn wait_for_waiters(&self, count: usize) {
        let mut rx = self.waiters.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

#[async_trait]
impl LatencyTimer for VirtualTimer {
    async fn wait(&self, duration: Duration) {
        let mut rx = self.clock.subscribe();
        let deadline = *rx.borrow_and_update() + duration;

        self.waiters.send_modify(|n| *n += 1);
        let _guard = WaiterGuard(&self.waiters);

        let _ = rx.wait_for(|now| *now >= deadline).await;
    }
}

/// Decrements the waiter count even if the waiting future is dropped.
struct WaiterGuard<'a>(&'a watch::Sender<usize>);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}
