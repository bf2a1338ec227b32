//! Relay attribution.
//!
//! A relay agent is a bot that posts tracks when a user invokes it. The user
//! who sent the trigger command is queued here; the next relay post is
//! credited to the oldest queued user. Each queued request expires after a
//! fixed timeout, after which a relay post falls back to the agent's own id.
//!
//! Every entry owns a timer task. Matching pops the head of the FIFO and
//! aborts its timer in the same critical section, so a matched entry is never
//! also expired. With one uniform timeout, timers fire in FIFO order; a timer
//! that finds its entry no longer at the head signals a desynchronised queue
//! and is dropped after logging.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use playlog_ledger::UserId;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionState {
    Pending,
    Matched,
    Expired,
}

/// Counters for observability and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttributionStats {
    pub enqueued: u64,
    pub matched: u64,
    pub expired: u64,
    /// Timers that fired for an entry that was not at the head.
    pub desynced: u64,
}

/// Cancellable expiry timer of one queued request.
#[derive(Debug)]
struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}

#[derive(Debug)]
struct PendingAttribution {
    id: u64,
    user: UserId,
    enqueued_at: Instant,
    state: AttributionState,
    timer: TimerHandle,
}

impl PendingAttribution {
    fn settle(&mut self, state: AttributionState) {
        debug_assert_eq!(self.state, AttributionState::Pending);
        if state == AttributionState::Matched {
            self.timer.cancel();
        }
        self.state = state;
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<PendingAttribution>,
    next_id: u64,
    stats: AttributionStats,
}

impl QueueState {
    fn peek_front(&self) -> Option<&PendingAttribution> {
        self.entries.front()
    }

    fn pop_front(&mut self) -> Option<PendingAttribution> {
        self.entries.pop_front()
    }

    fn push_back(&mut self, entry: PendingAttribution) {
        self.entries.push_back(entry);
    }
}

impl Drop for QueueState {
    fn drop(&mut self) {
        for entry in &self.entries {
            entry.timer.cancel();
        }
    }
}

/// FIFO of users waiting for the relay agent to post on their behalf.
///
/// Cheap to clone; clones share the same queue. `enqueue` must be called
/// from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct AttributionQueue {
    timeout: Duration,
    inner: Arc<Mutex<QueueState>>,
}

impl Default for AttributionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl AttributionQueue {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            inner: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Queue `user` at the tail and start its expiry timer.
    pub fn enqueue(&self, user: UserId) {
        let mut guard = self.inner.lock();
        let id = guard.next_id;
        guard.next_id += 1;

        let queue = Arc::downgrade(&self.inner);
        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            expire(&queue, id);
        });

        guard.push_back(PendingAttribution {
            id,
            user,
            enqueued_at: Instant::now(),
            state: AttributionState::Pending,
            timer: TimerHandle(timer),
        });
        guard.stats.enqueued += 1;

        debug!(%user, entry = id, pending = guard.entries.len(), "Queued relay attribution");
    }

    /// Credit a relay post to the oldest pending request, if any.
    pub fn on_relay_item_observed(&self) -> Option<UserId> {
        let mut guard = self.inner.lock();
        let Some(mut entry) = guard.pop_front() else {
            debug!("Relay post with no pending attribution");
            return None;
        };

        entry.settle(AttributionState::Matched);
        guard.stats.matched += 1;

        debug!(
            user = %entry.user,
            entry = entry.id,
            waited_ms = entry.enqueued_at.elapsed().as_millis() as u64,
            "Matched relay post"
        );
        Some(entry.user)
    }

    /// User at the head of the queue.
    pub fn peek_front(&self) -> Option<UserId> {
        self.inner.lock().peek_front().map(|e| e.user)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> AttributionStats {
        self.inner.lock().stats
    }
}

fn expire(queue: &Weak<Mutex<QueueState>>, id: u64) {
    let Some(inner) = queue.upgrade() else {
        return;
    };
    let mut guard = inner.lock();

    match guard.peek_front().map(|e| e.id) {
        Some(front) if front == id => {
            if let Some(mut entry) = guard.pop_front() {
                entry.settle(AttributionState::Expired);
                guard.stats.expired += 1;
                warn!(
                    user = %entry.user,
                    entry = id,
                    "Relay attribution expired without a matching post"
                );
            }
        }
        Some(front) => {
            guard.stats.desynced += 1;
            error!(
                entry = id,
                front, "Attribution timer fired for an entry that is not at the head; dropping it"
            );
        }
        None => {
            guard.stats.desynced += 1;
            error!(
                entry = id,
                "Attribution timer fired on an empty queue; dropping it"
            );
        }
    }
}

/// Decides who gets credit for a posted track.
#[derive(Debug, Clone)]
pub struct RelayAttributor {
    relay_agent: Option<UserId>,
    trigger: String,
    queue: AttributionQueue,
}

impl RelayAttributor {
    pub fn new(relay_agent: Option<UserId>, trigger: impl Into<String>, timeout: Duration) -> Self {
        Self {
            relay_agent,
            trigger: trigger.into(),
            queue: AttributionQueue::new(timeout),
        }
    }

    pub fn relay_agent(&self) -> Option<UserId> {
        self.relay_agent
    }

    pub fn queue(&self) -> &AttributionQueue {
        &self.queue
    }

    /// Queue `user` if `text` invokes the relay agent. Returns whether it did.
    pub fn observe_command(&self, user: UserId, text: &str) -> bool {
        if self.relay_agent.is_none() || !text.trim_start().starts_with(&self.trigger) {
            return false;
        }
        self.queue.enqueue(user);
        true
    }

    /// User to credit for a post by `author`. Posts by the relay agent go to
    /// the oldest pending requester, or stay with the agent when none is
    /// waiting.
    pub fn submitter_for(&self, author: UserId) -> UserId {
        if Some(author) != self.relay_agent {
            return author;
        }
        self.queue.on_relay_item_observed().unwrap_or(author)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_matches_in_fifo_order() {
        let queue = AttributionQueue::new(T);
        queue.enqueue(UserId(1));
        queue.enqueue(UserId(2));
        queue.enqueue(UserId(3));
        assert_eq!(queue.peek_front(), Some(UserId(1)));

        assert_eq!(queue.on_relay_item_observed(), Some(UserId(1)));
        assert_eq!(queue.on_relay_item_observed(), Some(UserId(2)));
        assert_eq!(queue.on_relay_item_observed(), Some(UserId(3)));
        assert_eq!(queue.on_relay_item_observed(), None);
        assert_eq!(queue.stats().matched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_entry_expires() {
        let queue = AttributionQueue::new(T);
        queue.enqueue(UserId(1));

        tokio::time::sleep(T + Duration::from_millis(1)).await;

        assert!(queue.is_empty());
        assert_eq!(queue.on_relay_item_observed(), None);
        let stats = queue.stats();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.desynced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_cancels_timer() {
        let queue = AttributionQueue::new(T);
        queue.enqueue(UserId(1));
        assert_eq!(queue.on_relay_item_observed(), Some(UserId(1)));

        tokio::time::sleep(T * 2).await;

        let stats = queue.stats();
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.desynced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_in_enqueue_order() {
        let queue = AttributionQueue::new(T);
        queue.enqueue(UserId(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        queue.enqueue(UserId(2));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.stats().expired, 1);

        assert_eq!(queue.on_relay_item_observed(), Some(UserId(2)));
        tokio::time::sleep(T).await;
        assert_eq!(queue.stats().expired, 1);
        assert_eq!(queue.stats().desynced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_credits_first_requester() {
        let queue = AttributionQueue::new(T);
        queue.enqueue(UserId(10));
        queue.enqueue(UserId(20));

        assert_eq!(queue.on_relay_item_observed(), Some(UserId(10)));
        tokio::time::sleep(T + Duration::from_millis(1)).await;

        assert!(queue.is_empty());
        assert_eq!(queue.stats().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orphaned_timer_is_logged_not_fatal() {
        let queue = AttributionQueue::new(T);
        let weak = Arc::downgrade(&queue.inner);

        expire(&weak, 42);
        assert_eq!(queue.stats().desynced, 1);

        queue.enqueue(UserId(1));
        expire(&weak, 42);
        assert_eq!(queue.stats().desynced, 2);
        assert_eq!(queue.peek_front(), Some(UserId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attributor_resolves_relay_posts() {
        let relay = UserId(999);
        let attributor = RelayAttributor::new(Some(relay), "!fm", T);

        assert!(!attributor.observe_command(UserId(1), "hello"));
        assert!(attributor.observe_command(UserId(1), "  !fm np"));

        assert_eq!(attributor.submitter_for(UserId(5)), UserId(5));
        assert_eq!(attributor.submitter_for(relay), UserId(1));
        // Nobody waiting: the agent keeps the credit.
        assert_eq!(attributor.submitter_for(relay), relay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attributor_without_relay_agent_ignores_triggers() {
        let attributor = RelayAttributor::new(None, "!fm", T);
        assert!(!attributor.observe_command(UserId(1), "!fm"));
        assert!(attributor.queue().is_empty());
    }
}
