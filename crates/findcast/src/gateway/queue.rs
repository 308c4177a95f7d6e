//! Bounded envelope queue between the gateway worker and the notifier.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// One raw feed frame awaiting processing.
#[derive(Debug, Clone)]
pub struct RawEnvelope {
    pub payload: String,
}

/// Fixed-capacity FIFO favoring freshness over completeness.
///
/// A push into a full queue drops the single oldest envelope and enqueues the
/// new one; both happen under one lock acquisition, so a concurrent push can
/// never observe a lost or doubled slot.
pub struct RelayQueue {
    inner: Mutex<VecDeque<RawEnvelope>>,
    notify: Notify,
    capacity: usize,
}

impl RelayQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue an envelope. Returns true when the oldest entry had to be
    /// dropped to make room.
    pub fn push(&self, envelope: RawEnvelope) -> bool {
        let dropped = {
            let mut queue = self.inner.lock();
            let dropped = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(envelope);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Dequeue the oldest envelope, waiting until one is available.
    pub async fn pop(&self) -> RawEnvelope {
        loop {
            // Arm the notification before checking so a push between the
            // check and the await is not missed.
            let notified = self.notify.notified();
            if let Some(envelope) = self.inner.lock().pop_front() {
                return envelope;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
