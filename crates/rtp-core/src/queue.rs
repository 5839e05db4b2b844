//! Bounded payload queue with drop-oldest overflow.
//!
//! The realtime deadline matters more than completeness: when a
//! producer outruns its consumer the oldest payload is discarded so
//! the stream stays current instead of drifting behind.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout, Instant};
use tracing::trace;

pub struct PayloadQueue {
    inner: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl PayloadQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a payload, discarding the oldest entry on overflow.
    pub fn push(&self, payload: Bytes) {
        {
            let mut queue = self.inner.lock();
            if queue.len() == self.capacity {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped, "payload queue overflow, oldest frame discarded");
            }
            queue.push_back(payload);
        }
        self.notify.notify_one();
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<Bytes> {
        self.inner.lock().pop_front()
    }

    /// Dequeue, waiting at most `wait` for a payload to arrive.
    pub async fn pop_within(&self, wait: Duration) -> Option<Bytes> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(payload) = self.try_pop() {
                return Some(payload);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if timeout(deadline - now, self.notify.notified()).await.is_err() {
                // Deadline hit while parked; one final check below.
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Payloads discarded due to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything currently queued.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
