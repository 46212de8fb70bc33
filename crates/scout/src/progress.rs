// ABOUTME: Progress channel: ProgressEvent payload, the ProgressSink seam, and the ProgressHub fan-out.
// ABOUTME: One lock guards the subscriber set; full subscribers miss a message, closed ones are pruned.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::jobs::JobStatus;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// One progress notification for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    /// Percent complete, 0 to 100
    pub progress: u8,
    /// Page currently being processed
    pub current_item: u32,
    /// Records collected so far; never reset, even when a failed job returns none
    pub total_items: usize,
    pub message: String,
}

/// Receiver of progress events. Publishing never fails and never blocks.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn publish(&self, _event: &ProgressEvent) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn publish(&self, event: &ProgressEvent) {
        (**self).publish(event)
    }
}

/// Handle returned by [`ProgressHub::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<ProgressEvent>,
}

#[derive(Debug, Default)]
struct Subscribers {
    next_id: u64,
    senders: Vec<(u64, mpsc::Sender<ProgressEvent>)>,
}

/// Broadcasts progress events to every current subscriber.
///
/// Cloning the hub shares the subscriber set.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    inner: Arc<Mutex<Subscribers>>,
    capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a hub whose subscribers each buffer up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers::default())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.senders.push((id, tx));
        Subscription { id, receiver: rx }
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.lock();
        let before = subs.senders.len();
        subs.senders.retain(|(sid, _)| *sid != id);
        subs.senders.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }
}

impl ProgressSink for ProgressHub {
    fn publish(&self, event: &ProgressEvent) {
        let mut subs = self.lock();
        subs.senders.retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber = id, job_id = %event.job_id, "subscriber queue full, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(subscriber = id, "subscriber closed, removing");
                false
            }
        });
    }
}
