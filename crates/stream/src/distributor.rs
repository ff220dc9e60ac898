//! Subscription registry that fans one connection's status and stream
//! handle out to every on-screen viewer.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::StreamError;
use crate::transport::StreamHandle;

/// Lifecycle state of a managed camera connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Error,
    Closed,
}

/// One broadcast to subscribers: the state, the shared handle while
/// `Connected`, and the cause while `Error`.
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub state: ConnectionState,
    pub handle: Option<StreamHandle>,
    pub error: Option<StreamError>,
}

impl StreamUpdate {
    pub fn idle() -> Self {
        Self {
            state: ConnectionState::Idle,
            handle: None,
            error: None,
        }
    }
}

/// Identifies one subscription; required for deterministic removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type UpdateCallback = Arc<dyn Fn(&StreamUpdate) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: UpdateCallback,
    /// Sequence number of the newest update delivered to this
    /// subscriber. Lets a subscribe-replay racing a publish drop the
    /// older of the two instead of delivering out of order.
    delivered: Arc<AtomicU64>,
}

struct Inner {
    next_id: u64,
    /// Monotonic update sequence; the initial idle snapshot is 1.
    seq: u64,
    subscribers: Vec<Subscriber>,
    current: StreamUpdate,
}

/// Ordered registry of viewer callbacks.
///
/// Broadcasts happen in registration order, and the latest update is
/// retained so a viewer subscribing mid-flight is replayed the current
/// state immediately instead of waiting for the next transition.
///
/// The registry lock is never held while a callback runs, so a
/// callback is free to call back into the registry (or the manager
/// that owns it): read the current state, unsubscribe itself, add
/// another subscriber.
pub struct StreamDistributor {
    inner: Mutex<Inner>,
}

impl StreamDistributor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                seq: 1,
                subscribers: Vec::new(),
                current: StreamUpdate::idle(),
            }),
        }
    }

    /// Register a callback. It is invoked once, immediately, with the
    /// current update before any future broadcast reaches it.
    pub fn subscribe(&self, callback: UpdateCallback) -> SubscriptionId {
        let (subscriber, seq, snapshot) = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let subscriber = Subscriber {
                id: SubscriptionId(inner.next_id),
                callback,
                delivered: Arc::new(AtomicU64::new(0)),
            };
            inner.subscribers.push(subscriber.clone());
            (subscriber, inner.seq, inner.current.clone())
        };
        Self::deliver(&subscriber, seq, &snapshot);
        subscriber.id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        inner.subscribers.len() != before
    }

    /// Broadcast `update` to all subscribers in registration order and
    /// retain it for replay. A panicking subscriber is isolated; the
    /// rest still receive the update.
    pub fn publish(&self, update: StreamUpdate) {
        let (subscribers, seq) = {
            let mut inner = self.lock();
            inner.seq += 1;
            inner.current = update.clone();
            (inner.subscribers.clone(), inner.seq)
        };
        for subscriber in &subscribers {
            Self::deliver(subscriber, seq, &update);
        }
    }

    pub fn current(&self) -> StreamUpdate {
        self.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn deliver(subscriber: &Subscriber, seq: u64, update: &StreamUpdate) {
        // A newer update already reached this subscriber.
        if subscriber.delivered.fetch_max(seq, Ordering::AcqRel) >= seq {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(update))).is_err() {
            warn!(
                id = ?subscriber.id,
                "Subscriber callback panicked, skipping it for this update"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StreamDistributor {
    fn default() -> Self {
        Self::new()
    }
}
