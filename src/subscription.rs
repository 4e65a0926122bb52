//! Subscription registry and per-channel delivery queues

use crate::data::{PushUpdate, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Outbound `{"command": ..., "channel": ...}` message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionCommand {
    pub command: String,
    pub channel: String,
}

impl SubscriptionCommand {
    pub fn subscribe(channel_id: u64) -> Self {
        Self {
            command: "subscribe".to_string(),
            channel: channel_id.to_string(),
        }
    }

    pub fn unsubscribe(channel_id: u64) -> Self {
        Self {
            command: "unsubscribe".to_string(),
            channel: channel_id.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Bounded queue of decoded updates for one channel.
///
/// The producer never waits: when the queue is full the new update is dropped and
/// counted. The same queue instance survives unsubscribe and resubscribe.
#[derive(Debug)]
pub struct DeliveryQueue {
    channel: String,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<PushUpdate>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<PushUpdate>>,
    pending: AtomicUsize,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(channel: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            channel: channel.into(),
            capacity,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            pending: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Enqueue without waiting. Returns false if the update was dropped.
    pub fn deliver(&self, update: PushUpdate) -> bool {
        let tx = lock(&self.tx);
        let sender = match tx.as_ref() {
            Some(sender) => sender,
            None => return false,
        };

        // Counted before the send so a consumer racing ahead never takes it below zero
        self.pending.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!("Queue for {} full, dropped update ({} total)", self.channel, dropped);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Wait for the next update. Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<PushUpdate> {
        let update = self.rx.lock().await.recv().await;
        if update.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        update
    }

    /// Take the next update if one is ready
    pub fn try_recv(&self) -> Option<PushUpdate> {
        let mut rx = self.rx.try_lock().ok()?;
        let update = rx.try_recv().ok();
        if update.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        update
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Updates discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting updates; pending ones remain receivable
    pub fn close(&self) {
        lock(&self.tx).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }
}

#[derive(Debug)]
struct Entry {
    id: u64,
    queue: Arc<DeliveryQueue>,
    active: bool,
}

/// Channel name → delivery queue map behind a single lock.
///
/// The lock covers map access only; queue sends and receives happen outside it.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Queue for `name`, created if absent. Does not change the active flag.
    pub fn ensure_queue(&self, name: &str, id: u64) -> Arc<DeliveryQueue> {
        let mut entries = lock(&self.entries);
        entries
            .entry(name.to_string())
            .or_insert_with(|| Entry {
                id,
                queue: Arc::new(DeliveryQueue::new(name, self.capacity)),
                active: false,
            })
            .queue
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<DeliveryQueue>> {
        lock(&self.entries).get(name).map(|entry| entry.queue.clone())
    }

    /// Mark `name` active, creating its queue if needed.
    ///
    /// Returns the queue and whether the channel was already active.
    pub fn activate(&self, name: &str, id: u64) -> (Arc<DeliveryQueue>, bool) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(name.to_string()).or_insert_with(|| Entry {
            id,
            queue: Arc::new(DeliveryQueue::new(name, self.capacity)),
            active: false,
        });
        let was_active = entry.active;
        entry.active = true;
        (entry.queue.clone(), was_active)
    }

    /// Mark `name` inactive, keeping its queue. Returns whether it was active.
    pub fn deactivate(&self, name: &str) -> bool {
        match lock(&self.entries).get_mut(name) {
            Some(entry) => std::mem::replace(&mut entry.active, false),
            None => false,
        }
    }

    /// Drop the entry and close its queue
    pub fn remove(&self, name: &str) -> Option<Arc<DeliveryQueue>> {
        let entry = lock(&self.entries).remove(name)?;
        entry.queue.close();
        Some(entry.queue)
    }

    pub fn is_active(&self, name: &str) -> bool {
        lock(&self.entries).get(name).map(|e| e.active).unwrap_or(false)
    }

    /// Active channels with their ids, sorted by name
    pub fn active_channels(&self) -> Vec<(String, u64)> {
        let mut active: Vec<_> = lock(&self.entries)
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(name, entry)| (name.clone(), entry.id))
            .collect();
        active.sort();
        active
    }

    /// Route one update to an active channel's queue without waiting
    pub fn deliver(&self, name: &str, update: PushUpdate) -> bool {
        let queue = match lock(&self.entries).get(name) {
            Some(entry) if entry.active => entry.queue.clone(),
            _ => return false,
        };
        queue.deliver(update)
    }

    /// Close every queue so blocked consumers observe the end of the stream
    pub fn close_all(&self) {
        let queues: Vec<_> = lock(&self.entries).values().map(|e| e.queue.clone()).collect();
        for queue in queues {
            queue.close();
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
