//! Broadcaster (spec §3, §4.5): in-memory pub/sub of persisted events, keyed
//! by conversation. Publish never blocks on a slow subscriber — a full
//! channel drops the event for that subscriber only (spec invariant 7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::LedgerEvent;

/// Per-subscriber channel buffer (spec §4.5, §5).
const SUBSCRIBER_CHANNEL_BUFFER: usize = 64;

pub type SubscriberId = u64;

#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<HashMap<String, HashMap<SubscriberId, mpsc::Sender<LedgerEvent>>>>>,
    next_id: Arc<AtomicU64>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Allocates a bounded channel for `conversation_key` and returns the
    /// receive end plus an opaque subscriber id. Subscribe/Unsubscribe hold
    /// the write lock (spec §4.5 invariants); Publish only snapshots under a
    /// read lock.
    pub fn subscribe(&self, conversation_key: &str) -> (mpsc::Receiver<LedgerEvent>, SubscriberId) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.entry(conversation_key.to_string())
            .or_default()
            .insert(id, tx);
        (rx, id)
    }

    /// Non-blocking send to every subscriber of `conversation_key` other
    /// than `exclude`. A full channel drops the event for that subscriber
    /// only, logged at debug level (spec invariant 7).
    pub fn publish(&self, conversation_key: &str, event: LedgerEvent, exclude: Option<SubscriberId>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let targets: Vec<(SubscriberId, mpsc::Sender<LedgerEvent>)> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(conversation_key) {
                Some(map) => map
                    .iter()
                    .filter(|(id, _)| Some(**id) != exclude)
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return,
            }
        };

        for (id, tx) in targets {
            if tx.try_send(event.clone()).is_err() {
                debug!(conversation_key, subscriber_id = id, "dropping event for full/closed subscriber");
            }
        }
    }

    /// Removes the subscriber entry, closing its channel, and purges the
    /// per-conversation map entry if it becomes empty.
    pub fn unsubscribe(&self, conversation_key: &str, id: SubscriberId) {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(map) = subs.get_mut(conversation_key) {
            map.remove(&id);
            if map.is_empty() {
                subs.remove(conversation_key);
            }
        }
    }

    /// Drops and closes all subscribers; subsequent publishes are a no-op.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subs.clear();
    }

    pub fn subscriber_count(&self, conversation_key: &str) -> usize {
        let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        subs.get(conversation_key).map(|m| m.len()).unwrap_or(0)
    }
}
