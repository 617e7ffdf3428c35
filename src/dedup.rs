//! Dedup Cache (spec §3, §4.2): time-bounded set of recently-seen
//! idempotency keys. `check -> process -> mark` is the caller's contract;
//! `mark` only happens after a successful send so a failed attempt can be
//! retried.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct DedupCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `true` iff the key has been marked and its TTL has not expired.
    /// Lazily evicts the key if it has expired (spec: "no background
    /// sweeper required").
    pub fn check(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(expiry) if *expiry > Instant::now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Records the key with expiry = now + TTL.
    pub fn mark(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), Instant::now() + self.ttl);
    }
}
