//! Result cache collaborator.
//!
//! Before starting a task the loop may look up a fingerprint of
//! `(query, context)`; after an answered task it stores the answer under
//! the same key. Expiry and invalidation belong to the cache.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::message::Message;

/// What the cache remembers about a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAnswer {
    pub answer: String,
    pub iterations: u32,
}

/// A lookup/store interface keyed by task fingerprint.
pub trait ResultCache: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<CachedAnswer>;
    fn put(&self, fingerprint: &str, answer: CachedAnswer);
}

/// Derive the cache key for a query and its conversation context.
///
/// Lowercase hex SHA-256. Fields are length-prefixed so that different
/// splits of the same characters never collide.
pub fn fingerprint(query: &str, context: &[Message]) -> String {
    let mut hasher = Sha256::new();
    let mut feed = |part: &str| {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    };
    feed(query.trim());
    for message in context {
        feed(message.role.as_str());
        feed(&message.content);
    }
    format!("{:x}", hasher.finalize())
}

/// Process-local cache with a fixed time-to-live.
pub struct InMemoryResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, CachedAnswer)>>,
}

impl InMemoryResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryResultCache {
    fn get(&self, fingerprint: &str) -> Option<CachedAnswer> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(fingerprint) {
            Some((stored_at, answer)) if stored_at.elapsed() < self.ttl => Some(answer.clone()),
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    fn put(&self, fingerprint: &str, answer: CachedAnswer) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
            entries.insert(fingerprint.to_string(), (Instant::now(), answer));
        }
    }
}
