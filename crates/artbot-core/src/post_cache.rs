//! Short-lived record of which user caused each bot message.
//!
//! Entries expire on their own after the TTL; they are never refreshed on read.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use tokio::time::Instant;

use crate::domain::{MessageRef, UserId};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug)]
struct Entry {
    author: UserId,
    inserted_at: Instant,
    generation: u64,
}

#[derive(Debug)]
pub struct PostCache {
    ttl: Duration,
    entries: Mutex<HashMap<MessageRef, Entry>>,
    next_generation: AtomicU64,
}

impl PostCache {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<MessageRef, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `author` for `message` and schedule its eviction.
    ///
    /// Re-inserting a message restarts its TTL; the older timer becomes a no-op.
    /// Must be called inside a Tokio runtime.
    pub fn put(self: &Arc<Self>, message: MessageRef, author: UserId) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.entries().insert(
            message,
            Entry {
                author,
                inserted_at: Instant::now(),
                generation,
            },
        );

        let cache: Weak<Self> = Arc::downgrade(self);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(cache) = cache.upgrade() {
                cache.evict_generation(message, generation);
            }
        });
    }

    /// Author of `message`, if it is still cached.
    pub fn get(&self, message: MessageRef) -> Option<UserId> {
        let entries = self.entries();
        let entry = entries.get(&message)?;
        (entry.inserted_at.elapsed() < self.ttl).then_some(entry.author)
    }

    pub fn is_author(&self, message: MessageRef, user: UserId) -> bool {
        self.get(message) == Some(user)
    }

    /// Forget `message`. Evicting a missing entry is fine.
    pub fn evict(&self, message: MessageRef) {
        self.entries().remove(&message);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_generation(&self, message: MessageRef, generation: u64) {
        let mut entries = self.entries();
        if entries.get(&message).map(|e| e.generation) == Some(generation) {
            entries.remove(&message);
        }
    }
}
