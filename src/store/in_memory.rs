//! In-memory priority store for tests and local runs.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{PriorityStore, StoreError};
use crate::priority::Priority;

#[derive(Debug, Clone, Copy)]
struct StoredPriority {
    priority: Priority,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl StoredPriority {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug)]
pub struct InMemoryPriorityStore {
    entries: DashMap<String, StoredPriority>,
    ttl: Duration,
    fail_writes: AtomicBool,
    write_count: AtomicU64,
}

impl InMemoryPriorityStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            fail_writes: AtomicBool::new(false),
            write_count: AtomicU64::new(0),
        }
    }

    /// Make subsequent writes fail until cleared
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Entries currently held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PriorityStore for InMemoryPriorityStore {
    async fn set(&self, session_id: &str, priority: Priority) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write(session_id, "in-memory store rejecting writes"));
        }

        self.entries.insert(
            session_id.to_string(),
            StoredPriority {
                priority,
                expires_at: Instant::now().checked_add(self.ttl),
            },
        );
        self.write_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Priority>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(session_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.priority))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn store_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryPriorityStore::new(Duration::from_secs(60));
        store.set("s1", Priority::Low).await.unwrap();
        store.set("s1", Priority::High).await.unwrap();

        assert_eq!(store.get("s1").await.unwrap(), Some(Priority::High));
        assert_eq!(store.get("s2").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let store = InMemoryPriorityStore::new(Duration::MAX);
        store.set("s1", Priority::High).await.unwrap();

        assert_eq!(store.get("s1").await.unwrap(), Some(Priority::High));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_hidden_then_purged() {
        let store = InMemoryPriorityStore::new(Duration::from_millis(20));
        store.set("s1", Priority::Low).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("s1").await.unwrap(), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_entry() {
        let store = InMemoryPriorityStore::new(Duration::from_secs(60));
        store.set_fail_writes(true);

        assert!(matches!(
            store.set("s1", Priority::High).await,
            Err(StoreError::Write { .. })
        ));
        assert_eq!(store.get("s1").await.unwrap(), None);
    }
}
