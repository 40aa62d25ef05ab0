//! # In-Memory Work Queue
//!
//! Thread-safe process-local queue with the same delivery semantics as the
//! PostgreSQL provider: per-delivery heartbeats, ownership checks, and
//! reclaimed deliveries returning to the front of the queue.
//!
//! Failure injection hooks let tests drive the consumer's error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::errors::QueueError;
use super::is_orphaned;
use super::traits::WorkQueue;
use super::types::{ConsumerId, DeliveryHandle, QueueStats, WorkItem};

/// Where a delivery currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Ready,
    Unacked,
    Rejected,
}

#[derive(Debug, Clone)]
struct Entry {
    session_id: String,
    state: DeliveryState,
    consumer: Option<ConsumerId>,
    last_heartbeat: Option<DateTime<Utc>>,
    delivery_count: u32,
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<u64>,
    entries: HashMap<u64, Entry>,
    next_id: u64,
}

impl Inner {
    fn owned_unacked(&mut self, consumer: &ConsumerId, handle: &DeliveryHandle) -> Option<u64> {
        let id = handle.as_u64()?;
        let entry = self.entries.get(&id)?;
        (entry.state == DeliveryState::Unacked && entry.consumer.as_ref() == Some(consumer))
            .then_some(id)
    }
}

#[derive(Debug)]
pub struct InMemoryWorkQueue {
    name: String,
    inner: Mutex<Inner>,
    fail_fetch: AtomicBool,
    fail_heartbeat: AtomicBool,
    fail_ack: AtomicBool,
    fail_reject: AtomicBool,
}

impl InMemoryWorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
            fail_fetch: AtomicBool::new(false),
            fail_heartbeat: AtomicBool::new(false),
            fail_ack: AtomicBool::new(false),
            fail_reject: AtomicBool::new(false),
        }
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_heartbeat(&self, fail: bool) {
        self.fail_heartbeat.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ack(&self, fail: bool) {
        self.fail_ack.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reject(&self, fail: bool) {
        self.fail_reject.store(fail, Ordering::SeqCst);
    }

    pub fn state_of(&self, handle: &DeliveryHandle) -> Option<DeliveryState> {
        let id = handle.as_u64()?;
        self.inner.lock().entries.get(&id).map(|e| e.state)
    }

    pub fn delivery_count(&self, handle: &DeliveryHandle) -> Option<u32> {
        let id = handle.as_u64()?;
        self.inner.lock().entries.get(&id).map(|e| e.delivery_count)
    }

    /// Session ids in ready order
    pub fn ready_session_ids(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .ready
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|e| e.session_id.clone()))
            .collect()
    }

    pub fn rejected_session_ids(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut rejected: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.state == DeliveryState::Rejected)
            .map(|(id, e)| (*id, e.session_id.clone()))
            .collect();
        rejected.sort_by_key(|(id, _)| *id);
        rejected.into_iter().map(|(_, s)| s).collect()
    }

    /// Total entries not yet acknowledged, in any state
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, session_id: &str) -> Result<DeliveryHandle, QueueError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(
            id,
            Entry {
                session_id: session_id.to_string(),
                state: DeliveryState::Ready,
                consumer: None,
                last_heartbeat: None,
                delivery_count: 0,
                enqueued_at: Utc::now(),
            },
        );
        inner.ready.push_back(id);
        Ok(DeliveryHandle::from(id))
    }

    async fn fetch(&self, consumer: &ConsumerId, max: usize) -> Result<Vec<WorkItem>, QueueError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(QueueError::consume(&self.name, "in-memory fetch failure"));
        }

        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut items = Vec::new();

        while items.len() < max {
            let Some(id) = inner.ready.pop_front() else {
                break;
            };
            let Some(entry) = inner.entries.get_mut(&id) else {
                continue;
            };
            entry.state = DeliveryState::Unacked;
            entry.consumer = Some(consumer.clone());
            entry.last_heartbeat = Some(now);
            entry.delivery_count += 1;

            items.push(WorkItem {
                session_id: entry.session_id.clone(),
                handle: DeliveryHandle::from(id),
                delivery_count: entry.delivery_count,
                enqueued_at: entry.enqueued_at,
            });
        }

        Ok(items)
    }

    async fn ack(&self, consumer: &ConsumerId, handle: &DeliveryHandle) -> Result<(), QueueError> {
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(QueueError::delivery(handle.clone(), "ack", "in-memory ack failure"));
        }

        let mut inner = self.inner.lock();
        let id = inner
            .owned_unacked(consumer, handle)
            .ok_or_else(|| QueueError::not_found(handle.clone()))?;
        inner.entries.remove(&id);
        Ok(())
    }

    async fn reject(
        &self,
        consumer: &ConsumerId,
        handle: &DeliveryHandle,
    ) -> Result<(), QueueError> {
        if self.fail_reject.load(Ordering::SeqCst) {
            return Err(QueueError::delivery(handle.clone(), "reject", "in-memory reject failure"));
        }

        let mut inner = self.inner.lock();
        let id = inner
            .owned_unacked(consumer, handle)
            .ok_or_else(|| QueueError::not_found(handle.clone()))?;
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.state = DeliveryState::Rejected;
            entry.consumer = None;
            entry.last_heartbeat = None;
        }
        Ok(())
    }

    async fn heartbeat(
        &self,
        consumer: &ConsumerId,
        handles: &[DeliveryHandle],
    ) -> Result<u64, QueueError> {
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(QueueError::connection("in-memory heartbeat failure"));
        }

        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut refreshed = 0;
        for handle in handles {
            if let Some(id) = inner.owned_unacked(consumer, handle) {
                if let Some(entry) = inner.entries.get_mut(&id) {
                    entry.last_heartbeat = Some(now);
                    refreshed += 1;
                }
            }
        }
        Ok(refreshed)
    }

    async fn reclaim_orphans(&self, liveness_window: Duration) -> Result<u64, QueueError> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let mut orphans: Vec<u64> = inner
            .entries
            .iter()
            .filter(|(_, e)| {
                e.state == DeliveryState::Unacked
                    && e.last_heartbeat
                        .map(|hb| is_orphaned(hb, now, liveness_window))
                        .unwrap_or(true)
            })
            .map(|(id, _)| *id)
            .collect();

        // Push newest first so the oldest orphan ends up at the very front
        orphans.sort_unstable_by(|a, b| b.cmp(a));
        for id in &orphans {
            if let Some(entry) = inner.entries.get_mut(id) {
                entry.state = DeliveryState::Ready;
                entry.consumer = None;
                entry.last_heartbeat = None;
            }
            inner.ready.push_front(*id);
        }

        Ok(orphans.len() as u64)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let inner = self.inner.lock();
        let mut stats = QueueStats::new(&self.name);
        for entry in inner.entries.values() {
            match entry.state {
                DeliveryState::Ready => stats.ready += 1,
                DeliveryState::Unacked => stats.unacked += 1,
                DeliveryState::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
