// src/bot/violations.rs - Per-user violation counters with timed resets

use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::types::{UserId, ViolationRecord};

struct PendingReset {
    generation: u64,
    handle: JoinHandle<()>,
}

/// In-memory violation records keyed by user.
///
/// All mutations go through the records write lock, so updates to the same
/// user never interleave. Each user has at most one pending reset: a newer
/// schedule aborts and invalidates the previous one.
pub struct ViolationStore {
    records: Arc<RwLock<HashMap<UserId, ViolationRecord>>>,
    pending_resets: Arc<RwLock<HashMap<UserId, PendingReset>>>,
    next_generation: AtomicU64,
}

impl ViolationStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            pending_resets: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Count one violation, creating the record on first offense
    pub async fn record_violation(&self, user_id: UserId) -> ViolationRecord {
        let mut records = self.records.write().await;
        let record = records
            .entry(user_id)
            .or_insert_with(|| ViolationRecord::new(user_id));
        record.count += 1;
        record.last_violation_at = Some(chrono::Utc::now());
        debug!("User {} now has {} violations", user_id, record.count);
        record.clone()
    }

    pub async fn mark_disconnected(&self, user_id: UserId) {
        if let Some(record) = self.records.write().await.get_mut(&user_id) {
            record.is_disconnected = true;
        }
    }

    /// After `after` elapses, clear the user's count and disconnect flag.
    /// Replaces any reset already pending for the user.
    pub async fn schedule_reset(&self, user_id: UserId, after: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        let records = Arc::clone(&self.records);
        let pending_resets = Arc::clone(&self.pending_resets);

        // Hold the pending map while spawning so the task cannot look itself
        // up before it is registered.
        let mut pending = self.pending_resets.write().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;

            let mut pending = pending_resets.write().await;
            match pending.get(&user_id) {
                Some(current) if current.generation == generation => {
                    pending.remove(&user_id);
                }
                _ => return,
            }
            drop(pending);

            if let Some(record) = records.write().await.get_mut(&user_id) {
                record.count = 0;
                record.is_disconnected = false;
                info!("User {} violation timeout expired - reset violation count", user_id);
            }
        });

        if let Some(previous) = pending.insert(user_id, PendingReset { generation, handle }) {
            debug!("Replacing pending reset for user {}", user_id);
            previous.handle.abort();
        }
    }

    pub async fn get(&self, user_id: UserId) -> Option<ViolationRecord> {
        self.records.read().await.get(&user_id).cloned()
    }

    /// All known records, ordered by user id
    pub async fn list_all(&self) -> Vec<(UserId, ViolationRecord)> {
        let mut all: Vec<(UserId, ViolationRecord)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub async fn has_pending_reset(&self, user_id: UserId) -> bool {
        self.pending_resets.read().await.contains_key(&user_id)
    }

    /// Abort every pending reset (shutdown)
    pub async fn cancel_all_resets(&self) {
        let mut pending = self.pending_resets.write().await;
        for (_, reset) in pending.drain() {
            reset.handle.abort();
        }
    }
}

impl Default for ViolationStore {
    fn default() -> Self {
        Self::new()
    }
}
