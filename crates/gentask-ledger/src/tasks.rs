//! Durable task record store.
//!
//! Records must be readable by a process (or connection) other than the
//! one that created them: a fire-and-forget client submits, disconnects,
//! and later polls status from a different request. Completed records are
//! kept for a bounded retention window, then purged; purge never touches
//! a record that is not yet terminal.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use gentask_models::{TaskId, TaskRecord};

use crate::error::{LedgerError, LedgerResult};

/// How long terminal records are kept before becoming purge-eligible.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            // ~90 days of completed jobs
            window: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Records updated before this instant are purge-eligible.
    pub fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero())
    }
}

/// Durable record store for task lifecycle.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a newly accepted task.
    async fn create(&self, record: &TaskRecord) -> LedgerResult<()>;

    /// Persist the current state of an existing task. Every state machine
    /// transition goes through here before being acted upon further.
    async fn update(&self, record: &TaskRecord) -> LedgerResult<()>;

    /// Fetch a task by id.
    async fn get(&self, id: &TaskId) -> LedgerResult<Option<TaskRecord>>;

    /// All non-terminal records (recovery after restart).
    async fn list_active(&self) -> LedgerResult<Vec<TaskRecord>>;

    /// All terminal records still inside retention (reconciliation sweep).
    async fn list_terminal(&self) -> LedgerResult<Vec<TaskRecord>>;

    /// Delete terminal records last updated before `cutoff`. Returns the
    /// number purged. Non-terminal records are never purged.
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize>;
}

/// In-memory task store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    records: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, record: &TaskRecord) -> LedgerResult<()> {
        let mut records = self.records.write().await;
        let key = record.id.as_str().to_string();
        if records.contains_key(&key) {
            return Err(LedgerError::TaskAlreadyExists(key));
        }
        records.insert(key, record.clone());
        debug!(task_id = %record.id, "Created task record");
        Ok(())
    }

    async fn update(&self, record: &TaskRecord) -> LedgerResult<()> {
        let mut records = self.records.write().await;
        let key = record.id.as_str().to_string();
        if !records.contains_key(&key) {
            return Err(LedgerError::TaskNotFound(key));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> LedgerResult<Option<TaskRecord>> {
        let records = self.records.read().await;
        Ok(records.get(id.as_str()).cloned())
    }

    async fn list_active(&self) -> LedgerResult<Vec<TaskRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_terminal(&self) -> LedgerResult<Vec<TaskRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.is_terminal())
            .cloned()
            .collect())
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !(r.is_terminal() && r.updated_at < cutoff));
        let purged = before - records.len();
        if purged > 0 {
            info!(purged, "Purged terminal task records past retention");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gentask_models::{GenerationKind, GenerationSpec, ReservationId};

    fn record() -> TaskRecord {
        TaskRecord::new(
            "user-1",
            GenerationSpec::new(GenerationKind::Video, "test"),
            ReservationId::new(),
        )
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let store = InMemoryTaskStore::new();
        let mut rec = record();
        store.create(&rec).await.unwrap();

        assert!(store.create(&rec).await.is_err());

        rec.begin_attempt("veyra");
        rec.attempt_submitted("job-1");
        store.update(&rec).await.unwrap();

        let fetched = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(fetched.attempts_tried(), 1);
        assert_eq!(fetched.state, gentask_models::TaskState::Polling);
    }

    #[tokio::test]
    async fn test_update_missing_task_fails() {
        let store = InMemoryTaskStore::new();
        assert!(matches!(
            store.update(&record()).await,
            Err(LedgerError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_active_excludes_terminal() {
        let store = InMemoryTaskStore::new();

        let live = record();
        store.create(&live).await.unwrap();

        let mut done = record();
        done.begin_attempt("veyra");
        done.attempt_submitted("job-1");
        done.complete("https://x/v.mp4");
        store.create(&done).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
    }

    #[tokio::test]
    async fn test_purge_skips_non_terminal_records() {
        let store = InMemoryTaskStore::new();

        // Old but still live: must never be purged
        let mut live = record();
        live.updated_at = Utc::now() - chrono::Duration::days(365);
        store.create(&live).await.unwrap();

        // Old and terminal: purge-eligible
        let mut done = record();
        done.complete("https://x/v.mp4");
        done.updated_at = Utc::now() - chrono::Duration::days(365);
        store.create(&done).await.unwrap();

        // Fresh and terminal: inside the retention window
        let mut fresh = record();
        fresh.complete("https://x/v.mp4");
        store.create(&fresh).await.unwrap();

        let purged = store
            .purge_terminal_before(RetentionPolicy::default().cutoff())
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.get(&live.id).await.unwrap().is_some());
        assert!(store.get(&done.id).await.unwrap().is_none());
        assert!(store.get(&fresh.id).await.unwrap().is_some());
    }
}
