//! Task storage with pluggable backends.
//!
//! The store is shared across all concurrent sessions. Writes replace whole
//! `Task` records, so readers always observe a consistent snapshot; mutation
//! of a given task is restricted by convention to the lifecycle path handling
//! it (single-writer rule).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use super::{LedgerState, Task, TaskId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("task {0} not found")]
    NotFound(TaskId),
}

/// Task store trait - implemented by all storage backends.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails if the id is already present.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;

    /// Replace a stored task wholesale.
    async fn put(&self, task: Task) -> Result<(), StoreError>;

    /// Fetch a task by id.
    async fn get(&self, id: &TaskId) -> Option<Task>;

    /// Fetch all tasks spawned by a session.
    async fn get_by_session(&self, session_id: &str) -> Vec<Task>;

    /// List tasks ordered by `updated_at` descending.
    async fn list(&self, limit: usize, offset: usize) -> Vec<Task>;

    /// Consume a session id for a critical create step.
    ///
    /// Returns `false` if the session was already consumed (replay guard):
    /// the caller must not run a second ledger create for it.
    async fn try_consume_session(&self, session_id: &str) -> bool;

    /// Terminal tasks whose ledger record is stuck at `Created`.
    ///
    /// These are candidates for out-of-band settlement; nothing in-process
    /// retries them.
    async fn list_unsettled(&self) -> Vec<Task>;

    /// Evict terminal tasks not updated within `max_age`. Returns the count.
    async fn sweep_expired(&self, max_age: Duration) -> usize;
}

/// In-memory task store (non-persistent).
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    consumed_sessions: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn put(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(StoreError::NotFound(task.id));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn get_by_session(&self, session_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    async fn list(&self, limit: usize, offset: usize) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        tasks.into_iter().skip(offset).take(limit).collect()
    }

    async fn try_consume_session(&self, session_id: &str) -> bool {
        self.consumed_sessions
            .write()
            .await
            .insert(session_id.to_string())
    }

    async fn list_unsettled(&self) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.status.is_terminal() && t.ledger_state() == LedgerState::Created)
            .cloned()
            .collect()
    }

    async fn sweep_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));

        let mut tasks = self.tasks.write().await;
        let to_delete: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, t)| {
                t.status.is_terminal()
                    && chrono::DateTime::parse_from_rfc3339(&t.updated_at)
                        .map(|at| at < cutoff)
                        .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &to_delete {
            tasks.remove(id);
        }
        to_delete.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Classification, TaskStatus};

    fn task(id: &str, session: &str) -> Task {
        Task::new(TaskId::new(id), session, Classification::Informational)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryTaskStore::new();
        store.insert(task("t-1", "s-1")).await.unwrap();
        let fetched = store.get(&TaskId::new("t-1")).await.unwrap();
        assert_eq!(fetched.session_id, "s-1");
    }

    #[tokio::test]
    async fn test_double_insert_rejected() {
        let store = InMemoryTaskStore::new();
        store.insert(task("t-1", "s-1")).await.unwrap();
        assert_eq!(
            store.insert(task("t-1", "s-2")).await,
            Err(StoreError::AlreadyExists(TaskId::new("t-1")))
        );
    }

    #[tokio::test]
    async fn test_put_requires_existing() {
        let store = InMemoryTaskStore::new();
        assert_eq!(
            store.put(task("t-1", "s-1")).await,
            Err(StoreError::NotFound(TaskId::new("t-1")))
        );
    }

    #[tokio::test]
    async fn test_session_index() {
        let store = InMemoryTaskStore::new();
        store.insert(task("t-1", "s-1")).await.unwrap();
        store.insert(task("t-2", "s-1")).await.unwrap();
        store.insert(task("t-3", "s-2")).await.unwrap();
        assert_eq!(store.get_by_session("s-1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_session_consumed_once() {
        let store = InMemoryTaskStore::new();
        assert!(store.try_consume_session("s-1").await);
        assert!(!store.try_consume_session("s-1").await);
        assert!(store.try_consume_session("s-2").await);
    }

    #[tokio::test]
    async fn test_sweep_only_evicts_terminal_tasks() {
        let store = InMemoryTaskStore::new();

        let mut done = task("t-done", "s-1");
        done.transition(TaskStatus::Working).unwrap();
        done.transition(TaskStatus::Completed).unwrap();
        // Backdate so the sweep cutoff catches it.
        done.updated_at = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        store.insert(done).await.unwrap();

        let mut active = task("t-active", "s-2");
        active.updated_at = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        store.insert(active).await.unwrap();

        let swept = store.sweep_expired(Duration::from_secs(3600)).await;
        assert_eq!(swept, 1);
        assert!(store.get(&TaskId::new("t-done")).await.is_none());
        assert!(store.get(&TaskId::new("t-active")).await.is_some());
    }

    #[tokio::test]
    async fn test_list_unsettled() {
        let store = InMemoryTaskStore::new();

        let mut orphaned = task("t-orphan", "s-1");
        orphaned.transition(TaskStatus::Working).unwrap();
        orphaned.ledger_record_mut().mark_created(Some("0xaaa".to_string()));
        orphaned.transition(TaskStatus::Completed).unwrap();
        store.insert(orphaned).await.unwrap();

        let mut settled = task("t-settled", "s-2");
        settled.transition(TaskStatus::Working).unwrap();
        settled.ledger_record_mut().mark_created(Some("0xbbb".to_string()));
        settled.ledger_record_mut().mark_completed("0xccc".to_string());
        settled.transition(TaskStatus::Completed).unwrap();
        store.insert(settled).await.unwrap();

        let unsettled = store.list_unsettled().await;
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].id.as_str(), "t-orphan");
    }
}
