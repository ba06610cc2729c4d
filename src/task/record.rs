//! Core task record with validated status transitions.
//!
//! # Invariants
//! - `classification` is set at construction and never changes
//! - a task never transitions out of a terminal status
//! - `ledger_record.complete_tx_hash` is `Some` only when the ledger state
//!   is `Completed`
//! - `history` grows append-only, one entry per applied transition

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::protocol::Artifact;

/// Coordinator-assigned task identifier, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh random id (coordinator side).
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Submitted -> Working -> Completed
///                     \-> Failed
///                     \-> InputRequired <-> Working
///           \-> Canceled (from any non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            // Cancellation is reachable from any non-terminal state.
            (_, TaskStatus::Canceled) => true,
            (TaskStatus::Submitted, TaskStatus::Working) => true,
            (TaskStatus::Submitted, TaskStatus::Failed) => true,
            (TaskStatus::Working, TaskStatus::InputRequired) => true,
            (TaskStatus::InputRequired, TaskStatus::Working | TaskStatus::Failed) => true,
            (TaskStatus::Working, TaskStatus::Completed | TaskStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Submitted => "submitted",
            TaskStatus::Working => "working",
            TaskStatus::InputRequired => "input-required",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Whether a task needs ledger-anchored confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Informational,
    Critical,
}

/// Progress of the on-ledger record for a critical task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerState {
    None,
    CreatePending,
    Created,
    CompletePending,
    Completed,
    /// Ledger interaction was skipped (missing/invalid counterpart address).
    Skipped,
    /// A ledger call failed; the task's business outcome is unaffected.
    LedgerError,
}

/// On-ledger record for a critical task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    pub state: LedgerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_tx_hash: Option<String>,
    /// Reason for a skipped or failed ledger interaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LedgerRecord {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state,
            create_tx_hash: None,
            complete_tx_hash: None,
            detail: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            state: LedgerState::Skipped,
            create_tx_hash: None,
            complete_tx_hash: None,
            detail: Some(reason.into()),
        }
    }

    /// Record a successful create step.
    pub fn mark_created(&mut self, tx_hash: Option<String>) {
        self.state = LedgerState::Created;
        if self.create_tx_hash.is_none() {
            self.create_tx_hash = tx_hash;
        }
    }

    /// Record a successful complete step.
    ///
    /// This is the only place `complete_tx_hash` is set, keeping the
    /// invariant that it is populated only in the `Completed` state.
    pub fn mark_completed(&mut self, tx_hash: String) {
        self.state = LedgerState::Completed;
        self.complete_tx_hash = Some(tx_hash);
    }

    pub fn mark_error(&mut self, detail: impl Into<String>) {
        self.state = LedgerState::LedgerError;
        self.detail = Some(detail.into());
    }
}

/// A single applied status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: TaskStatus,
    /// RFC3339 timestamp of when the transition was applied.
    pub at: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

/// One unit of work exchanged between coordinator and service agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub session_id: String,
    pub status: TaskStatus,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_record: Option<LedgerRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    pub history: Vec<HistoryEntry>,
    /// Why the task terminated, for failed/canceled tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

impl Task {
    /// Create a task at `Submitted` with its classification fixed.
    pub fn new(id: TaskId, session_id: impl Into<String>, classification: Classification) -> Self {
        let now = now_string();
        Self {
            id,
            session_id: session_id.into(),
            status: TaskStatus::Submitted,
            classification,
            ledger_record: None,
            artifacts: Vec::new(),
            history: vec![HistoryEntry {
                status: TaskStatus::Submitted,
                at: now.clone(),
            }],
            terminal_reason: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Apply a status transition, appending to history.
    ///
    /// # Errors
    /// Returns `TaskError::InvalidTransition` if the state machine forbids
    /// the move (including any transition out of a terminal status).
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = now_string();
        self.status = next;
        self.history.push(HistoryEntry {
            status: next,
            at: now.clone(),
        });
        self.updated_at = now;
        Ok(())
    }

    /// Transition to `Failed` with a human-readable reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)?;
        self.terminal_reason = Some(reason.into());
        Ok(())
    }

    /// Transition to `Canceled` with a reason.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), TaskError> {
        self.transition(TaskStatus::Canceled)?;
        self.terminal_reason = Some(reason.into());
        Ok(())
    }

    /// Append an output fragment. Artifacts are append-only.
    pub fn push_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
        self.updated_at = now_string();
    }

    /// The ledger record, creating it at `None` on first access.
    pub fn ledger_record_mut(&mut self) -> &mut LedgerRecord {
        self.ledger_record
            .get_or_insert_with(|| LedgerRecord::new(LedgerState::None))
    }

    pub fn ledger_state(&self) -> LedgerState {
        self.ledger_record
            .as_ref()
            .map(|r| r.state)
            .unwrap_or(LedgerState::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(TaskId::new("t-1"), "s-1", Classification::Informational)
    }

    #[test]
    fn test_new_task_starts_submitted() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Submitted);
        assert_eq!(t.history.len(), 1);
        assert_eq!(t.history[0].status, TaskStatus::Submitted);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut t = task();
        t.transition(TaskStatus::Working).unwrap();
        t.transition(TaskStatus::InputRequired).unwrap();
        t.transition(TaskStatus::Working).unwrap();
        t.transition(TaskStatus::Completed).unwrap();
        assert!(t.status.is_terminal());
        assert_eq!(t.history.len(), 5);
    }

    #[test]
    fn test_terminal_states_trap() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Canceled] {
            let mut t = task();
            t.transition(TaskStatus::Working).unwrap();
            if terminal == TaskStatus::Canceled {
                t.cancel("user request").unwrap();
            } else {
                t.transition(terminal).unwrap();
            }
            for next in [
                TaskStatus::Submitted,
                TaskStatus::Working,
                TaskStatus::InputRequired,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Canceled,
            ] {
                assert_eq!(
                    t.transition(next),
                    Err(TaskError::InvalidTransition {
                        from: terminal,
                        to: next
                    })
                );
            }
        }
    }

    #[test]
    fn test_cancel_reachable_from_any_non_terminal() {
        for setup in [TaskStatus::Submitted, TaskStatus::Working, TaskStatus::InputRequired] {
            let mut t = task();
            if setup != TaskStatus::Submitted {
                t.transition(TaskStatus::Working).unwrap();
            }
            if setup == TaskStatus::InputRequired {
                t.transition(TaskStatus::InputRequired).unwrap();
            }
            t.cancel("stop").unwrap();
            assert_eq!(t.status, TaskStatus::Canceled);
            assert_eq!(t.terminal_reason.as_deref(), Some("stop"));
        }
    }

    #[test]
    fn test_cannot_skip_working() {
        let mut t = task();
        assert!(t.transition(TaskStatus::Completed).is_err());
        assert!(t.transition(TaskStatus::InputRequired).is_err());
    }

    #[test]
    fn test_history_timestamps_monotonic() {
        let mut t = task();
        t.transition(TaskStatus::Working).unwrap();
        t.transition(TaskStatus::Completed).unwrap();
        let stamps: Vec<&String> = t.history.iter().map(|h| &h.at).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] <= pair[1], "history timestamps must not decrease");
        }
    }

    #[test]
    fn test_complete_tx_hash_only_in_completed_state() {
        let mut record = LedgerRecord::new(LedgerState::CreatePending);
        assert!(record.complete_tx_hash.is_none());
        record.mark_created(Some("0xaaa".to_string()));
        assert!(record.complete_tx_hash.is_none());
        record.mark_completed("0xbbb".to_string());
        assert_eq!(record.state, LedgerState::Completed);
        assert_eq!(record.complete_tx_hash.as_deref(), Some("0xbbb"));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_value(TaskStatus::InputRequired).unwrap();
        assert_eq!(json, "input-required");
    }
}
