//! Business-execution seam.
//!
//! The trust layer never interprets request content; it hands the payload to
//! a `TaskExecutor` (the domain agent) and turns its updates into task
//! artifacts and transitions. Executors are the only collaborator whose
//! errors can fail a task.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::Artifact;
use crate::task::TaskId;

/// What the executor is asked to do.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task_id: TaskId,
    pub session_id: String,
    pub tool: String,
    pub message: String,
    pub metadata: Value,
}

/// Business execution failed; the only error class that fails a task.
#[derive(Debug, Error)]
#[error("business execution failed: {message}")]
pub struct ExecutorError {
    pub message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Final result of business execution.
#[derive(Debug, Clone)]
pub enum ExecutorOutcome {
    /// The service was rendered; `artifact` is the final output.
    Completed { artifact: Artifact },
    /// More input is needed before the task can finish.
    InputRequired { prompt: String },
}

/// Intermediate progress pushed during streaming execution.
#[derive(Debug, Clone)]
pub enum ExecutorUpdate {
    /// Free-text progress note, appended to the task as a text artifact.
    Progress { message: String },
    /// A structured intermediate artifact.
    Artifact { artifact: Artifact },
}

/// The excluded business collaborator.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// One-shot execution.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutcome, ExecutorError>;

    /// Streaming execution: push progress through `updates`, then return the
    /// final outcome. The default implementation emits no intermediate
    /// updates.
    async fn execute_streaming(
        &self,
        request: &ExecutionRequest,
        updates: mpsc::UnboundedSender<ExecutorUpdate>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        let _ = updates;
        self.execute(request).await
    }
}

/// Trivial executor that acknowledges the request with a text artifact.
///
/// Stands in for a real domain agent in examples and wiring; real
/// deployments provide their own `TaskExecutor`.
#[derive(Debug, Clone, Default)]
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutorOutcome, ExecutorError> {
        if request.message.trim().is_empty() {
            return Ok(ExecutorOutcome::InputRequired {
                prompt: "What would you like me to do?".to_string(),
            });
        }
        Ok(ExecutorOutcome::Completed {
            artifact: Artifact::text(format!(
                "Handled {} request: {}",
                request.tool, request.message
            )),
        })
    }
}
