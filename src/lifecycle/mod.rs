//! Task lifecycle orchestration.
//!
//! `TaskLifecycleManager` receives signed envelopes, verifies them, consults
//! the routing policy, optionally drives the ledger create/complete cycle,
//! hands off to the business executor, and records every transition in the
//! task store. Ledger failures degrade into recorded state; they never fail
//! the task's business outcome.
//!
//! Concurrency model: each `handle` call is an independent future. Ledger
//! calls are the only internal suspension points and are bounded by the
//! client's timeouts. Transitions for a single task are serialized behind a
//! per-task lock; snapshots are emitted in the exact order transitions are
//! applied.

mod executor;

pub use executor::{
    EchoExecutor, ExecutionRequest, ExecutorError, ExecutorOutcome, ExecutorUpdate, TaskExecutor,
};

use futures::Stream;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::identity::{LedgerAddress, SignatureCodec};
use crate::ledger::{LedgerClient, LedgerErrorKind};
use crate::protocol::{AgentCard, Artifact, SignedEnvelope};
use crate::routing::RoutingPolicy;
use crate::task::{
    Classification, LedgerRecord, LedgerState, StoreError, Task, TaskError, TaskId, TaskStatus,
    TaskStore,
};

/// Terminal reason recorded when a critical request fails verification.
pub const REASON_SIGNATURE_INVALID: &str = "SignatureInvalid";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} already exists and is not awaiting input")]
    TaskAlreadyExists(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Ledger address the task is attributed to. `None` or a malformed
    /// value triggers the skipped-ledger degradation path, never a failure.
    pub counterpart_address: Option<String>,
    /// Bounty escrowed per critical task, in octas.
    pub bounty_octas: u64,
    /// On-ledger task deadline.
    pub deadline_secs: u64,
    /// Verify envelope signatures at all.
    pub verify_signatures: bool,
    /// Reject informational requests on signature failure instead of
    /// proceeding with a warning.
    pub strict_informational: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            counterpart_address: None,
            bounty_octas: 1_000_000,
            deadline_secs: 7_200,
            verify_signatures: true,
            strict_informational: false,
        }
    }
}

/// Orchestrates the full task lifecycle for one service agent.
pub struct TaskLifecycleManager {
    store: Arc<dyn TaskStore>,
    ledger: Arc<dyn LedgerClient>,
    codec: SignatureCodec,
    routing: RoutingPolicy,
    executor: Arc<dyn TaskExecutor>,
    config: LifecycleConfig,
    task_locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
    cancel_requested: Mutex<HashSet<TaskId>>,
}

impl TaskLifecycleManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn LedgerClient>,
        codec: SignatureCodec,
        routing: RoutingPolicy,
        executor: Arc<dyn TaskExecutor>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            codec,
            routing,
            executor,
            config,
            task_locks: Mutex::new(HashMap::new()),
            cancel_requested: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// The static capability card coordinators discover.
    pub fn agent_card(&self, name: &str, description: &str, version: &str) -> AgentCard {
        AgentCard {
            name: name.to_string(),
            description: description.to_string(),
            version: version.to_string(),
            signing_address: self.codec.local_address().to_string(),
            critical_tools: self
                .routing
                .critical_tools()
                .into_iter()
                .map(str::to_string)
                .collect(),
            streaming: true,
        }
    }

    /// Handle an envelope to completion, returning the final task snapshot.
    pub async fn handle(&self, envelope: SignedEnvelope) -> Result<Task, LifecycleError> {
        let task_id = TaskId::new(envelope.payload.task_id.clone());
        // Keep the receiver alive so emits never observe a closed channel.
        let (tx, _rx) = mpsc::unbounded_channel();
        self.process(envelope, tx).await?;
        self.store
            .get(&task_id)
            .await
            .ok_or(LifecycleError::TaskNotFound(task_id))
    }

    /// Handle an envelope, yielding a task snapshot after every transition.
    ///
    /// The stream is finite and non-restartable: it ends when the task
    /// parks at `InputRequired` or reaches a terminal status. Snapshots are
    /// yielded in the order their transitions were applied.
    pub fn handle_streaming(self: Arc<Self>, envelope: SignedEnvelope) -> impl Stream<Item = Task> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            if let Err(e) = manager.process(envelope, tx).await {
                warn!("task processing failed: {e}");
            }
        });

        async_stream::stream! {
            while let Some(task) = rx.recv().await {
                yield task;
            }
        }
    }

    /// Cancel a task from outside its handling path.
    ///
    /// Stops further ledger and business calls for the task. Already
    /// committed ledger effects are not rolled back; when a ledger record
    /// exists and no handler is mid-flight, a best-effort on-ledger cancel
    /// is recorded for audit.
    pub async fn cancel(&self, task_id: &TaskId, reason: &str) -> Result<Task, LifecycleError> {
        let mut task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| LifecycleError::TaskNotFound(task_id.clone()))?;

        if task.status.is_terminal() {
            return Ok(task);
        }

        self.cancel_requested
            .lock()
            .expect("cancel flag lock poisoned")
            .insert(task_id.clone());

        task.cancel(reason)?;
        self.store.put(task.clone()).await?;
        info!("task {task_id} canceled: {reason}");

        if task.ledger_state() == LedgerState::Created {
            let lock = self.task_lock(task_id);
            let try_guard = lock.try_lock();
            if let Ok(_guard) = try_guard {
                match self.ledger.cancel_task(task_id.as_str()).await {
                    Ok(receipt) => {
                        task.ledger_record_mut().detail =
                            Some(format!("canceled on ledger: {}", receipt.tx_hash));
                    }
                    Err(e) => {
                        warn!("ledger cancel for task {task_id} failed: {e}");
                        task.ledger_record_mut().detail =
                            Some(format!("ledger cancel failed: {e}"));
                    }
                }
                self.store.put(task.clone()).await?;
            } else {
                debug!("task {task_id} handler in flight, skipping ledger cancel");
            }
        }

        Ok(task)
    }

    fn task_lock(&self, task_id: &TaskId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.task_locks.lock().expect("task lock registry poisoned");
        locks
            .entry(task_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn is_cancel_requested(&self, task_id: &TaskId) -> bool {
        self.cancel_requested
            .lock()
            .expect("cancel flag lock poisoned")
            .contains(task_id)
    }

    /// Persist a snapshot and publish it to stream subscribers.
    ///
    /// Returns `false` when the task was canceled out from under the
    /// handler; the canceled status in the store is left intact and only
    /// the ledger record is merged in for audit.
    async fn persist_and_emit(&self, task: &Task, tx: &mpsc::UnboundedSender<Task>) -> bool {
        if self.is_cancel_requested(&task.id) {
            if let Some(mut stored) = self.store.get(&task.id).await {
                stored.ledger_record = task.ledger_record.clone();
                if let Err(e) = self.store.put(stored).await {
                    debug!("could not record ledger audit state for {}: {e}", task.id);
                }
            }
            return false;
        }
        if let Err(e) = self.store.put(task.clone()).await {
            debug!("could not persist task {}: {e}", task.id);
        }
        let _ = tx.send(task.clone());
        true
    }

    /// The lifecycle algorithm. Emits a snapshot after every mutation.
    async fn process(
        &self,
        envelope: SignedEnvelope,
        tx: mpsc::UnboundedSender<Task>,
    ) -> Result<(), LifecycleError> {
        let SignedEnvelope {
            sender_address,
            session_id,
            signature,
            payload,
        } = envelope;
        let task_id = TaskId::new(payload.task_id.clone());

        // A task parked at InputRequired resumes with the follow-up
        // envelope; any other existing task id is a duplicate send.
        let mut task = match self.store.get(&task_id).await {
            Some(t) if t.status == TaskStatus::InputRequired => t,
            Some(t) => return Err(LifecycleError::TaskAlreadyExists(t.id)),
            None => {
                let classification = self.routing.classify(&payload.tool);
                Task::new(task_id.clone(), session_id.clone(), classification)
            }
        };
        let resuming = task.status == TaskStatus::InputRequired;
        let classification = task.classification;

        // Step 1: verify the envelope signature.
        let signature_ok = !self.config.verify_signatures
            || match &signature {
                Some(sig) => self.codec.verify(&sender_address, &session_id, sig),
                None => false,
            };

        if !signature_ok {
            let reject = classification == Classification::Critical
                || self.config.strict_informational;
            if reject {
                warn!("signature verification failed for task {task_id}, rejecting");
                if !resuming {
                    self.store.insert(task.clone()).await?;
                    let _ = tx.send(task.clone());
                }
                task.fail(REASON_SIGNATURE_INVALID)?;
                self.persist_and_emit(&task, &tx).await;
                return Ok(());
            }
            warn!(
                "signature verification failed for informational task {task_id}, proceeding"
            );
        }

        // Step 2: the task becomes visible at Submitted.
        if !resuming {
            self.store.insert(task.clone()).await?;
            let _ = tx.send(task.clone());
        }

        // Per-task serialization: no two ledger calls for the same task id
        // are ever in flight concurrently.
        let lock = self.task_lock(&task.id);
        let _guard = lock.lock().await;

        if self.is_cancel_requested(&task.id) {
            return Ok(());
        }

        // Step 3: anchor critical tasks on the ledger (first pass only).
        if classification == Classification::Critical && task.ledger_record.is_none() {
            let description: String = payload.message.chars().take(100).collect();
            if !self.anchor(&mut task, &description, &tx).await {
                return Ok(());
            }
        }

        task.transition(TaskStatus::Working)?;
        if !self.persist_and_emit(&task, &tx).await {
            return Ok(());
        }

        // Step 4: hand off to the business executor.
        let request = ExecutionRequest {
            task_id: task.id.clone(),
            session_id: session_id.clone(),
            tool: payload.tool.clone(),
            message: payload.message.clone(),
            metadata: payload.metadata.clone(),
        };
        let (update_tx, mut update_rx) = mpsc::unbounded_channel();
        let executor = Arc::clone(&self.executor);
        let join = tokio::spawn(async move {
            executor.execute_streaming(&request, update_tx).await
        });

        while let Some(update) = update_rx.recv().await {
            if self.is_cancel_requested(&task.id) {
                join.abort();
                return Ok(());
            }
            match update {
                ExecutorUpdate::Progress { message } => {
                    let mut artifact = Artifact::text(message);
                    artifact.index = task.artifacts.len() as u32;
                    artifact.append = true;
                    task.push_artifact(artifact);
                }
                ExecutorUpdate::Artifact { artifact } => task.push_artifact(artifact),
            }
            if !self.persist_and_emit(&task, &tx).await {
                join.abort();
                return Ok(());
            }
        }

        let outcome = match join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => Err(ExecutorError::new(format!("business execution panicked: {e}"))),
        };

        if self.is_cancel_requested(&task.id) {
            return Ok(());
        }

        // Steps 5/6: settle and reach a terminal (or parked) state.
        match outcome {
            Ok(ExecutorOutcome::Completed { artifact }) => {
                task.push_artifact(artifact);
                if task.ledger_state() == LedgerState::Created {
                    if !self.settle(&mut task, &tx).await {
                        return Ok(());
                    }
                }
                task.transition(TaskStatus::Completed)?;
                self.persist_and_emit(&task, &tx).await;
            }
            Ok(ExecutorOutcome::InputRequired { prompt }) => {
                task.push_artifact(Artifact::text(prompt));
                task.transition(TaskStatus::InputRequired)?;
                self.persist_and_emit(&task, &tx).await;
            }
            Err(e) => {
                // The incomplete service must not be marked complete
                // on-ledger, so no complete_task call is made.
                task.fail(e.to_string())?;
                self.persist_and_emit(&task, &tx).await;
            }
        }

        Ok(())
    }

    /// Drive the ledger create step, degrading to recorded state on any
    /// failure. Returns `false` only when the task was canceled.
    async fn anchor(
        &self,
        task: &mut Task,
        description: &str,
        tx: &mpsc::UnboundedSender<Task>,
    ) -> bool {
        let counterpart = match self.config.counterpart_address.as_deref() {
            None => {
                warn!(
                    "no counterpart address configured, skipping ledger record for task {}",
                    task.id
                );
                task.ledger_record = Some(LedgerRecord::skipped(
                    "counterpart address not configured",
                ));
                return self.persist_and_emit(task, tx).await;
            }
            Some(raw) => match LedgerAddress::parse(raw) {
                Ok(address) => address,
                Err(e) => {
                    warn!(
                        "invalid counterpart address {raw:?} for task {} ({e}), skipping ledger record",
                        task.id
                    );
                    task.ledger_record = Some(LedgerRecord::skipped(format!(
                        "invalid counterpart address: {e}"
                    )));
                    return self.persist_and_emit(task, tx).await;
                }
            },
        };

        // Replay guard: one ledger create per session id.
        if !self.store.try_consume_session(&task.session_id).await {
            warn!(
                "session {} already consumed for a ledger create, skipping (replay guard)",
                task.session_id
            );
            task.ledger_record = Some(LedgerRecord::skipped(
                "session id already consumed for a ledger create",
            ));
            return self.persist_and_emit(task, tx).await;
        }

        task.ledger_record = Some(LedgerRecord::new(LedgerState::CreatePending));
        if !self.persist_and_emit(task, tx).await {
            return false;
        }

        match self
            .ledger
            .create_task(
                task.id.as_str(),
                &counterpart,
                self.config.bounty_octas,
                self.config.deadline_secs,
                description,
            )
            .await
        {
            Ok(receipt) => {
                info!("ledger task {} created: {}", task.id, receipt.tx_hash);
                task.ledger_record_mut().mark_created(Some(receipt.tx_hash));
            }
            Err(e) if e.kind == LedgerErrorKind::AlreadyExists => {
                warn!("ledger task {} already registered, treating as created", task.id);
                let record = task.ledger_record_mut();
                record.mark_created(None);
                record.detail = Some(e.to_string());
            }
            Err(e) => {
                warn!(
                    "ledger create for task {} failed ({e}), continuing without ledger record",
                    task.id
                );
                task.ledger_record_mut().mark_error(e.to_string());
            }
        }
        self.persist_and_emit(task, tx).await
    }

    /// Drive the ledger complete step after business success.
    ///
    /// A failure here never reverts the business outcome; it is recorded
    /// and the task still completes. Returns `false` only on cancellation.
    async fn settle(&self, task: &mut Task, tx: &mpsc::UnboundedSender<Task>) -> bool {
        task.ledger_record_mut().state = LedgerState::CompletePending;
        if !self.persist_and_emit(task, tx).await {
            return false;
        }

        match self.ledger.complete_task(task.id.as_str()).await {
            Ok(receipt) => {
                info!("ledger task {} completed: {}", task.id, receipt.tx_hash);
                task.ledger_record_mut().mark_completed(receipt.tx_hash);
            }
            Err(e) => {
                warn!(
                    "ledger completion for task {} failed ({e}), business outcome stands",
                    task.id
                );
                task.ledger_record_mut().mark_error(e.to_string());
            }
        }
        self.persist_and_emit(task, tx).await
    }
}
