//! Coordinator-side client.
//!
//! The counterpart to the service agent's HTTP endpoint: discovers agents
//! through their capability cards, signs envelopes with the local key, and
//! drives `tasks/send`/`tasks/get`/`tasks/cancel` over JSON-RPC. The ledger
//! create/complete cycle is owned by whichever deployment hosts the
//! lifecycle manager, so this client carries signatures and attribution
//! metadata only.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::api::{JsonRpcRequest, JsonRpcResponse};
use crate::identity::SignatureCodec;
use crate::protocol::{AgentCard, SignedEnvelope, TaskPayload};
use crate::task::{Task, TaskId};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("agent request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("agent returned RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("agent response was not a task: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("agent response carried neither result nor error")]
    EmptyResponse,
}

/// Client for dispatching signed tasks to service agents.
pub struct Coordinator {
    http: reqwest::Client,
    codec: SignatureCodec,
}

impl Coordinator {
    pub fn new(codec: SignatureCodec) -> Self {
        Self {
            http: reqwest::Client::new(),
            codec,
        }
    }

    /// Fetch a service agent's capability card.
    pub async fn discover(&self, agent_url: &str) -> Result<AgentCard, CoordinatorError> {
        let url = format!(
            "{}/.well-known/agent.json",
            agent_url.trim_end_matches('/')
        );
        let card = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(card)
    }

    /// Build a signed envelope for a task request.
    pub fn build_envelope(
        &self,
        task_id: &TaskId,
        session_id: &str,
        tool: &str,
        message: &str,
        metadata: Value,
    ) -> SignedEnvelope {
        SignedEnvelope {
            sender_address: self.codec.local_address().to_string(),
            session_id: session_id.to_string(),
            signature: Some(self.codec.sign(session_id)),
            payload: TaskPayload {
                task_id: task_id.to_string(),
                tool: tool.to_string(),
                message: message.to_string(),
                metadata,
            },
        }
    }

    /// Send a task and wait for its final snapshot.
    pub async fn send_task(
        &self,
        agent_url: &str,
        session_id: &str,
        tool: &str,
        message: &str,
    ) -> Result<Task, CoordinatorError> {
        let task_id = TaskId::random();
        let metadata = json!({ "conversationId": session_id });
        let envelope = self.build_envelope(&task_id, session_id, tool, message, metadata);

        debug!("dispatching task {task_id} ({tool}) to {agent_url}");
        self.call(
            agent_url,
            "tasks/send",
            serde_json::to_value(envelope)?,
        )
        .await
    }

    /// Fetch the current snapshot of a previously sent task.
    pub async fn get_task(
        &self,
        agent_url: &str,
        task_id: &TaskId,
    ) -> Result<Task, CoordinatorError> {
        self.call(agent_url, "tasks/get", json!({ "id": task_id.as_str() }))
            .await
    }

    /// Request cancellation of an in-flight task.
    pub async fn cancel_task(
        &self,
        agent_url: &str,
        task_id: &TaskId,
        reason: &str,
    ) -> Result<Task, CoordinatorError> {
        self.call(
            agent_url,
            "tasks/cancel",
            json!({ "id": task_id.as_str(), "reason": reason }),
        )
        .await
    }

    async fn call(
        &self,
        agent_url: &str,
        method: &str,
        params: Value,
    ) -> Result<Task, CoordinatorError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(TaskId::random().to_string())),
            method: method.to_string(),
            params,
        };

        let response: JsonRpcResponse = self
            .http
            .post(agent_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_task(response)
    }
}

/// Unwrap a JSON-RPC response into a task snapshot.
fn decode_task(response: JsonRpcResponse) -> Result<Task, CoordinatorError> {
    if let Some(error) = response.error {
        return Err(CoordinatorError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    let result = response.result.ok_or(CoordinatorError::EmptyResponse)?;
    Ok(serde_json::from_value(result)?)
}
