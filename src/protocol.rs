//! Wire types shared by coordinator and service agent.
//!
//! These mirror the task RPC protocol: a signed envelope carrying an opaque
//! payload inbound, task snapshots outbound, and the static capability card
//! served at `/.well-known/agent.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message from a coordinator to a service agent.
///
/// `signature` covers the canonical byte string `sender_address || session_id`.
/// The payload is opaque to the trust layer except for the tool id consulted
/// by routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    /// Coordinator's public identity (ledger address).
    pub sender_address: String,
    /// Session that spawned the task; also the replay-guard key.
    pub session_id: String,
    /// Hex Ed25519 signature; absent means verification fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Task request content.
    pub payload: TaskPayload,
}

/// The task request carried inside an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    /// Coordinator-assigned task id, unique within the session.
    pub task_id: String,
    /// Declared tool/intent identifier consulted by the routing policy.
    pub tool: String,
    /// Natural-language request text, opaque to the trust layer.
    pub message: String,
    /// Extra metadata passed through untouched (e.g. ledger anchor info).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// One fragment of task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

/// An ordered output fragment appended as the task progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub parts: Vec<Part>,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub append: bool,
}

impl Artifact {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text { text: text.into() }],
            index: 0,
            append: false,
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            parts: vec![Part::Data { data }],
            index: 0,
            append: false,
        }
    }
}

/// Static capability/discovery document.
///
/// Coordinators read this to learn the service's signing address and which
/// tool ids will be attributed on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    /// Address coordinators attribute ledger tasks to.
    pub signing_address: String,
    /// Tool ids classified as requiring ledger confirmation.
    pub critical_tools: Vec<String>,
    /// Whether `tasks/sendSubscribe` streaming is supported.
    pub streaming: bool,
}
