//! Ledger client boundary.
//!
//! The ledger is consumed through a handful of primitives: a liveness probe,
//! `create_task`/`complete_task`/`cancel_task` entry calls, and two read-only
//! views. Everything returns `LedgerError` rather than propagating transport
//! faults; callers convert errors into task state, never into task failure.

mod error;
mod http;

pub use error::{classify_http_status, LedgerError, LedgerErrorKind, RetryConfig};
pub use http::HttpLedgerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::LedgerAddress;

/// Parsed transaction receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    pub confirmed: bool,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub vm_status: String,
}

/// On-ledger task record, as returned by the `task_info` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_agent: String,
    pub service_agent: String,
    pub pay_amount: u64,
    pub created_at: u64,
    pub deadline: u64,
    pub is_completed: bool,
    pub is_cancelled: bool,
    pub description: String,
}

/// Aggregate counters from the `task_stats` view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub cancelled_tasks: u64,
}

/// Convert a raw ledger response into a receipt.
///
/// `hash` and `success` are required; absence or a type mismatch yields
/// `ParseFailure`, never a panic. `gas_used` arrives as a decimal string on
/// some nodes and a number on others, so both are accepted.
pub fn parse_receipt(raw: &Value) -> Result<TxReceipt, LedgerError> {
    let tx_hash = raw
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::parse_failure("receipt missing string field 'hash'".into()))?
        .to_string();

    let confirmed = raw
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| LedgerError::parse_failure("receipt missing bool field 'success'".into()))?;

    let gas_used = match raw.get("gas_used") {
        None => 0,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(other) => {
            return Err(LedgerError::parse_failure(format!(
                "receipt field 'gas_used' has unexpected type: {other}"
            )))
        }
    };

    let vm_status = raw
        .get("vm_status")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();

    Ok(TxReceipt {
        tx_hash,
        confirmed,
        gas_used,
        vm_status,
    })
}

/// Client for the external task-manager ledger module.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Liveness probe. Never errors; network failure reads as `false`.
    async fn connected(&self) -> bool;

    /// Register a task and escrow its bounty before business execution.
    ///
    /// Idempotent per `task_id`: a second call yields `AlreadyExists`, which
    /// callers treat as success.
    async fn create_task(
        &self,
        task_id: &str,
        service_agent: &LedgerAddress,
        bounty_octas: u64,
        deadline_secs: u64,
        description: &str,
    ) -> Result<TxReceipt, LedgerError>;

    /// Mark a task complete, releasing the escrowed bounty.
    ///
    /// Must only be called after `create_task` succeeded (or reported
    /// already-created) for the same id.
    async fn complete_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError>;

    /// Cancel a registered task, refunding the bounty.
    async fn cancel_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError>;

    /// Read a task's on-ledger record.
    async fn task_info(
        &self,
        task_agent: &LedgerAddress,
        task_id: &str,
    ) -> Result<TaskInfo, LedgerError>;

    /// Read aggregate task counters for an account.
    async fn task_stats(&self, task_agent: &LedgerAddress) -> Result<TaskStats, LedgerError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted ledger for lifecycle and coordinator tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A ledger whose responses are scripted per operation.
    ///
    /// Records every call so tests can assert on exact ledger traffic.
    pub struct ScriptedLedger {
        pub connected: bool,
        create_results: Mutex<VecDeque<Result<TxReceipt, LedgerError>>>,
        complete_results: Mutex<VecDeque<Result<TxReceipt, LedgerError>>>,
        cancel_results: Mutex<VecDeque<Result<TxReceipt, LedgerError>>>,
        pub create_calls: Mutex<Vec<String>>,
        pub complete_calls: Mutex<Vec<String>>,
        pub cancel_calls: Mutex<Vec<String>>,
    }

    pub fn receipt(hash: &str) -> TxReceipt {
        TxReceipt {
            tx_hash: hash.to_string(),
            confirmed: true,
            gas_used: 7,
            vm_status: "Executed successfully".to_string(),
        }
    }

    impl ScriptedLedger {
        pub fn new() -> Self {
            Self {
                connected: true,
                create_results: Mutex::new(VecDeque::new()),
                complete_results: Mutex::new(VecDeque::new()),
                cancel_results: Mutex::new(VecDeque::new()),
                create_calls: Mutex::new(Vec::new()),
                complete_calls: Mutex::new(Vec::new()),
                cancel_calls: Mutex::new(Vec::new()),
            }
        }

        pub fn script_create(self, result: Result<TxReceipt, LedgerError>) -> Self {
            self.create_results.lock().unwrap().push_back(result);
            self
        }

        pub fn script_complete(self, result: Result<TxReceipt, LedgerError>) -> Self {
            self.complete_results.lock().unwrap().push_back(result);
            self
        }

        pub fn script_cancel(self, result: Result<TxReceipt, LedgerError>) -> Self {
            self.cancel_results.lock().unwrap().push_back(result);
            self
        }

        fn next(
            queue: &Mutex<VecDeque<Result<TxReceipt, LedgerError>>>,
            op: &str,
        ) -> Result<TxReceipt, LedgerError> {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LedgerError::unavailable(format!("unscripted {op} call"))))
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn connected(&self) -> bool {
            self.connected
        }

        async fn create_task(
            &self,
            task_id: &str,
            _service_agent: &LedgerAddress,
            _bounty_octas: u64,
            _deadline_secs: u64,
            _description: &str,
        ) -> Result<TxReceipt, LedgerError> {
            self.create_calls.lock().unwrap().push(task_id.to_string());
            Self::next(&self.create_results, "create_task")
        }

        async fn complete_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError> {
            self.complete_calls.lock().unwrap().push(task_id.to_string());
            Self::next(&self.complete_results, "complete_task")
        }

        async fn cancel_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError> {
            self.cancel_calls.lock().unwrap().push(task_id.to_string());
            Self::next(&self.cancel_results, "cancel_task")
        }

        async fn task_info(
            &self,
            _task_agent: &LedgerAddress,
            task_id: &str,
        ) -> Result<TaskInfo, LedgerError> {
            Err(LedgerError::parse_failure(format!(
                "task_info not scripted for {task_id}"
            )))
        }

        async fn task_stats(&self, _task_agent: &LedgerAddress) -> Result<TaskStats, LedgerError> {
            Ok(TaskStats {
                total_tasks: 0,
                completed_tasks: 0,
                cancelled_tasks: 0,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_receipt_happy_path() {
        let raw = json!({
            "hash": "0xdeadbeef",
            "success": true,
            "gas_used": "42",
            "vm_status": "Executed successfully"
        });
        let receipt = parse_receipt(&raw).unwrap();
        assert_eq!(receipt.tx_hash, "0xdeadbeef");
        assert!(receipt.confirmed);
        assert_eq!(receipt.gas_used, 42);
    }

    #[test]
    fn test_parse_receipt_numeric_gas() {
        let raw = json!({ "hash": "0x1", "success": false, "gas_used": 7 });
        let receipt = parse_receipt(&raw).unwrap();
        assert!(!receipt.confirmed);
        assert_eq!(receipt.gas_used, 7);
        assert_eq!(receipt.vm_status, "Unknown");
    }

    #[test]
    fn test_parse_receipt_missing_hash() {
        let raw = json!({ "success": true });
        let err = parse_receipt(&raw).unwrap_err();
        assert_eq!(err.kind, LedgerErrorKind::ParseFailure);
    }

    #[test]
    fn test_parse_receipt_wrong_types() {
        let raw = json!({ "hash": 17, "success": true });
        assert_eq!(
            parse_receipt(&raw).unwrap_err().kind,
            LedgerErrorKind::ParseFailure
        );

        let raw = json!({ "hash": "0x1", "success": "yes" });
        assert_eq!(
            parse_receipt(&raw).unwrap_err().kind,
            LedgerErrorKind::ParseFailure
        );

        let raw = json!({ "hash": "0x1", "success": true, "gas_used": {} });
        assert_eq!(
            parse_receipt(&raw).unwrap_err().kind,
            LedgerErrorKind::ParseFailure
        );
    }
}
