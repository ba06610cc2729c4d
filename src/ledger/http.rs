//! HTTP ledger client with automatic retry for transient errors.
//!
//! Talks to a ledger fullnode REST API: entry-function calls are submitted
//! as JSON transactions, then polled by hash until confirmed. Reads go
//! through the `/view` endpoint. All calls are bounded by the timeouts in
//! [`RetryConfig`]; only transient failures are retried, and a submission is
//! never retried once it has been accepted by the node.

use serde_json::{json, Value};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::{classify_http_status, LedgerError, LedgerErrorKind, RetryConfig};
use super::{parse_receipt, LedgerClient, TaskInfo, TaskStats, TxReceipt};
use crate::identity::LedgerAddress;
use async_trait::async_trait;

/// Marker the task-manager module aborts with on a duplicate create.
const ALREADY_EXISTS_MARKER: &str = "E_TASK_ALREADY_EXISTS";

/// Poll interval while waiting for transaction confirmation.
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ledger client backed by a fullnode REST endpoint.
pub struct HttpLedgerClient {
    client: reqwest::Client,
    node_url: String,
    module_address: LedgerAddress,
    sender: LedgerAddress,
    retry: RetryConfig,
}

impl HttpLedgerClient {
    /// Create a client with default retry configuration.
    pub fn new(node_url: impl Into<String>, module_address: LedgerAddress, sender: LedgerAddress) -> Self {
        Self::with_retry_config(node_url, module_address, sender, RetryConfig::default())
    }

    pub fn with_retry_config(
        node_url: impl Into<String>,
        module_address: LedgerAddress,
        sender: LedgerAddress,
        retry: RetryConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(retry.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            node_url: node_url.into().trim_end_matches('/').to_string(),
            module_address,
            sender,
            retry,
        }
    }

    fn function_id(&self, name: &str) -> String {
        format!("{}::task_manager::{}", self.module_address, name)
    }

    /// Task ids travel on-ledger as hex-encoded byte vectors.
    fn encode_task_id(task_id: &str) -> String {
        format!("0x{}", hex::encode(task_id.as_bytes()))
    }

    fn map_request_error(e: reqwest::Error) -> LedgerError {
        if e.is_timeout() {
            LedgerError::network_error(format!("request timeout: {e}"))
        } else if e.is_connect() {
            LedgerError::network_error(format!("connection failed: {e}"))
        } else {
            LedgerError::network_error(format!("request failed: {e}"))
        }
    }

    /// Retry a transient-failing operation with exponential backoff.
    ///
    /// Semantic errors pass through untouched; exhausting retries converts
    /// the last transient error into `Unavailable`.
    async fn with_retries<T, F, Fut>(&self, op: &str, call: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = e.suggested_delay(attempt);
                    warn!("ledger {op} attempt {attempt} failed ({e}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(LedgerError::unavailable(format!(
                        "{op} failed after {attempt} retries: {e}"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Submit an entry-function transaction, returning its hash.
    async fn submit_entry_function(
        &self,
        function: &str,
        arguments: Value,
    ) -> Result<String, LedgerError> {
        let body = json!({
            "sender": self.sender.as_str(),
            "payload": {
                "type": "entry_function_payload",
                "function": function,
                "type_arguments": [],
                "arguments": arguments,
            }
        });

        let response = self
            .client
            .post(format!("{}/v1/transactions", self.node_url))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_request_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(Self::map_request_error)?;

        if !(200..300).contains(&status) {
            let kind = classify_http_status(status);
            return Err(match kind {
                LedgerErrorKind::Rejected => LedgerError::rejected(Some(status), text),
                _ => LedgerError::server_error(status, text),
            });
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LedgerError::parse_failure(format!("invalid submit response: {e}")))?;
        parsed
            .get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LedgerError::parse_failure("submit response missing string field 'hash'".into())
            })
    }

    /// Poll a transaction by hash until it leaves the pending state.
    ///
    /// A confirmation timeout yields `Unavailable` rather than a transient
    /// error: the submission may still land, so it must not be resubmitted.
    async fn wait_for_transaction(&self, tx_hash: &str) -> Result<TxReceipt, LedgerError> {
        let deadline = Instant::now() + self.retry.confirmation_timeout;

        loop {
            let response = self
                .client
                .get(format!("{}/v1/transactions/by_hash/{tx_hash}", self.node_url))
                .send()
                .await
                .map_err(Self::map_request_error)?;

            let status = response.status().as_u16();
            if status == 404 {
                // Not yet visible on the node.
            } else if (200..300).contains(&status) {
                let raw: Value = response.json().await.map_err(Self::map_request_error)?;
                if !is_pending(&raw) {
                    return parse_receipt(&raw);
                }
            } else {
                let text = response.text().await.unwrap_or_default();
                return Err(LedgerError::server_error(status, text));
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::unavailable(format!(
                    "transaction {tx_hash} not confirmed within {:?}",
                    self.retry.confirmation_timeout
                )));
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }

    /// Submit an entry call and wait for its receipt.
    async fn execute_entry(
        &self,
        op: &str,
        function: &str,
        arguments: Value,
    ) -> Result<TxReceipt, LedgerError> {
        let tx_hash = self
            .with_retries(op, || self.submit_entry_function(function, arguments.clone()))
            .await?;
        debug!("ledger {op} submitted: {tx_hash}");

        let receipt = self.wait_for_transaction(&tx_hash).await?;
        if !receipt.confirmed {
            if receipt.vm_status.contains(ALREADY_EXISTS_MARKER) {
                return Err(LedgerError {
                    kind: LedgerErrorKind::AlreadyExists,
                    status_code: None,
                    message: receipt.vm_status,
                });
            }
            return Err(LedgerError::rejected(
                None,
                format!("transaction {} aborted: {}", receipt.tx_hash, receipt.vm_status),
            ));
        }
        Ok(receipt)
    }

    /// Call a read-only view function.
    async fn call_view(&self, function: &str, arguments: Value) -> Result<Vec<Value>, LedgerError> {
        let body = json!({
            "function": function,
            "type_arguments": [],
            "arguments": arguments,
        });

        let fetch = || async {
            let response = self
                .client
                .post(format!("{}/v1/view", self.node_url))
                .json(&body)
                .send()
                .await
                .map_err(Self::map_request_error)?;

            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                let text = response.text().await.unwrap_or_default();
                return Err(match classify_http_status(status) {
                    LedgerErrorKind::Rejected => LedgerError::rejected(Some(status), text),
                    _ => LedgerError::server_error(status, text),
                });
            }

            response
                .json::<Vec<Value>>()
                .await
                .map_err(|e| LedgerError::parse_failure(format!("invalid view response: {e}")))
        };

        self.with_retries("view", fetch).await
    }
}

/// A transaction still waiting for execution has no `success` field yet.
fn is_pending(raw: &Value) -> bool {
    raw.get("type").and_then(Value::as_str) == Some("pending_transaction")
        || raw.get("success").is_none()
}

fn view_u64(values: &[Value], index: usize, field: &str) -> Result<u64, LedgerError> {
    let value = values
        .get(index)
        .ok_or_else(|| LedgerError::parse_failure(format!("view result missing '{field}'")))?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| LedgerError::parse_failure(format!("'{field}' is not a u64"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| LedgerError::parse_failure(format!("'{field}' is not a u64"))),
        _ => Err(LedgerError::parse_failure(format!(
            "'{field}' has unexpected type"
        ))),
    }
}

fn view_bool(values: &[Value], index: usize, field: &str) -> Result<bool, LedgerError> {
    values
        .get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| LedgerError::parse_failure(format!("view result missing bool '{field}'")))
}

fn view_string(values: &[Value], index: usize, field: &str) -> Result<String, LedgerError> {
    values
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::parse_failure(format!("view result missing string '{field}'")))
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn connected(&self) -> bool {
        match self.client.get(format!("{}/v1", self.node_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("ledger connection probe failed: {e}");
                false
            }
        }
    }

    async fn create_task(
        &self,
        task_id: &str,
        service_agent: &LedgerAddress,
        bounty_octas: u64,
        deadline_secs: u64,
        description: &str,
    ) -> Result<TxReceipt, LedgerError> {
        self.execute_entry(
            "create_task",
            &self.function_id("create_task"),
            json!([
                Self::encode_task_id(task_id),
                service_agent.as_str(),
                bounty_octas.to_string(),
                deadline_secs.to_string(),
                description,
            ]),
        )
        .await
    }

    async fn complete_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError> {
        self.execute_entry(
            "complete_task",
            &self.function_id("complete_task"),
            json!([self.sender.as_str(), Self::encode_task_id(task_id)]),
        )
        .await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<TxReceipt, LedgerError> {
        self.execute_entry(
            "cancel_task",
            &self.function_id("cancel_task"),
            json!([Self::encode_task_id(task_id)]),
        )
        .await
    }

    async fn task_info(
        &self,
        task_agent: &LedgerAddress,
        task_id: &str,
    ) -> Result<TaskInfo, LedgerError> {
        let values = self
            .call_view(
                &self.function_id("get_task_info"),
                json!([task_agent.as_str(), Self::encode_task_id(task_id)]),
            )
            .await?;

        Ok(TaskInfo {
            task_agent: view_string(&values, 0, "task_agent")?,
            service_agent: view_string(&values, 1, "service_agent")?,
            pay_amount: view_u64(&values, 2, "pay_amount")?,
            created_at: view_u64(&values, 3, "created_at")?,
            deadline: view_u64(&values, 4, "deadline")?,
            is_completed: view_bool(&values, 5, "is_completed")?,
            is_cancelled: view_bool(&values, 6, "is_cancelled")?,
            description: view_string(&values, 7, "description")?,
        })
    }

    async fn task_stats(&self, task_agent: &LedgerAddress) -> Result<TaskStats, LedgerError> {
        let values = self
            .call_view(
                &self.function_id("get_task_stats"),
                json!([task_agent.as_str()]),
            )
            .await?;

        Ok(TaskStats {
            total_tasks: view_u64(&values, 0, "total_tasks")?,
            completed_tasks: view_u64(&values, 1, "completed_tasks")?,
            cancelled_tasks: view_u64(&values, 2, "cancelled_tasks")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_encoding() {
        assert_eq!(HttpLedgerClient::encode_task_id("abc"), "0x616263");
    }

    #[test]
    fn test_pending_detection() {
        assert!(is_pending(&json!({ "type": "pending_transaction", "hash": "0x1" })));
        assert!(is_pending(&json!({ "hash": "0x1" })));
        assert!(!is_pending(&json!({ "hash": "0x1", "success": true })));
    }

    #[test]
    fn test_view_field_parsing() {
        let values = vec![json!("0xabc"), json!("123"), json!(456), json!(true)];
        assert_eq!(view_string(&values, 0, "a").unwrap(), "0xabc");
        assert_eq!(view_u64(&values, 1, "b").unwrap(), 123);
        assert_eq!(view_u64(&values, 2, "c").unwrap(), 456);
        assert!(view_bool(&values, 3, "d").unwrap());

        assert_eq!(
            view_u64(&values, 9, "missing").unwrap_err().kind,
            LedgerErrorKind::ParseFailure
        );
        assert_eq!(
            view_bool(&values, 0, "a").unwrap_err().kind,
            LedgerErrorKind::ParseFailure
        );
    }
}
