//! Ledger error types with retry classification.
//!
//! Distinguishes transient errors (retry with backoff) from semantic errors
//! (never retry). Nothing here is fatal to a task's business outcome; the
//! lifecycle layer converts every ledger error into recorded state.

use std::time::Duration;

/// Error from ledger operations.
#[derive(Debug, Clone)]
pub struct LedgerError {
    /// The kind of error
    pub kind: LedgerErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
}

impl LedgerError {
    /// Create a network error (connection failed, timeout).
    pub fn network_error(message: String) -> Self {
        Self {
            kind: LedgerErrorKind::NetworkError,
            status_code: None,
            message,
        }
    }

    /// Create a server error.
    pub fn server_error(status_code: u16, message: String) -> Self {
        Self {
            kind: LedgerErrorKind::ServerError,
            status_code: Some(status_code),
            message,
        }
    }

    /// Create a semantic rejection (invalid address, insufficient funds).
    pub fn rejected(status_code: Option<u16>, message: String) -> Self {
        Self {
            kind: LedgerErrorKind::Rejected,
            status_code,
            message,
        }
    }

    /// Create a receipt/response parse failure.
    pub fn parse_failure(message: String) -> Self {
        Self {
            kind: LedgerErrorKind::ParseFailure,
            status_code: None,
            message,
        }
    }

    /// Create an already-exists error (idempotent create collision).
    pub fn already_exists(task_id: &str) -> Self {
        Self {
            kind: LedgerErrorKind::AlreadyExists,
            status_code: None,
            message: format!("task {task_id} already registered on ledger"),
        }
    }

    /// Create the terminal error after retries are exhausted.
    pub fn unavailable(message: String) -> Self {
        Self {
            kind: LedgerErrorKind::Unavailable,
            status_code: None,
            message,
        }
    }

    /// Check if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Delay before the next retry attempt.
    ///
    /// Exponential backoff: base * 2^attempt, capped at 30 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        let base_secs: u64 = match self.kind {
            LedgerErrorKind::ServerError => 2,
            LedgerErrorKind::NetworkError => 1,
            _ => 1,
        };
        let multiplier = 2u64.saturating_pow(attempt);
        Duration::from_secs(base_secs.saturating_mul(multiplier).min(30))
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Classification of ledger errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    /// Connection failed or timed out - transient, should retry
    NetworkError,
    /// Ledger node error (500, 502, 503, 504) - transient, should retry
    ServerError,
    /// Semantic rejection (invalid address, insufficient funds) - never retry
    Rejected,
    /// Receipt or response did not have the expected shape - never retry
    ParseFailure,
    /// Task already registered under this id - caller treats as success
    AlreadyExists,
    /// Retries exhausted; the ledger is unreachable
    Unavailable,
}

impl LedgerErrorKind {
    /// Check if this error kind is transient (retry with backoff).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerErrorKind::NetworkError | LedgerErrorKind::ServerError
        )
    }
}

impl std::fmt::Display for LedgerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerErrorKind::NetworkError => write!(f, "Network error"),
            LedgerErrorKind::ServerError => write!(f, "Ledger server error"),
            LedgerErrorKind::Rejected => write!(f, "Transaction rejected"),
            LedgerErrorKind::ParseFailure => write!(f, "Receipt parse failure"),
            LedgerErrorKind::AlreadyExists => write!(f, "Task already exists"),
            LedgerErrorKind::Unavailable => write!(f, "Ledger unavailable"),
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> LedgerErrorKind {
    match status {
        500 | 502 | 503 | 504 => LedgerErrorKind::ServerError,
        400..=499 => LedgerErrorKind::Rejected,
        _ => LedgerErrorKind::ServerError,
    }
}

/// Configuration for ledger call bounds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts for transient errors
    pub max_retries: u32,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// How long to poll for transaction confirmation
    pub confirmation_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LedgerErrorKind::NetworkError.is_transient());
        assert!(LedgerErrorKind::ServerError.is_transient());
        assert!(!LedgerErrorKind::Rejected.is_transient());
        assert!(!LedgerErrorKind::ParseFailure.is_transient());
        assert!(!LedgerErrorKind::AlreadyExists.is_transient());
        assert!(!LedgerErrorKind::Unavailable.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(500), LedgerErrorKind::ServerError);
        assert_eq!(classify_http_status(503), LedgerErrorKind::ServerError);
        assert_eq!(classify_http_status(400), LedgerErrorKind::Rejected);
        assert_eq!(classify_http_status(404), LedgerErrorKind::Rejected);
    }

    #[test]
    fn test_exponential_backoff() {
        let error = LedgerError::network_error("test".to_string());
        let delay_0 = error.suggested_delay(0);
        let delay_1 = error.suggested_delay(1);
        let delay_2 = error.suggested_delay(2);

        assert!(delay_1 > delay_0);
        assert!(delay_2 > delay_1);

        // Capped at 30 seconds.
        assert!(error.suggested_delay(10).as_secs() <= 30);
    }
}
