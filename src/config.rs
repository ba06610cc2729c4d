//! Configuration management for taskanchor.
//!
//! Configuration can be set via environment variables:
//! - `LEDGER_NODE_URL` - Optional. Ledger fullnode REST endpoint. Defaults to `http://127.0.0.1:8080`.
//! - `LEDGER_PRIVATE_KEY` - Optional. Hex Ed25519 private key (`0x`/`ed25519-priv-0x` prefixes accepted).
//!   Without it an ephemeral keypair is generated at startup.
//! - `LEDGER_MODULE_ADDRESS` - Optional. Address of the on-ledger task-manager module.
//! - `COUNTERPART_ADDRESS` - Optional. Address critical tasks are attributed to.
//!   Absence is valid configuration: ledger interaction is skipped, never a startup failure.
//! - `TASK_BOUNTY_OCTAS` - Optional. Bounty escrowed per critical task. Defaults to `1000000`.
//! - `TASK_DEADLINE_SECS` - Optional. On-ledger task deadline. Defaults to `7200`.
//! - `VERIFY_SIGNATURES` - Optional. `true` (default), `false`, or `strict`
//!   (also reject informational requests with bad signatures).
//! - `TASK_RETENTION_HOURS` - Optional. How long terminal tasks are kept. Defaults to `24`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `AGENT_NAME` / `AGENT_DESCRIPTION` - Optional. Capability card identity.

use std::time::Duration;
use thiserror::Error;

use crate::identity::LedgerAddress;

/// Module address the reference task-manager contract is deployed under.
const DEFAULT_MODULE_ADDRESS: &str =
    "0x42e86d92f3d8645d290844f96451038efc722940fff706823dd3c0f8f67b46bd";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger fullnode REST endpoint
    pub node_url: String,

    /// Hex-encoded Ed25519 private key, if configured
    pub private_key: Option<String>,

    /// Address of the on-ledger task-manager module
    pub module_address: LedgerAddress,

    /// Address critical tasks are attributed to; `None` triggers the
    /// skipped-ledger path at task time
    pub counterpart_address: Option<String>,

    /// Bounty escrowed per critical task, in octas
    pub bounty_octas: u64,

    /// On-ledger task deadline
    pub deadline_secs: u64,

    /// Verify envelope signatures
    pub verify_signatures: bool,

    /// Reject informational requests on signature failure
    pub strict_informational: bool,

    /// Retention window for terminal tasks
    pub retention: Duration,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Capability card identity
    pub agent_name: String,
    pub agent_description: String,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{e}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparseable numeric values or
    /// a malformed module address. A missing counterpart address is not an
    /// error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_url = std::env::var("LEDGER_NODE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let private_key = std::env::var("LEDGER_PRIVATE_KEY").ok();

        let module_raw = std::env::var("LEDGER_MODULE_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_MODULE_ADDRESS.to_string());
        let module_address = LedgerAddress::parse(&module_raw).map_err(|e| {
            ConfigError::InvalidValue("LEDGER_MODULE_ADDRESS".to_string(), e.to_string())
        })?;

        // Deliberately unvalidated here: a malformed counterpart address
        // degrades to the skipped-ledger path per task, not a startup error.
        let counterpart_address = std::env::var("COUNTERPART_ADDRESS").ok();

        let bounty_octas = env_parse("TASK_BOUNTY_OCTAS", 1_000_000u64)?;
        let deadline_secs = env_parse("TASK_DEADLINE_SECS", 7_200u64)?;

        let verify_raw = std::env::var("VERIFY_SIGNATURES").unwrap_or_else(|_| "true".to_string());
        let (verify_signatures, strict_informational) = match verify_raw.as_str() {
            "false" | "0" | "off" => (false, false),
            "strict" => (true, true),
            _ => (true, false),
        };

        let retention_hours = env_parse("TASK_RETENTION_HOURS", 24u64)?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 3000u16)?;

        let agent_name =
            std::env::var("AGENT_NAME").unwrap_or_else(|_| "taskanchor-agent".to_string());
        let agent_description = std::env::var("AGENT_DESCRIPTION").unwrap_or_else(|_| {
            "Service agent with ledger-anchored confirmation for critical tasks".to_string()
        });

        Ok(Self {
            node_url,
            private_key,
            module_address,
            counterpart_address,
            bounty_octas,
            deadline_secs,
            verify_signatures,
            strict_informational,
            retention: Duration::from_secs(retention_hours * 3600),
            host,
            port,
            agent_name,
            agent_description,
        })
    }
}
