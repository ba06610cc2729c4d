//! # taskanchor
//!
//! Trust and lifecycle layer for ledger-anchored agent tasks.
//!
//! Coordinators dispatch signed task requests to service agents; tasks
//! classified as critical are additionally anchored on a distributed ledger
//! so their completion is tamper-evident. The ledger is strictly optional at
//! runtime: outages and misconfiguration degrade into recorded state, never
//! into task failure.
//!
//! ## Task Flow
//!
//! ```text
//! SignedEnvelope ──▶ verify signature ──▶ classify (routing)
//!                                             │
//!                              CRITICAL ──────┤────── INFORMATIONAL
//!                                  │          │            │
//!                        ledger create_task   │            │
//!                                  │          ▼            │
//!                                  └────▶ business ◀───────┘
//!                                        execution
//!                                             │
//!                              CRITICAL: ledger complete_task
//!                                             │
//!                                             ▼
//!                                      Task (terminal)
//! ```
//!
//! ## Modules
//! - `identity`: Ed25519 key material, addresses, envelope signatures
//! - `protocol`: wire types (envelopes, artifacts, capability card)
//! - `routing`: informational/critical classification table
//! - `task`: task record, state machine, and store
//! - `ledger`: ledger client boundary and HTTP implementation
//! - `lifecycle`: the orchestrator tying it all together
//! - `api`: JSON-RPC + SSE transport for service agents
//! - `coordinator`: client side for dispatching signed tasks

pub mod api;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod protocol;
pub mod routing;
pub mod task;

pub use config::Config;
pub use coordinator::Coordinator;
pub use identity::{KeyMaterial, LedgerAddress, SignatureCodec};
pub use ledger::{HttpLedgerClient, LedgerClient};
pub use lifecycle::{LifecycleConfig, TaskExecutor, TaskLifecycleManager};
pub use protocol::{AgentCard, SignedEnvelope};
pub use routing::RoutingPolicy;
pub use task::{Classification, InMemoryTaskStore, Task, TaskStatus, TaskStore};
