//! taskanchor - HTTP Server Entry Point
//!
//! Starts a service agent exposing the task RPC endpoint.

use std::sync::Arc;
use std::time::Duration;

use taskanchor::lifecycle::EchoExecutor;
use taskanchor::{
    api, Config, HttpLedgerClient, InMemoryTaskStore, KeyMaterial, LifecycleConfig,
    RoutingPolicy, SignatureCodec, TaskLifecycleManager, TaskStore,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often terminal tasks are checked against the retention window.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskanchor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Signing identity
    let key = match &config.private_key {
        Some(raw) => KeyMaterial::from_private_key_hex(raw)?,
        None => {
            warn!("LEDGER_PRIVATE_KEY not set, generating an ephemeral keypair");
            KeyMaterial::generate()
        }
    };
    info!("signing address: {}", key.address());
    let key = Arc::new(key);

    // Ledger client
    let ledger = Arc::new(HttpLedgerClient::new(
        config.node_url.clone(),
        config.module_address.clone(),
        key.address().clone(),
    ));
    if config.counterpart_address.is_none() {
        warn!("COUNTERPART_ADDRESS not set, critical tasks will skip ledger anchoring");
    }

    // Lifecycle wiring
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let lifecycle = Arc::new(TaskLifecycleManager::new(
        store.clone(),
        ledger,
        SignatureCodec::new(key),
        RoutingPolicy::new(),
        Arc::new(EchoExecutor),
        LifecycleConfig {
            counterpart_address: config.counterpart_address.clone(),
            bounty_octas: config.bounty_octas,
            deadline_secs: config.deadline_secs,
            verify_signatures: config.verify_signatures,
            strict_informational: config.strict_informational,
        },
    ));

    // Retention sweep for terminal tasks
    let retention = config.retention;
    let sweep_store = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let swept = sweep_store.sweep_expired(retention).await;
            if swept > 0 {
                info!("evicted {swept} expired tasks");
            }
        }
    });

    let card = lifecycle.agent_card(
        &config.agent_name,
        &config.agent_description,
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "serving capability card for {} ({} critical tools)",
        card.name,
        card.critical_tools.len()
    );

    let state = Arc::new(api::AppState { lifecycle, card });
    api::serve(&config.host, config.port, state).await
}
