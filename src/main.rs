//! IP allow-list gateway.
//!
//! Sits between an edge platform and a single upstream origin. Every request
//! is admitted only if its client address matches an enabled rule.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      GATEWAY                          │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐    ┌───────────┐    ┌──────────────┐    │
//!   ───────────────────┼─▶│  http   │───▶│  address  │───▶│   policy     │    │
//!   (cf-connecting-ip, │  │ server  │    │ normalize │    │ cache+match  │    │
//!    x-forwarded-for)  │  └─────────┘    └───────────┘    └──────┬───────┘    │
//!                      │                                    allow │ deny       │
//!                      │                                         ▼            │
//!   Client Response    │  ┌──────────────┐              ┌──────────────┐     │
//!   ◀──────────────────┼──│ JSON denial  │◀── deny ─────│   gateway    │     │
//!   ◀──────────────────┼──│  verbatim    │◀── allow ────│  forwarder   │◀────┼──── Upstream
//!                      │  └──────────────┘              └──────────────┘     │     Origin
//!                      │                                                       │
//!                      │  policy store (SQLite / static) ─▶ cache, TTL ≤ 300s  │
//!                      │  admin API, metrics, lifecycle                        │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use ip_allowlist_gateway::admin::{run_admin_server, AdminState};
use ip_allowlist_gateway::config::load_config;
use ip_allowlist_gateway::lifecycle::startup::{bind, warm_policy_cache};
use ip_allowlist_gateway::observability::{logging, metrics};
use ip_allowlist_gateway::policy::build_store;
use ip_allowlist_gateway::{Gateway, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "ip-allowlist-gateway")]
#[command(about = "Admits requests whose client address is on the allow list", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ip-allowlist-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        trusted_header = %config.client_address.trusted_header,
        forwarded_header = %config.client_address.forwarded_header,
        cache_ttl_secs = config.policy.cache_ttl().as_secs(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = build_store(&config.policy.store)?;
    let gateway = Arc::new(Gateway::from_config(&config, store)?);
    warm_policy_cache(gateway.cache()).await;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let admin_task = if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let state = AdminState::new(Arc::clone(&gateway), &config.admin.api_key);
        let rx = shutdown.subscribe();
        Some(tokio::spawn(run_admin_server(listener, state, rx)))
    } else {
        None
    };

    let listener = bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(Arc::clone(&gateway));
    let result = server.run(listener, shutdown.subscribe()).await;

    // The gateway stopping for any reason stops the admin API too.
    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
            Ok(Ok(())) => {}
        }
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
