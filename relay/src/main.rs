//! Couchpad Relay Server
//!
//! Pairs phone controllers with displays and desktop agents by short room
//! codes, then forwards their messages by role.
//!
//! - Rooms are created over HTTP or lazily on first join
//! - Empty rooms are reaped after a grace period
//! - Room state (profile, tab, app) survives reconnects
//! - Memory-only storage

mod config;
mod events;
mod hub;
mod rate_limit;
mod registry;
mod router;
mod server;

use clap::Parser;
use config::RelayConfig;
use hub::RelayHub;
use server::AppState;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::interval;
use tracing::{error, info};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("couchpad_relay=info".parse().unwrap()),
        )
        .init();

    let config = RelayConfig::parse();
    let addr = format!("{}:{}", config.bind, config.port);

    let hub = RelayHub::spawn(config.hub_settings());
    let state = AppState::new(hub, config.clone());

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            limiter.prune();
        }
    });

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("═══════════════════════════════════════════════════════════");
    info!("  Couchpad Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listening on {}", addr);
    info!("  Public URL: {}", config.public_url);
    info!("═══════════════════════════════════════════════════════════");
    info!(
        "  Room reap: {}s after empty / {} min unclaimed",
        config.reap_grace_secs,
        config.unjoined_ttl_secs / 60
    );
    info!("  Rate limit: {} sessions/IP/minute", config.rate_limit);
    info!("═══════════════════════════════════════════════════════════");
    info!("  Endpoints:");
    info!("    POST /api/session  - Create a pairing room");
    info!("    GET  /api/profiles - Input profile catalog");
    info!("    GET  /ws/CODE      - Join a room");
    info!("    GET  /health       - Health check");
    info!("    GET  /stats        - Relay statistics");
    info!("═══════════════════════════════════════════════════════════");

    let app = server::router(state);
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
