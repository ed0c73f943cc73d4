// ── Entry Point ──────────────────────────────────────────────────────────
// Grounded on `src-tauri/src/lib.rs`'s `run()` (module wiring, log-plugin
// init), translated from Tauri's plugin/builder system to a plain
// `env_logger::init()` + `axum::serve` loop — this gateway has no desktop
// shell, just an HTTP process.

mod agent_tracker;
mod config;
mod context;
mod error;
mod http_client;
mod memory_blocks;
mod server;
mod sources;
mod state;
mod tool_inventory;
mod tool_selector;
mod types;
mod webhook;

use config::GatewayConfig;
use state::GatewayState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = GatewayConfig::from_env();
    let client = http_client::shared_client();
    let bind_address = config.bind_address.clone();
    let port = config.port;

    log::info!("[main] starting webhook-server on {bind_address}:{port}");
    log::info!("[main] letta_base_url={}", config.letta_base_url);
    log::info!("[main] graphiti_url={}", config.graphiti_url);
    log::info!("[main] agent_registry_url={}", config.agent_registry_url);

    let state = Arc::new(GatewayState::new(config, client));
    let app = server::build_router(state);

    let addr = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    axum::serve(listener, app)
        .await
        .expect("webhook-server exited unexpectedly");
}
