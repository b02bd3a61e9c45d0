//! # calshare-server
//!
//! Shared-calendar WebSocket server.
//!
//! This binary provides:
//! - **JSON message protocol** over WebSocket: auth, event CRUD, reminders,
//!   heartbeat
//! - **Token-based authentication** with in-memory bearer tokens
//! - **SQLite persistence** for users and events
//! - **Live broadcast** of calendar changes to every connected client
//! - **Background reminder scheduler** that pushes due reminders

mod auth;
mod config;
mod connection;
mod dispatch;
mod error;
mod events;
mod registry;
mod reminder;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use calshare_store::Database;

use crate::config::ServerConfig;
use crate::reminder::{BroadcastReminderSink, ReminderScheduler};
use crate::state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,calshare_server=debug")),
        )
        .init();

    info!("Starting calshare server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let mut config = ServerConfig::from_env();
    if let Some(arg) = std::env::args().nth(1) {
        let port: u16 = arg
            .parse()
            .with_context(|| format!("invalid port argument: {arg}"))?;
        config.set_port(port);
    }
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the store and build shared state
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let state = Arc::new(ServerState::new(config.clone(), db));

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic expired-token sweep.
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_state.config.token_sweep_interval);
        loop {
            interval.tick().await;
            sweep_state.auth.cleanup_expired();
        }
    });

    // Reminder scheduler with its own shutdown token so it can be stopped
    // before the sessions it broadcasts to.
    let reminder_shutdown = CancellationToken::new();
    let scheduler = ReminderScheduler::new(
        state.db.clone(),
        Arc::new(BroadcastReminderSink::new(state.registry.clone())),
        config.reminder_interval,
    );
    let reminder_task = tokio::spawn(scheduler.run(reminder_shutdown.clone()));

    // -----------------------------------------------------------------------
    // 5. Bind and serve
    // -----------------------------------------------------------------------
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening for WebSocket connections");

    let accept_shutdown = CancellationToken::new();
    let accept_task = tokio::spawn(connection::accept_loop(
        listener,
        state.clone(),
        accept_shutdown.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received Ctrl+C, shutting down");

    // -----------------------------------------------------------------------
    // 6. Ordered shutdown: reminders first, then sessions, then the
    //    listener, so no task broadcasts into a torn-down registry.
    // -----------------------------------------------------------------------
    reminder_shutdown.cancel();
    let _ = reminder_task.await;

    state.registry.close_all().await;

    accept_shutdown.cancel();
    let _ = accept_task.await;

    info!("Shutdown complete");
    Ok(())
}
