// src/server/initialization.rs

//! Handles the complete TC initialization process: configuration, state
//! setup, stale-lock recovery, and binding the RPC listener.

use super::context::TcContext;
use crate::config::Config;
use crate::core::state::TcState;
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all TC components before starting the main accept loop.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<TcContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let host = config.host.clone();
    let port = config.port;

    let tc_init = TcState::initialize(config, log_reload_handle)?;
    info!("TC state initialized.");

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("TC listening on {}:{}", host, port);

    Ok(TcContext {
        state: tc_init.state,
        dispatcher: tc_init.dispatcher,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "TC configured with phase_timeout_ms={}, db_dsn={}",
        config.phase_timeout_ms, config.db_dsn
    );
}
