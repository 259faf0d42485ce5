// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, reload};

mod connection_loop;
mod context;
mod initialization;

/// The main TC startup function, orchestrating setup and the accept loop.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    let ctx = initialization::setup(config, log_reload_handle).await?;
    connection_loop::run(ctx).await;
    Ok(())
}
