// src/server/context.rs

use crate::core::dispatcher::Dispatcher;
use crate::core::state::TcState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the TC's main loop.
pub struct TcContext {
    pub state: Arc<TcState>,
    pub dispatcher: Arc<Dispatcher>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
