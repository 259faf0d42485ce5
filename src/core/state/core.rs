// src/core/state/core.rs

//! Defines the central `TcState` struct, holding all shared process-wide
//! state, and its `initialize()` factory: one function that builds every
//! shared component in dependency order and hands the bootstrap code a
//! bundle it consumes once.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

use super::persistence::SessionStore;
use super::stats::StatsState;
use crate::config::Config;
use crate::core::coordinator::Coordinator;
use crate::core::dispatcher::Dispatcher;
use crate::core::lock::LockManager;
use crate::core::registry::ParticipantRegistry;

/// Everything produced by `TcState::initialize`, consumed once by the
/// process bootstrap to spawn the accept loop.
pub struct TcInit {
    pub state: Arc<TcState>,
    pub dispatcher: Arc<Dispatcher>,
}

/// The central struct holding all shared, process-wide state. Wrapped in an
/// `Arc` and handed to every connection task.
#[derive(Debug)]
pub struct TcState {
    /// The TC's runtime configuration, mutex-guarded for dynamic reload.
    pub config: Arc<AsyncMutex<Config>>,
    /// Arbitrates config/read/global exclusion.
    pub lock_manager: Arc<LockManager>,
    /// Role -> RPC-channel mapping for LP, PP, and the registered drivers.
    pub registry: Arc<ParticipantRegistry>,
    /// Persists `tc_session` rows across restarts.
    pub session_store: Arc<SessionStore>,
    /// A handle to the logging filter, for dynamic log level changes.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    /// Request/outcome counters and the latency monitor.
    pub stats: Arc<StatsState>,
    /// Per-phase RPC deadline applied by the coordinator.
    pub phase_timeout: Duration,
}

impl TcState {
    /// Initializes the entire process state from the given configuration.
    /// This is the main factory function for creating the TC's shared
    /// context.
    pub fn initialize(
        config: Config,
        log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    ) -> Result<TcInit> {
        let phase_timeout = Duration::from_millis(config.phase_timeout_ms);
        let db_dsn = PathBuf::from(&config.db_dsn);

        let lock_manager = Arc::new(LockManager::new());
        let registry = Arc::new(ParticipantRegistry::new());
        let session_store = Arc::new(SessionStore::new(db_dsn));
        let coordinator = Arc::new(Coordinator::new(Arc::clone(&registry), phase_timeout));
        let stats = Arc::new(StatsState::new());

        // Read back any stale rows left by a crash. The TC logs and force-
        // releases them but never attempts to resume the in-flight operation
        // itself.
        let stale_rows = session_store.load()?;
        for row in &stale_rows {
            warn!(
                session_id = row.session_id,
                config_id = row.config_id,
                "releasing stale tc_session row found at startup"
            );
            lock_manager.force_release(row.session_id);
            session_store.clear(row.session_id);
        }
        if !stale_rows.is_empty() {
            info!(count = stale_rows.len(), "cleared stale tc_session rows at startup");
        }

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&lock_manager),
            coordinator,
            Arc::clone(&session_store),
            Arc::clone(&stats),
        ));

        let state = Arc::new(Self {
            config: Arc::new(AsyncMutex::new(config)),
            lock_manager,
            registry,
            session_store,
            log_reload_handle,
            stats,
            phase_timeout,
        });

        Ok(TcInit { state, dispatcher })
    }
}
