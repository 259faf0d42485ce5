// src/config.rs

//! Loads and resolves the Transaction Coordinator's configuration: compiled
//! defaults -> `tc.toml` -> `TC_*` environment overrides -> `--port`/
//! `--config` CLI flags.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::{Arc, Mutex};

/// A simple wrapper to allow sharing the config behind a mutex, so a live
/// config can be swapped out in place without restarting the process.
pub trait IntoMutex: Sized {
    fn into_mutex(self) -> Arc<Mutex<Self>>;
}

impl IntoMutex for Config {
    fn into_mutex(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8835
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_phase_timeout_ms() -> u64 {
    30_000
}
fn default_db_dsn() -> String {
    "tc_session.json".to_string()
}
fn default_metrics_port() -> u16 {
    9835
}

/// The on-disk shape of `tc.toml`. Every field has a default so a missing or
/// partial file still resolves to a fully usable `Config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    /// Per-phase RPC deadline for the Commit/Audit Coordinator.
    #[serde(default = "default_phase_timeout_ms")]
    phase_timeout_ms: u64,
    /// DSN/path for the lock-metadata store (`tc_session` table).
    #[serde(default = "default_db_dsn")]
    db_dsn: String,
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            phase_timeout_ms: default_phase_timeout_ms(),
            db_dsn: default_db_dsn(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Represents the final, validated, and resolved TC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub phase_timeout_ms: u64,
    pub db_dsn: String,
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            phase_timeout_ms: raw.phase_timeout_ms,
            db_dsn: raw.db_dsn,
            metrics_port: raw.metrics_port,
        }
    }
}

impl Config {
    /// Loads `tc.toml` at `path`. A missing file falls back to compiled
    /// defaults; a present-but-malformed file is still a hard error.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw_config: RawConfig = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML from '{path}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config file at '{path}'"));
            }
        };

        let mut config: Config = raw_config.into();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `TC_DB_DSN` and `TC_PHASE_TIMEOUT_MS` on top of whatever the
    /// file (or compiled defaults) provided. `TC_CONFIG` and `--port`/
    /// `--config` are resolved by the caller before `from_file` runs, since
    /// they pick the path rather than a field on `Config`.
    fn apply_env_overrides(&mut self) {
        if let Ok(dsn) = std::env::var("TC_DB_DSN") {
            self.db_dsn = dsn;
        }
        if let Ok(ms) = std::env::var("TC_PHASE_TIMEOUT_MS")
            && let Ok(parsed) = ms.parse::<u64>()
        {
            self.phase_timeout_ms = parsed;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.phase_timeout_ms == 0 {
            return Err(anyhow!("phase_timeout_ms cannot be 0"));
        }
        if self.db_dsn.trim().is_empty() {
            return Err(anyhow!("db_dsn cannot be empty"));
        }
        Ok(())
    }
}
