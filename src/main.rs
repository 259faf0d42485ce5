// src/main.rs

//! The main entry point for the Transaction Coordinator binary: normal
//! server mode, or `tc-ctl` control-CLI mode over the same wire codec.

use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};
use unc_tc::cli::{self, Command};
use unc_tc::config::Config;
use unc_tc::server;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("unc-tc version {VERSION}");
        return Ok(());
    }

    // `tc-ctl` mode: `unc-tc --ctl status|show-lock|abort-session <id>`,
    // a thin client speaking the same frame codec as participants.
    if args.len() > 1 && args[1] == "--ctl" {
        run_ctl_mode(&args[2..]).await
    } else {
        run_server_mode(&args).await
    }
}

async fn run_ctl_mode(ctl_args: &[String]) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .compact()
        .init();

    let Some(cmd) = Command::parse(ctl_args) else {
        eprintln!("Usage: tc-ctl status | show-lock | abort-session <session_id>");
        std::process::exit(cli::EXIT_INVALID_ARGS);
    };

    let host = std::env::var("TC_CTL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("TC_CTL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8835);

    let code = match cli::run(&host, port, cmd).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tc-ctl: {e}");
            cli::EXIT_RPC_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run_server_mode(args: &[String]) -> Result<()> {
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.to_string())
        .or_else(|| std::env::var("TC_CONFIG").ok())
        .unwrap_or_else(|| "tc.toml".to_string());

    let mut config = match Config::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config, reload_handle).await {
        error!("TC runtime error: {e}");
        return Err(e);
    }

    Ok(())
}
