// src/server/connection_loop.rs

//! The main accept loop: one task per inbound TCP connection, each reading
//! and replying to `Frame`s through the Operation Dispatcher until the peer
//! disconnects or the process is asked to shut down.

use super::context::TcContext;
use crate::core::dispatcher::Dispatcher;
use crate::core::wire::FrameCodec;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{error, info, warn};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for a shutdown signal based on the operating system: SIGINT/SIGTERM
/// on Unix, Ctrl+C on Windows.
async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to install Ctrl+C handler");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown."); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown."); } } => {},
    }
}

/// The main TC loop: accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: TcContext) {
    let mut conn_tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                break;
            },

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => info!("a background task completed"),
                    Ok(Err(e)) => { error!("CRITICAL: background task failed: {e}. Shutting down."); break; }
                    Err(e) => { error!("CRITICAL: background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        info!("accepted connection from {addr}");
                        let dispatcher = ctx.dispatcher.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        conn_tasks.spawn(handle_connection(socket, dispatcher, shutdown_rx));
                    }
                    Err(e) => error!("failed to accept connection: {e}"),
                }
            },

            Some(res) = conn_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("a connection handler panicked: {e:?}");
                }
            },
        }
    }

    info!("shutting down, signaling all tasks");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("failed to send shutdown signal; no connections were listening");
    }
    conn_tasks.shutdown().await;
    info!("TC shutdown complete");
}

async fn handle_connection(
    socket: TcpStream,
    dispatcher: Arc<Dispatcher>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut framed = Framed::new(socket, FrameCodec);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                break;
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(frame)) => {
                        let reply = dispatcher.dispatch(frame).await;
                        if let Err(e) = framed.send(reply).await {
                            warn!("failed to send reply frame: {e}");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("connection terminated on decode error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}
