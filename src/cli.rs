// src/cli.rs

//! `tc-ctl`: a thin client over the same wire codec the participants use,
//! implementing the control CLI's three subcommands: `status`,
//! `abort-session <id>`, `show-lock`.

use anyhow::{Context, Result, anyhow};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::core::dispatcher::{OP_ABORT_SESSION, OP_SHOW_LOCK, OP_STATUS};
use crate::core::wire::{Frame, FrameCodec};

/// Exit codes: 0 success, 1 invalid arguments, 2 RPC failure.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INVALID_ARGS: i32 = 1;
pub const EXIT_RPC_FAILURE: i32 = 2;

pub enum Command {
    Status,
    AbortSession(u32),
    ShowLock,
}

impl Command {
    /// Parses a `tc-ctl` subcommand and its arguments, e.g. `["status"]` or
    /// `["abort-session", "42"]`. Returns `None` for an unrecognized or
    /// malformed invocation; the caller maps that to `EXIT_INVALID_ARGS`.
    pub fn parse(args: &[String]) -> Option<Command> {
        match args {
            [cmd] if cmd == "status" => Some(Command::Status),
            [cmd] if cmd == "show-lock" => Some(Command::ShowLock),
            [cmd, session_id] if cmd == "abort-session" => {
                session_id.parse().ok().map(Command::AbortSession)
            }
            _ => None,
        }
    }

    fn op_type(&self) -> u32 {
        match self {
            Command::Status => OP_STATUS,
            Command::AbortSession(_) => OP_ABORT_SESSION,
            Command::ShowLock => OP_SHOW_LOCK,
        }
    }

    fn session_id(&self) -> u32 {
        match self {
            Command::AbortSession(id) => *id,
            _ => 0,
        }
    }
}

/// Connects to a running TC, sends one control RPC, prints the reply, and
/// returns the process exit code.
pub async fn run(host: &str, port: u16, cmd: Command) -> Result<i32> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to TC at {host}:{port}"))?;
    let mut framed = Framed::new(stream, FrameCodec);

    let frame = Frame::new(cmd.session_id(), 0, cmd.op_type());
    framed.send(frame).await.context("failed to send control request")?;

    let reply = framed
        .next()
        .await
        .ok_or_else(|| anyhow!("connection closed before a reply was received"))?
        .context("failed to decode control reply")?;

    if reply.result_code != 0 {
        eprintln!("tc-ctl: RPC failed with result_code={}", reply.result_code);
        return Ok(EXIT_RPC_FAILURE);
    }

    if reply.payload.is_empty() {
        println!("ok");
    } else {
        let value: Value = serde_json::from_slice(&reply.payload)
            .context("failed to parse control reply payload as JSON")?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(EXIT_SUCCESS)
}
