//! Shared scaffolding for the end-to-end commit/audit scenarios: a
//! `TestContext` wrapping a real `TcState`/`Dispatcher` pair plus a handful of
//! scripted in-process participants standing in for LP/PP/drivers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::{filter::EnvFilter, reload};

use unc_tc::config::Config;
use unc_tc::core::dispatcher::Dispatcher;
use unc_tc::core::message::{MsgKind, ParticipantChannel, ParticipantHandler, Request, Response, Status};
use unc_tc::core::operation::OperationKind;
use unc_tc::core::registry::Role;
use unc_tc::core::state::TcState;
use unc_tc::core::wire::Frame;

pub struct TestContext {
    pub dispatcher: Arc<Dispatcher>,
    pub state: Arc<TcState>,
    _tempdir: tempfile::TempDir,
}

impl TestContext {
    pub fn new(phase_timeout: Duration, participants: Vec<(Role, ParticipantChannel)>) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.db_dsn = tempdir
            .path()
            .join("tc_session.json")
            .to_string_lossy()
            .into_owned();
        config.phase_timeout_ms = phase_timeout.as_millis() as u64;

        let (_filter, reload_handle) = reload::Layer::new(EnvFilter::new("warn"));
        let init = TcState::initialize(config, Arc::new(reload_handle)).expect("initialize");

        for (role, channel) in participants {
            init.state.registry.register(role, channel).expect("register participant");
        }

        Self {
            dispatcher: init.dispatcher,
            state: init.state,
            _tempdir: tempdir,
        }
    }

    pub async fn send(&self, session: u32, kind: OperationKind, controller_id: Option<&str>) -> Frame {
        let mut frame = Frame::new(session, 0, kind.wire_tag());
        if let Some(cid) = controller_id {
            frame.payload = cid.as_bytes().to_vec();
        }
        self.dispatcher.dispatch(frame).await
    }
}

/// Always replies with the same `Status`; `VoteRequest` additionally reports
/// `controllers` so commit/audit scenarios can exercise the aggregation step.
#[derive(Debug)]
pub struct Scripted {
    pub status: Status,
    pub controllers: Vec<String>,
    pub delay: Option<Duration>,
}

#[async_trait]
impl ParticipantHandler for Scripted {
    async fn handle(&self, req: Request) -> Response {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let mut resp = match self.status {
            Status::Success => Response::success(),
            Status::Failure => Response::failure(),
            Status::Fatal => Response::fatal(),
        };
        if req.kind == MsgKind::VoteRequest {
            resp.controllers = self.controllers.clone();
        }
        resp
    }
}

pub fn always_ok(controllers: &[&str]) -> ParticipantChannel {
    ParticipantChannel::InProcess(Arc::new(Scripted {
        status: Status::Success,
        controllers: controllers.iter().map(|s| s.to_string()).collect(),
        delay: None,
    }))
}

pub fn delayed_ok(controllers: &[&str], delay: Duration) -> ParticipantChannel {
    ParticipantChannel::InProcess(Arc::new(Scripted {
        status: Status::Success,
        controllers: controllers.iter().map(|s| s.to_string()).collect(),
        delay: Some(delay),
    }))
}

/// Succeeds for every `MsgKind` except `fails_at`, where it reports `status`.
#[derive(Debug)]
pub struct FailsAt {
    pub fails_at: MsgKind,
    pub status: Status,
}

#[async_trait]
impl ParticipantHandler for FailsAt {
    async fn handle(&self, req: Request) -> Response {
        if req.kind == self.fails_at {
            match self.status {
                Status::Success => Response::success(),
                Status::Failure => Response::failure(),
                Status::Fatal => Response::fatal(),
            }
        } else {
            Response::success()
        }
    }
}

pub fn fails_at(kind: MsgKind, status: Status) -> ParticipantChannel {
    ParticipantChannel::InProcess(Arc::new(FailsAt { fails_at: kind, status }))
}

/// Succeeds immediately for every `MsgKind` except `slow_at`, where it sleeps
/// `delay` before replying success — isolates a deadline overrun to one phase
/// rather than stalling every call the participant receives.
#[derive(Debug)]
pub struct SlowAt {
    pub slow_at: MsgKind,
    pub delay: Duration,
}

#[async_trait]
impl ParticipantHandler for SlowAt {
    async fn handle(&self, req: Request) -> Response {
        if req.kind == self.slow_at {
            tokio::time::sleep(self.delay).await;
        }
        Response::success()
    }
}

pub fn slow_at(kind: MsgKind, delay: Duration) -> ParticipantChannel {
    ParticipantChannel::InProcess(Arc::new(SlowAt { slow_at: kind, delay }))
}

/// Records every `MsgKind` it observes, in order, behind a `Mutex` so a test
/// can assert `GlobalAbort` reached exactly the participants it should have.
#[derive(Debug, Default)]
pub struct Recorder {
    pub seen: parking_lot::Mutex<Vec<MsgKind>>,
}

#[async_trait]
impl ParticipantHandler for Recorder {
    async fn handle(&self, req: Request) -> Response {
        self.seen.lock().push(req.kind);
        Response::success()
    }
}
