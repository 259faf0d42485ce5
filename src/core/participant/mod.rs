// src/core/participant/mod.rs

//! The Participant Library (PL): linked into LP, PP, and every driver to
//! implement the *server side* of the coordinator protocol.
//!
//! PL exposes a handler interface with one named entry point per phase plus
//! save/clear-startup/abort, each returning `Ok | Failure | Fatal`, and
//! tracks a local `oper_state` so out-of-order phases are rejected with
//! `InvalidOperState` rather than silently accepted. `PL` itself
//! implements `message::ParticipantHandler` so the Message Builder can talk
//! to it exactly like any other registered channel — the host module only
//! ever sees the narrower `HostHandler` trait.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::message::{
    KeyValueRecord, MsgKind, ParticipantHandler, Payload, Request, Response, Status,
};

/// The local state machine every participant tracks, validated against each
/// inbound phase call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperState {
    Idle,
    CommitTransStartDone,
    CommitVoteInProgress,
    CommitGlobalCommitDone,
    CommitDriverVoteGlobalDone,
    CommitDriverResultDone,
    AuditTransStartDone,
    AuditVoteInProgress,
    AuditGlobalCommitDone,
    AuditDriverVoteGlobalDone,
    AuditDriverResultDone,
    /// Entered on any `Ok -> Failure` transition; the PL now expects a
    /// `GlobalAbort` before it will accept anything else.
    AwaitingGlobalAbort,
}

/// The narrow interface a host module (LP, PP, a driver) implements. Each
/// method corresponds 1:1 to a `TcLibModule` virtual in the original source.
#[async_trait]
pub trait HostHandler: Send + Sync {
    async fn commit_trans_start_end(&self, session: u32, config_id: u32) -> Status;
    async fn commit_vote_global(&self, session: u32, config_id: u32) -> (Status, Vec<String>);
    async fn commit_global_commit(&self, session: u32, config_id: u32, controllers: &[String]) -> Status;
    async fn commit_driver_vote_global(&self, session: u32, config_id: u32, controllers: &[String]) -> Status;
    async fn commit_driver_result(&self, session: u32, config_id: u32, results: &[crate::core::message::ControllerResult]) -> Status;
    async fn commit_global_abort(&self, session: u32, config_id: u32) -> Status;

    async fn audit_trans_start_end(&self, session: u32, controller: &str) -> Status;
    async fn audit_vote_global(&self, session: u32, controller: &str) -> (Status, Vec<String>);
    async fn audit_global_commit(&self, session: u32, controller: &str) -> Status;
    async fn audit_driver_vote_global(&self, session: u32, controller: &str) -> Status;
    async fn audit_driver_result(&self, session: u32, controller: &str, results: &[crate::core::message::ControllerResult]) -> Status;
    async fn audit_global_abort(&self, session: u32, controller: &str) -> Status;

    async fn save_configuration(&self, session: u32, config_id: u32) -> Status;
    async fn clear_startup(&self, session: u32, config_id: u32) -> Status;
    async fn abort_candidate(&self, session: u32, config_id: u32) -> Status;
    async fn setup(&self, session: u32) -> Status;
    async fn setup_complete(&self, session: u32) -> Status;

    /// Permitted only while `oper_state` is a driver-result phase.
    async fn read_key_value_info(&self, controller: &str, err_pos: u32, key_type: &str) -> Option<KeyValueRecord>;
    async fn write_key_value_info(&self, controller: &str, record: &KeyValueRecord) -> Status;
}

fn status_from(s: Status) -> Response {
    match s {
        Status::Success => Response::success(),
        Status::Failure => Response::failure(),
        Status::Fatal => Response::fatal(),
    }
}

/// Wraps a `HostHandler` with the oper_state machine and exposes it to MB as
/// a `ParticipantHandler`.
pub struct ParticipantLibrary<H: HostHandler> {
    host: Arc<H>,
    state: Mutex<OperState>,
}

impl<H: HostHandler> std::fmt::Debug for ParticipantLibrary<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantLibrary")
            .field("state", &self.state())
            .finish()
    }
}

impl<H: HostHandler> ParticipantLibrary<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            state: Mutex::new(OperState::Idle),
        }
    }

    fn set_state(&self, s: OperState) {
        *self.state.lock() = s;
    }

    fn state(&self) -> OperState {
        *self.state.lock()
    }

    fn check_order(&self, expected: &[OperState]) -> Result<(), Response> {
        if expected.contains(&self.state()) {
            Ok(())
        } else {
            Err(Response {
                status: Status::Failure,
                controllers: Vec::new(),
                driver_results: None,
                key_value: None,
            })
        }
    }
}

#[async_trait]
impl<H: HostHandler + Send + Sync> ParticipantHandler for ParticipantLibrary<H> {
    async fn handle(&self, req: Request) -> Response {
        match req.kind {
            MsgKind::TransStart => {
                if self.check_order(&[OperState::Idle]).is_err() {
                    return out_of_order();
                }
                let status = self.host.commit_trans_start_end(req.session, req.config_id).await;
                if status == Status::Success {
                    self.set_state(OperState::CommitTransStartDone);
                } else {
                    self.set_state(OperState::AwaitingGlobalAbort);
                }
                status_from(status)
            }
            MsgKind::VoteRequest => {
                if self.check_order(&[OperState::CommitTransStartDone]).is_err() {
                    return out_of_order();
                }
                let (status, controllers) = self.host.commit_vote_global(req.session, req.config_id).await;
                if status == Status::Success {
                    self.set_state(OperState::CommitVoteInProgress);
                } else {
                    self.set_state(OperState::AwaitingGlobalAbort);
                }
                Response {
                    status,
                    controllers,
                    driver_results: None,
                    key_value: None,
                }
            }
            MsgKind::GlobalCommit => {
                if self.check_order(&[OperState::CommitVoteInProgress]).is_err() {
                    return out_of_order();
                }
                let controllers = match &req.payload {
                    Payload::ControllerList(c) => c.clone(),
                    _ => Vec::new(),
                };
                let status = self
                    .host
                    .commit_global_commit(req.session, req.config_id, &controllers)
                    .await;
                self.set_state(if status == Status::Success {
                    OperState::CommitGlobalCommitDone
                } else {
                    OperState::AwaitingGlobalAbort
                });
                status_from(status)
            }
            MsgKind::DriverVoteGlobal => {
                if self.check_order(&[OperState::CommitGlobalCommitDone]).is_err() {
                    return out_of_order();
                }
                let controllers = match &req.payload {
                    Payload::ControllerList(c) => c.clone(),
                    _ => Vec::new(),
                };
                let status = self
                    .host
                    .commit_driver_vote_global(req.session, req.config_id, &controllers)
                    .await;
                self.set_state(if status == Status::Success {
                    OperState::CommitDriverVoteGlobalDone
                } else {
                    OperState::AwaitingGlobalAbort
                });
                status_from(status)
            }
            MsgKind::DriverResult => {
                if self.check_order(&[OperState::CommitDriverVoteGlobalDone]).is_err() {
                    return out_of_order();
                }
                let results = match &req.payload {
                    Payload::DriverResults(r) => r.clone(),
                    _ => Vec::new(),
                };
                let status = self
                    .host
                    .commit_driver_result(req.session, req.config_id, &results)
                    .await;
                self.set_state(if status == Status::Success {
                    OperState::CommitDriverResultDone
                } else {
                    OperState::AwaitingGlobalAbort
                });
                status_from(status)
            }
            MsgKind::GlobalAbort => {
                let status = self.host.commit_global_abort(req.session, req.config_id).await;
                self.set_state(OperState::AwaitingGlobalAbort);
                status_from(status)
            }
            MsgKind::TransEnd => {
                let status = Status::Success;
                self.set_state(OperState::Idle);
                status_from(status)
            }
            MsgKind::AuditStart => {
                let controller = req.controller_id.clone().unwrap_or_default();
                let status = self.host.audit_trans_start_end(req.session, &controller).await;
                self.set_state(if status == Status::Success {
                    OperState::AuditTransStartDone
                } else {
                    OperState::AwaitingGlobalAbort
                });
                status_from(status)
            }
            MsgKind::AuditEnd => {
                self.set_state(OperState::Idle);
                status_from(Status::Success)
            }
            MsgKind::Save => status_from(self.host.save_configuration(req.session, req.config_id).await),
            MsgKind::ClearStartup => status_from(self.host.clear_startup(req.session, req.config_id).await),
            MsgKind::AbortCandidate => status_from(self.host.abort_candidate(req.session, req.config_id).await),
            MsgKind::Setup => status_from(self.host.setup(req.session).await),
            MsgKind::SetupComplete => status_from(self.host.setup_complete(req.session).await),
            MsgKind::ReadKeyValue => {
                if !matches!(
                    self.state(),
                    OperState::CommitDriverResultDone | OperState::AuditDriverResultDone
                ) {
                    return out_of_order();
                }
                let (err_pos, key_type, controller) = match &req.payload {
                    Payload::ReadKeyValueRequest { err_pos, key_type } => {
                        (*err_pos, key_type.clone(), req.controller_id.clone().unwrap_or_default())
                    }
                    _ => return out_of_order(),
                };
                match self.host.read_key_value_info(&controller, err_pos, &key_type).await {
                    Some(record) => Response {
                        status: Status::Success,
                        controllers: Vec::new(),
                        driver_results: None,
                        key_value: Some(record),
                    },
                    None => Response::failure(),
                }
            }
            MsgKind::WriteKeyValue => {
                let (controller, record) = match &req.payload {
                    Payload::KeyValue(record) => (req.controller_id.clone().unwrap_or_default(), record.clone()),
                    _ => return out_of_order(),
                };
                status_from(self.host.write_key_value_info(&controller, &record).await)
            }
        }
    }
}

fn out_of_order() -> Response {
    Response {
        status: Status::Failure,
        controllers: Vec::new(),
        driver_results: None,
        key_value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost;

    #[async_trait]
    impl HostHandler for FakeHost {
        async fn commit_trans_start_end(&self, _s: u32, _c: u32) -> Status {
            Status::Success
        }
        async fn commit_vote_global(&self, _s: u32, _c: u32) -> (Status, Vec<String>) {
            (Status::Success, vec!["of0".into()])
        }
        async fn commit_global_commit(&self, _s: u32, _c: u32, _ctrls: &[String]) -> Status {
            Status::Success
        }
        async fn commit_driver_vote_global(&self, _s: u32, _c: u32, _ctrls: &[String]) -> Status {
            Status::Success
        }
        async fn commit_driver_result(&self, _s: u32, _c: u32, _r: &[crate::core::message::ControllerResult]) -> Status {
            Status::Success
        }
        async fn commit_global_abort(&self, _s: u32, _c: u32) -> Status {
            Status::Success
        }
        async fn audit_trans_start_end(&self, _s: u32, _c: &str) -> Status {
            Status::Success
        }
        async fn audit_vote_global(&self, _s: u32, _c: &str) -> (Status, Vec<String>) {
            (Status::Success, vec![])
        }
        async fn audit_global_commit(&self, _s: u32, _c: &str) -> Status {
            Status::Success
        }
        async fn audit_driver_vote_global(&self, _s: u32, _c: &str) -> Status {
            Status::Success
        }
        async fn audit_driver_result(&self, _s: u32, _c: &str, _r: &[crate::core::message::ControllerResult]) -> Status {
            Status::Success
        }
        async fn audit_global_abort(&self, _s: u32, _c: &str) -> Status {
            Status::Success
        }
        async fn save_configuration(&self, _s: u32, _c: u32) -> Status {
            Status::Success
        }
        async fn clear_startup(&self, _s: u32, _c: u32) -> Status {
            Status::Success
        }
        async fn abort_candidate(&self, _s: u32, _c: u32) -> Status {
            Status::Success
        }
        async fn setup(&self, _s: u32) -> Status {
            Status::Success
        }
        async fn setup_complete(&self, _s: u32) -> Status {
            Status::Success
        }
        async fn read_key_value_info(&self, _c: &str, _e: u32, _k: &str) -> Option<KeyValueRecord> {
            None
        }
        async fn write_key_value_info(&self, _c: &str, _r: &KeyValueRecord) -> Status {
            Status::Success
        }
    }

    fn req(kind: MsgKind) -> Request {
        Request {
            kind,
            session: 1,
            config_id: 1,
            controller_id: None,
            payload: Payload::None,
        }
    }

    #[tokio::test]
    async fn out_of_order_vote_request_is_rejected() {
        let pl = ParticipantLibrary::new(Arc::new(FakeHost));
        let resp = pl.handle(req(MsgKind::VoteRequest)).await;
        assert_eq!(resp.status, Status::Failure);
    }

    #[tokio::test]
    async fn happy_path_advances_state() {
        let pl = ParticipantLibrary::new(Arc::new(FakeHost));
        assert_eq!(pl.handle(req(MsgKind::TransStart)).await.status, Status::Success);
        assert_eq!(pl.handle(req(MsgKind::VoteRequest)).await.status, Status::Success);
        assert_eq!(pl.state(), OperState::CommitVoteInProgress);
    }

    #[tokio::test]
    async fn trans_end_returns_to_idle() {
        let pl = ParticipantLibrary::new(Arc::new(FakeHost));
        pl.handle(req(MsgKind::TransStart)).await;
        pl.handle(req(MsgKind::TransEnd)).await;
        assert_eq!(pl.state(), OperState::Idle);
    }
}
