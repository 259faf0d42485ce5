// src/core/dispatcher/mod.rs

//! The Operation Dispatcher (OD): the single inbound RPC lifecycle that every
//! wire `Frame` passes through — parse, acquire exclusion, route to the
//! Commit/Audit Coordinator or straight to MB/a read handler, always release
//! exclusion on the way out, and reply with a `result_code`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use serde::Serialize;

use crate::core::coordinator::{Coordinator, Outcome};
use crate::core::errors::TcError;
use crate::core::lock::{ConfigId, LockManager, LockSnapshot, OperationClass, SessionId};
use crate::core::message::{MsgKind, Payload, Request, Status};
use crate::core::metrics;
use crate::core::operation::{Operation, OperationKind};
use crate::core::registry::Role;
use crate::core::state::StatsState;
use crate::core::state::persistence::{OperationClassTag, SessionRow, SessionStore};
use crate::core::wire::Frame;

/// The `status` CLI reply: the lock snapshot plus the running request/outcome
/// counters, distinct from `show-lock`'s bare `LockSnapshot`.
#[derive(Debug, Serialize)]
struct StatusReport {
    lock: LockSnapshot,
    total_requests: u64,
    total_commits: u64,
    commit_failures: u64,
    total_audits: u64,
    audit_failures: u64,
    exclusion_denials: u64,
}

/// Wire `op_type` tags for the control CLI, outside the `OperationKind`
/// enumeration proper: these never touch the exclusion discipline or the
/// Commit/Audit Coordinator, only the Lock Manager's snapshot/force-release
/// accessors.
pub const OP_STATUS: u32 = 100;
pub const OP_ABORT_SESSION: u32 = 101;
pub const OP_SHOW_LOCK: u32 = 102;

/// Everything the Dispatcher needs to run one request end to end.
pub struct Dispatcher {
    pub lock_manager: Arc<LockManager>,
    pub coordinator: Arc<Coordinator>,
    pub session_store: Arc<SessionStore>,
    pub stats: Arc<StatsState>,
}

impl Dispatcher {
    pub fn new(
        lock_manager: Arc<LockManager>,
        coordinator: Arc<Coordinator>,
        session_store: Arc<SessionStore>,
        stats: Arc<StatsState>,
    ) -> Self {
        Self {
            lock_manager,
            coordinator,
            session_store,
            stats,
        }
    }

    /// Runs the full lifecycle for one inbound frame and produces the reply
    /// frame. Exclusion is always released before this returns, on every
    /// path — success, classified failure, or parse error.
    pub async fn dispatch(&self, frame: Frame) -> Frame {
        if let Some(reply) = self.dispatch_admin(&frame) {
            return reply;
        }

        self.stats.record_request();

        let session_id = frame.session_id;
        let mut reply = Frame::new(frame.session_id, frame.config_id, frame.op_type);

        let op = match Operation::parse(&frame) {
            Ok(op) => op,
            Err(e) => {
                reply.result_code = e.result_code();
                return reply;
            }
        };

        let op_label = format!("{:?}", op.kind);
        metrics::REQUESTS_TOTAL.with_label_values(&[op_label.as_str()]).inc();

        let op_class = op.kind.operation_class();

        if let Err(denial) = self.lock_manager.acquire(op.session, op_class) {
            let e: TcError = denial.into();
            warn!(session_id, ?op.kind, "exclusion denied: {e}");
            self.stats.record_exclusion_denial();
            let denial_label = format!("{denial:?}");
            metrics::EXCLUSION_DENIALS_TOTAL
                .with_label_values(&[denial_label.as_str()])
                .inc();
            reply.result_code = e.result_code();
            return reply;
        }

        // Persist the hold before it's considered committed. Config-id
        // issuance for Commit happens here so the persisted row carries the
        // real id rather than a placeholder.
        let config_id = if op.kind == OperationKind::Commit {
            match self.lock_manager.new_config_id(op.session) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.release(op.session, op_class, op.config_id);
                    reply.result_code = e.result_code();
                    return reply;
                }
            }
        } else if matches!(
            op.kind,
            OperationKind::Save | OperationKind::ClearStartup | OperationKind::AbortCandidate
        ) {
            // These carry a client-asserted config id on the wire (enforced
            // non-zero at parse time); stamp it onto this hold so `validate`
            // below has a real value to check instead of the `None` a plain
            // `acquire` leaves behind.
            match self
                .lock_manager
                .establish_config_id(op.session, op.config_id.unwrap_or(0))
            {
                Ok(()) => op.config_id,
                Err(e) => {
                    self.release(op.session, op_class, op.config_id);
                    reply.result_code = e.result_code();
                    return reply;
                }
            }
        } else {
            op.config_id
        };

        if let Err(e) = self.persist_hold(op.session, op_class, config_id.unwrap_or(0)) {
            warn!(session_id, "failed to persist session row: {e}");
            self.release(op.session, op_class, config_id);
            reply.result_code = e.result_code();
            return reply;
        }

        let result = self.run(&op, config_id).await;

        self.release(op.session, op_class, config_id);
        if let Err(e) = self.session_store.remove(op.session) {
            warn!(session_id, "failed to clear persisted session row: {e}");
        }

        match result {
            Ok(response_payload) => {
                reply.result_code = 0;
                reply.payload = response_payload;
                self.record_outcome(op.kind, true);
            }
            Err(e) => {
                info!(session_id, ?op.kind, "operation failed: {e}");
                reply.result_code = e.result_code();
                self.record_outcome(op.kind, false);
            }
        }
        reply
    }

    fn record_outcome(&self, kind: OperationKind, succeeded: bool) {
        let label = if succeeded { "success" } else { "failure" };
        match kind {
            OperationKind::Commit => {
                self.stats.record_commit(succeeded);
                metrics::COMMIT_OUTCOMES_TOTAL.with_label_values(&[label]).inc();
            }
            OperationKind::Audit => {
                self.stats.record_audit(succeeded);
                metrics::AUDIT_OUTCOMES_TOTAL.with_label_values(&[label]).inc();
            }
            _ => {}
        }
    }

    /// Handles the three control-CLI ops directly against the Lock Manager,
    /// bypassing `Operation::parse`/exclusion/the coordinator entirely — they
    /// are administrative introspection, not part of the session protocol.
    fn dispatch_admin(&self, frame: &Frame) -> Option<Frame> {
        let mut reply = Frame::new(frame.session_id, frame.config_id, frame.op_type);
        match frame.op_type {
            OP_STATUS => {
                let report = StatusReport {
                    lock: self.lock_manager.snapshot(),
                    total_requests: self.stats.total_requests(),
                    total_commits: self.stats.total_commits(),
                    commit_failures: self.stats.commit_failures(),
                    total_audits: self.stats.total_audits(),
                    audit_failures: self.stats.audit_failures(),
                    exclusion_denials: self.stats.exclusion_denials(),
                };
                reply.payload = serde_json::to_vec(&report).unwrap_or_default();
                Some(reply)
            }
            OP_ABORT_SESSION => {
                self.lock_manager.force_release(frame.session_id);
                if let Err(e) = self.session_store.remove(frame.session_id) {
                    warn!(session_id = frame.session_id, "failed to clear persisted row for aborted session: {e}");
                }
                Some(reply)
            }
            OP_SHOW_LOCK => {
                let snapshot = self.lock_manager.snapshot();
                reply.payload = serde_json::to_vec(&snapshot).unwrap_or_default();
                Some(reply)
            }
            _ => None,
        }
    }

    async fn run(&self, op: &Operation, config_id: Option<ConfigId>) -> Result<Vec<u8>, TcError> {
        if op.kind.drives_coordinator() {
            let outcome = match op.kind {
                OperationKind::Commit => {
                    self.coordinator
                        .run_commit(op.session, config_id.unwrap_or(0))
                        .await
                }
                OperationKind::Audit => {
                    let controller_id = op
                        .controller_id
                        .as_deref()
                        .ok_or_else(|| TcError::InvalidSyntax("Audit requires a controller_id".into()))?;
                    self.coordinator.run_audit(op.session, controller_id).await
                }
                _ => unreachable!("drives_coordinator() only true for Commit/Audit"),
            };
            outcome_to_result(outcome)?;
            return Ok(Vec::new());
        }

        match op.kind {
            OperationKind::Save
            | OperationKind::ClearStartup
            | OperationKind::AbortCandidate
            | OperationKind::Setup
            | OperationKind::SetupComplete => {
                if matches!(
                    op.kind,
                    OperationKind::Save | OperationKind::ClearStartup | OperationKind::AbortCandidate
                ) && !self.lock_manager.validate(op.session, config_id.unwrap_or(0))
                {
                    return Err(TcError::InvalidConfigId);
                }

                let kind = match op.kind {
                    OperationKind::Save => MsgKind::Save,
                    OperationKind::ClearStartup => MsgKind::ClearStartup,
                    OperationKind::AbortCandidate => MsgKind::AbortCandidate,
                    OperationKind::Setup => MsgKind::Setup,
                    OperationKind::SetupComplete => MsgKind::SetupComplete,
                    _ => unreachable!(),
                };
                for role in [Role::Lp, Role::Pp] {
                    let req = Request {
                        kind,
                        session: op.session,
                        config_id: config_id.unwrap_or(0),
                        controller_id: None,
                        payload: Payload::None,
                    };
                    let resp = self.coordinator.call(role, req).await?;
                    if resp.status != Status::Success {
                        return Err(TcError::ParticipantFailure {
                            phase: crate::core::coordinator::Phase::TransStart,
                            role,
                        });
                    }
                }
                Ok(Vec::new())
            }
            OperationKind::Read
            | OperationKind::ReadSibling
            | OperationKind::ReadSiblingBegin
            | OperationKind::ReadSiblingCount
            | OperationKind::ReadNext
            | OperationKind::ReadBulk => {
                let req = Request {
                    kind: MsgKind::ReadKeyValue,
                    session: op.session,
                    config_id: config_id.unwrap_or(0),
                    controller_id: op.controller_id.clone(),
                    payload: Payload::None,
                };
                let resp = self.coordinator.call(Role::Lp, req).await?;
                if resp.status != Status::Success {
                    return Err(TcError::DbNotFound);
                }
                Ok(Vec::new())
            }
            OperationKind::Commit | OperationKind::Audit => unreachable!(),
        }
    }

    fn release(&self, session: SessionId, op_class: OperationClass, config_id: Option<ConfigId>) {
        if let Err(e) = self.lock_manager.release(session, config_id, op_class) {
            warn!(session, ?op_class, "failed to release exclusion: {e}");
        }
    }

    fn persist_hold(
        &self,
        session: SessionId,
        op_class: OperationClass,
        config_id: ConfigId,
    ) -> Result<(), TcError> {
        let acquired_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.session_store.put(SessionRow {
            session_id: session,
            op_class: OperationClassTag::from(op_class),
            config_id,
            acquired_at,
        })
    }
}

fn outcome_to_result(outcome: Outcome) -> Result<(), TcError> {
    Result::<(), TcError>::from(outcome)
}
