// src/core/coordinator/audit.rs

//! The audit state machine: isomorphic to commit, with an outer
//! `AuditStart`/`AuditEnd` bracket and scope narrowed to a single controller
//! named in the audit request, rather than the full aggregated list.

use tracing::warn;

use crate::core::coordinator::{Coordinator, Outcome, Phase};
use crate::core::keytree::KeyTree;
use crate::core::message::{ControllerResult, MsgKind, Payload, Request, Status};
use crate::core::metrics;
use crate::core::registry::Role;

const LP_THEN_PP: [Role; 2] = [Role::Lp, Role::Pp];

impl Coordinator {
    pub async fn run_audit(&self, session: u32, controller_id: &str) -> Outcome {
        let mut contacted: Vec<Role> = Vec::new();

        // --- AuditStart: LP then PP ---
        for role in LP_THEN_PP {
            let req = self.audit_request(MsgKind::AuditStart, session, controller_id);
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {
                    contacted.push(role);
                }
                Ok(resp) => {
                    // AuditStart failures skip GlobalAbort, but every role
                    // already started — including the one that just failed —
                    // still needs an AuditEnd to clear its local oper_state.
                    contacted.push(role);
                    self.best_effort_audit_end(session, controller_id, &contacted).await;
                    return classify(Phase::TransStart, role, resp.status);
                }
                Err(_) => {
                    contacted.push(role);
                    self.best_effort_audit_end(session, controller_id, &contacted).await;
                    return Outcome::Failed {
                        phase: Phase::TransStart,
                        role,
                    };
                }
            }
        }

        // --- VoteRequest ---
        for role in LP_THEN_PP {
            let req = self.audit_request(MsgKind::VoteRequest, session, controller_id);
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {}
                Ok(resp) => return self.abort(session, controller_id, &contacted, Phase::VoteRequest, role, resp.status).await,
                Err(_) => {
                    return self
                        .abort(session, controller_id, &contacted, Phase::VoteRequest, role, Status::Failure)
                        .await;
                }
            }
        }

        // --- GlobalCommit ---
        for role in LP_THEN_PP {
            let req = self.audit_request(MsgKind::GlobalCommit, session, controller_id);
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {}
                Ok(resp) => return self.abort(session, controller_id, &contacted, Phase::GlobalCommit, role, resp.status).await,
                Err(_) => {
                    return self
                        .abort(session, controller_id, &contacted, Phase::GlobalCommit, role, Status::Failure)
                        .await;
                }
            }
        }

        // --- DriverVoteGlobal: scoped to the single audited controller.
        //     Each driver's reported errors for this controller accumulate
        //     into `result` rather than being discarded. ---
        let drivers = self.registry.registered_drivers();
        contacted.extend(drivers.iter().copied());
        let mut result = ControllerResult {
            controller_id: controller_id.to_string(),
            response_code: 0,
            errors: Vec::new(),
        };
        for role in &drivers {
            let req = self.audit_request(MsgKind::DriverVoteGlobal, session, controller_id);
            match self.call(*role, req).await {
                Ok(resp) if resp.status == Status::Success => {
                    if let Some(results) = resp.driver_results {
                        for r in results {
                            if r.controller_id == controller_id {
                                result.errors.extend(r.errors);
                                result.response_code = r.response_code;
                            }
                        }
                    }
                }
                Ok(resp) => {
                    return self
                        .abort(session, controller_id, &contacted, Phase::DriverVoteGlobal, *role, resp.status)
                        .await;
                }
                Err(_) => {
                    return self
                        .abort(
                            session,
                            controller_id,
                            &contacted,
                            Phase::DriverVoteGlobal,
                            *role,
                            Status::Failure,
                        )
                        .await;
                }
            }
        }

        // --- DriverResult: a single controller's result, KeyTree dedup applies the
        //     same way it does for commit so repeated audits are idempotent ---
        let mut tree = KeyTree::new();
        if let Err(e) = self.ingest_driver_errors(&mut tree, session, 0, &result).await {
            warn!("failed to ingest driver errors during audit for {}: {}", controller_id, e);
        }

        for role in LP_THEN_PP {
            let req = Request {
                kind: MsgKind::DriverResult,
                session,
                config_id: 0,
                controller_id: Some(controller_id.to_string()),
                payload: Payload::DriverResults(vec![result.clone()]),
            };
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {}
                Ok(resp) => {
                    return self
                        .abort(session, controller_id, &contacted, Phase::DriverResult, role, resp.status)
                        .await;
                }
                Err(_) => {
                    return self
                        .abort(session, controller_id, &contacted, Phase::DriverResult, role, Status::Failure)
                        .await;
                }
            }
        }

        self.best_effort_audit_end(session, controller_id, &LP_THEN_PP).await;
        tree.clear();
        Outcome::Success
    }

    fn audit_request(&self, kind: MsgKind, session: u32, controller_id: &str) -> Request {
        Request {
            kind,
            session,
            config_id: 0,
            controller_id: Some(controller_id.to_string()),
            payload: Payload::None,
        }
    }

    async fn abort(
        &self,
        session: u32,
        controller_id: &str,
        contacted: &[Role],
        phase: Phase,
        failing_role: Role,
        status: Status,
    ) -> Outcome {
        if phase.requires_compensation_on_failure() {
            metrics::COMPENSATION_SWEEPS_TOTAL.inc();
            for role in contacted {
                let req = self.audit_request(MsgKind::GlobalAbort, session, controller_id);
                if let Err(e) = self.call(*role, req).await {
                    warn!("GlobalAbort to {:?} failed during audit compensation: {}", role, e);
                }
            }
        }
        self.best_effort_audit_end(session, controller_id, contacted).await;
        classify(phase, failing_role, status)
    }

    async fn best_effort_audit_end(&self, session: u32, controller_id: &str, roles: &[Role]) {
        for role in roles {
            let req = self.audit_request(MsgKind::AuditEnd, session, controller_id);
            if let Err(e) = self.call(*role, req).await {
                warn!("AuditEnd to {:?} failed (best-effort): {}", role, e);
            }
        }
    }
}

fn classify(phase: Phase, role: Role, status: Status) -> Outcome {
    match status {
        Status::Success => Outcome::Success,
        Status::Failure => Outcome::Failed { phase, role },
        Status::Fatal => Outcome::Fatal { phase, role },
    }
}
