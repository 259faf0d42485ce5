// src/core/coordinator/commit.rs

//! The commit state machine: `TransStart -> VoteRequest -> GlobalCommit ->
//! DriverVoteGlobal -> DriverResult -> TransEnd`, with a compensating
//! `GlobalAbort` + `TransEnd(aborted)` sweep on any `Failure`/`Fatal` at or
//! after `VoteRequest`.

use tracing::{error, warn};

use crate::core::coordinator::{Coordinator, Outcome, Phase};
use crate::core::keytree::KeyTree;
use crate::core::message::{ControllerResult, MsgKind, Payload, Request, Status};
use crate::core::metrics;
use crate::core::registry::Role;

/// LP is always contacted before PP within a phase.
const LP_THEN_PP: [Role; 2] = [Role::Lp, Role::Pp];

impl Coordinator {
    pub async fn run_commit(&self, session: u32, config_id: u32) -> Outcome {
        let mut contacted: Vec<Role> = Vec::new();

        // --- TransStart: LP then PP, sequential, all must Success ---
        for role in LP_THEN_PP {
            let req = Request {
                kind: MsgKind::TransStart,
                session,
                config_id,
                controller_id: None,
                payload: Payload::None,
            };
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {
                    contacted.push(role);
                }
                Ok(resp) => {
                    // TransStart failures skip GlobalAbort entirely, but every
                    // role already started still needs a TransEnd to clear its
                    // local oper_state, including the one that just failed.
                    contacted.push(role);
                    self.best_effort_trans_end(session, config_id, &contacted).await;
                    return classify(Phase::TransStart, role, resp.status);
                }
                Err(_) => {
                    contacted.push(role);
                    self.best_effort_trans_end(session, config_id, &contacted).await;
                    return Outcome::Failed {
                        phase: Phase::TransStart,
                        role,
                    };
                }
            }
        }

        // --- VoteRequest: LP then PP, collect controller lists ---
        let mut controllers: Vec<String> = Vec::new();
        for role in LP_THEN_PP {
            let req = Request {
                kind: MsgKind::VoteRequest,
                session,
                config_id,
                controller_id: None,
                payload: Payload::None,
            };
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {
                    for c in resp.controllers {
                        if !controllers.contains(&c) {
                            controllers.push(c);
                        }
                    }
                }
                Ok(resp) => return self.abort(session, config_id, &contacted, Phase::VoteRequest, role, resp.status).await,
                Err(_) => {
                    return self
                        .abort(session, config_id, &contacted, Phase::VoteRequest, role, Status::Failure)
                        .await;
                }
            }
        }

        // --- GlobalCommit: LP then PP, aggregated controller list ---
        for role in LP_THEN_PP {
            let req = Request {
                kind: MsgKind::GlobalCommit,
                session,
                config_id,
                controller_id: None,
                payload: Payload::ControllerList(controllers.clone()),
            };
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {}
                Ok(resp) => return self.abort(session, config_id, &contacted, Phase::GlobalCommit, role, resp.status).await,
                Err(_) => {
                    return self
                        .abort(session, config_id, &contacted, Phase::GlobalCommit, role, Status::Failure)
                        .await;
                }
            }
        }

        // --- DriverVoteGlobal: every registered driver, in stable order.
        //     Each driver's reported ControllerResult set is merged by
        //     controller id so a later driver's errors append to, rather than
        //     overwrite, an earlier driver's for the same controller. ---
        let drivers = self.registry.registered_drivers();
        contacted.extend(drivers.iter().copied());
        let mut merged: Vec<ControllerResult> = controllers
            .iter()
            .map(|c| ControllerResult {
                controller_id: c.clone(),
                response_code: 0,
                errors: Vec::new(),
            })
            .collect();
        for role in &drivers {
            let req = Request {
                kind: MsgKind::DriverVoteGlobal,
                session,
                config_id,
                controller_id: None,
                payload: Payload::ControllerList(controllers.clone()),
            };
            match self.call(*role, req).await {
                Ok(resp) if resp.status == Status::Success => {
                    if let Some(results) = resp.driver_results {
                        merge_driver_results(&mut merged, results);
                    }
                }
                Ok(resp) => return self.abort(session, config_id, &contacted, Phase::DriverVoteGlobal, *role, resp.status).await,
                Err(_) => {
                    return self
                        .abort(session, config_id, &contacted, Phase::DriverVoteGlobal, *role, Status::Failure)
                        .await;
                }
            }
        }

        // --- DriverResult: LP then PP receive the merged driver-result set ---
        let mut tree = KeyTree::new();
        for result in &merged {
            if let Err(e) = self.ingest_driver_errors(&mut tree, session, config_id, result).await {
                warn!("failed to ingest driver errors for {}: {}", result.controller_id, e);
            }
        }

        for role in LP_THEN_PP {
            let req = Request {
                kind: MsgKind::DriverResult,
                session,
                config_id,
                controller_id: None,
                payload: Payload::DriverResults(merged.clone()),
            };
            match self.call(role, req).await {
                Ok(resp) if resp.status == Status::Success => {}
                Ok(resp) => {
                    return self
                        .abort(session, config_id, &contacted, Phase::DriverResult, role, resp.status)
                        .await;
                }
                Err(_) => {
                    return self
                        .abort(session, config_id, &contacted, Phase::DriverResult, role, Status::Failure)
                        .await;
                }
            }
        }

        // --- TransEnd: best-effort, success indicator ---
        self.best_effort_trans_end(session, config_id, &LP_THEN_PP).await;
        tree.clear();
        Outcome::Success
    }

    /// Issues `GlobalAbort` to every participant contacted since
    /// `VoteRequest`, then `TransEnd(aborted)` best-effort, and returns the
    /// classified outcome for the phase that actually failed.
    async fn abort(
        &self,
        session: u32,
        config_id: u32,
        contacted: &[Role],
        phase: Phase,
        failing_role: Role,
        status: Status,
    ) -> Outcome {
        if phase.requires_compensation_on_failure() {
            metrics::COMPENSATION_SWEEPS_TOTAL.inc();
            for role in contacted {
                let req = Request {
                    kind: MsgKind::GlobalAbort,
                    session,
                    config_id,
                    controller_id: None,
                    payload: Payload::None,
                };
                if let Err(e) = self.call(*role, req).await {
                    error!("GlobalAbort to {:?} failed during compensation: {}", role, e);
                }
            }
        }
        self.best_effort_trans_end(session, config_id, contacted).await;
        classify(phase, failing_role, status)
    }

    async fn best_effort_trans_end(&self, session: u32, config_id: u32, roles: &[Role]) {
        for role in roles {
            let req = Request {
                kind: MsgKind::TransEnd,
                session,
                config_id,
                controller_id: None,
                payload: Payload::None,
            };
            if let Err(e) = self.call(*role, req).await {
                warn!("TransEnd to {:?} failed (best-effort): {}", role, e);
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

/// Folds `incoming` into `merged`, appending a driver's reported errors to an
/// existing controller entry rather than discarding or overwriting it.
fn merge_driver_results(merged: &mut Vec<ControllerResult>, incoming: Vec<ControllerResult>) {
    for r in incoming {
        if let Some(existing) = merged.iter_mut().find(|m| m.controller_id == r.controller_id) {
            existing.errors.extend(r.errors);
            existing.response_code = r.response_code;
        } else {
            merged.push(r);
        }
    }
}
