// src/core/coordinator/mod.rs

//! The Commit/Audit Coordinator (CAC): the multi-phase engine that drives
//! LP, PP, and the registered drivers through the commit/audit phase table.

pub mod audit;
pub mod commit;
pub mod phase;

pub use phase::Phase;

use std::time::Duration;

use crate::core::errors::TcError;
use crate::core::keytree::{KeyNode, KeyTree};
use crate::core::message::{ControllerResult, MessageBuilder, MsgKind, Payload, Request, Response, Status};
use crate::core::metrics;
use crate::core::registry::{ParticipantRegistry, Role};

/// Outcome of a commit or audit run, returned to the Operation Dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    /// A classified `Failure` from one participant at one phase.
    Failed { phase: Phase, role: Role },
    /// A classified `Fatal` from one participant at one phase.
    Fatal { phase: Phase, role: Role },
}

impl From<Outcome> for Result<(), TcError> {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Success => Ok(()),
            Outcome::Failed { phase, role } => Err(TcError::ParticipantFailure { phase, role }),
            Outcome::Fatal { phase, role } => Err(TcError::ParticipantFatal { phase, role }),
        }
    }
}

/// Everything the coordinator needs to run a phase: the registry to resolve
/// roles to channels, MB to send requests, and the per-phase deadline.
pub struct Coordinator {
    pub registry: std::sync::Arc<ParticipantRegistry>,
    pub mb: MessageBuilder,
    pub phase_timeout: Duration,
}

impl Coordinator {
    pub fn new(registry: std::sync::Arc<ParticipantRegistry>, phase_timeout: Duration) -> Self {
        Self {
            registry,
            mb: MessageBuilder::new(),
            phase_timeout,
        }
    }

    /// Sends `req` to `role`, bounding the wait with the configured phase
    /// deadline. A deadline overrun is reported as `Status::Failure` with a
    /// synthetic "Timeout" classification the caller can match on.
    pub async fn call(&self, role: Role, req: Request) -> Result<Response, TcError> {
        let role_label = format!("{role:?}");
        let Some(channel) = self.registry.lookup(role) else {
            metrics::PARTICIPANT_UNREACHABLE_TOTAL
                .with_label_values(&[role_label.as_str()])
                .inc();
            return Err(TcError::ParticipantUnreachable(role));
        };
        match tokio::time::timeout(self.phase_timeout, self.mb.send(&channel, req)).await {
            Ok(Err(TcError::ParticipantUnreachable(_))) => {
                metrics::PARTICIPANT_UNREACHABLE_TOTAL
                    .with_label_values(&[role_label.as_str()])
                    .inc();
                Err(TcError::ParticipantUnreachable(role))
            }
            Ok(result) => result,
            Err(_) => Ok(Response::failure()),
        }
    }

    /// Resolves one driver's error key-list into `KeyNode`s and inserts them
    /// into `tree`, calling `ReadKeyValue` once per `err_pos`.
    pub async fn ingest_driver_errors(
        &self,
        tree: &mut KeyTree,
        session: u32,
        config_id: u32,
        result: &ControllerResult,
    ) -> Result<(), TcError> {
        for error_ref in &result.errors {
            for driver_role in self.registry.registered_drivers() {
                let req = Request {
                    kind: MsgKind::ReadKeyValue,
                    session,
                    config_id,
                    controller_id: Some(result.controller_id.clone()),
                    payload: Payload::ReadKeyValueRequest {
                        err_pos: error_ref.err_pos,
                        key_type: error_ref.key_type.clone(),
                    },
                };
                let resp = self.call(driver_role, req).await?;
                if let (Status::Success, Some(record)) = (resp.status, resp.key_value) {
                    let parent_key = record.parent_key.clone().unwrap_or_default();
                    tree.insert(KeyNode::new(record.key_type, record.key, parent_key, record.value))?;
                    break;
                }
            }
        }
        Ok(())
    }
}
