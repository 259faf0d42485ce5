// src/core/operation/mod.rs

//! The `Operation` record and the wire-level parsing that turns an inbound
//! `Frame` into one. Each operation kind collapses what would otherwise be a
//! class hierarchy (one subclass per request type) into a tagged variant plus
//! a static descriptor table.

use serde::{Deserialize, Serialize};

use crate::core::errors::TcError;
use crate::core::lock::{ConfigId, OperationClass, SessionId};
use crate::core::wire::Frame;

/// The full set of RPCs the TC exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Commit,
    Audit,
    Save,
    ClearStartup,
    AbortCandidate,
    Setup,
    SetupComplete,
    Read,
    ReadSibling,
    ReadSiblingBegin,
    ReadSiblingCount,
    ReadNext,
    ReadBulk,
}

impl OperationKind {
    /// `u32` tag used on the wire's `op_type` field. Stable across releases.
    pub fn wire_tag(self) -> u32 {
        match self {
            OperationKind::Commit => 1,
            OperationKind::Audit => 2,
            OperationKind::Save => 3,
            OperationKind::ClearStartup => 4,
            OperationKind::AbortCandidate => 5,
            OperationKind::Setup => 6,
            OperationKind::SetupComplete => 7,
            OperationKind::Read => 8,
            OperationKind::ReadSibling => 9,
            OperationKind::ReadSiblingBegin => 10,
            OperationKind::ReadSiblingCount => 11,
            OperationKind::ReadNext => 12,
            OperationKind::ReadBulk => 13,
        }
    }

    pub fn from_wire_tag(tag: u32) -> Result<Self, TcError> {
        Ok(match tag {
            1 => OperationKind::Commit,
            2 => OperationKind::Audit,
            3 => OperationKind::Save,
            4 => OperationKind::ClearStartup,
            5 => OperationKind::AbortCandidate,
            6 => OperationKind::Setup,
            7 => OperationKind::SetupComplete,
            8 => OperationKind::Read,
            9 => OperationKind::ReadSibling,
            10 => OperationKind::ReadSiblingBegin,
            11 => OperationKind::ReadSiblingCount,
            12 => OperationKind::ReadNext,
            13 => OperationKind::ReadBulk,
            other => return Err(TcError::BadRequest(format!("unknown op_type {other}"))),
        })
    }

    /// The exclusion class this operation requires from the Lock Manager.
    pub fn operation_class(self) -> OperationClass {
        match self {
            OperationKind::Commit
            | OperationKind::Save
            | OperationKind::ClearStartup
            | OperationKind::AbortCandidate
            | OperationKind::Setup
            | OperationKind::SetupComplete => OperationClass::Config,
            OperationKind::Audit => OperationClass::Global,
            OperationKind::Read
            | OperationKind::ReadSibling
            | OperationKind::ReadSiblingBegin
            | OperationKind::ReadSiblingCount
            | OperationKind::ReadNext
            | OperationKind::ReadBulk => OperationClass::Read,
        }
    }

    /// `true` for the two operations CAC drives through the phase state
    /// machine; everything else dispatches straight to MB or a read handler.
    pub fn drives_coordinator(self) -> bool {
        matches!(self, OperationKind::Commit | OperationKind::Audit)
    }
}

/// The wire's data-type enumeration: which configuration view an operation
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Candidate,
    Running,
    Startup,
    State,
    Import,
}

impl DataType {
    pub fn from_wire_tag(tag: u32) -> Result<Self, TcError> {
        Ok(match tag {
            0 => DataType::Candidate,
            1 => DataType::Running,
            2 => DataType::Startup,
            3 => DataType::State,
            4 => DataType::Import,
            other => return Err(TcError::InvalidOption(format!("unknown data_type {other}"))),
        })
    }
}

/// A fully parsed, validated inbound request. Lives from the moment the
/// Dispatcher parses it until it replies.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub session: SessionId,
    pub config_id: Option<ConfigId>,
    pub data_type: DataType,
    /// For `Audit`, the single controller the audit is scoped to.
    pub controller_id: Option<String>,
    pub payload: Vec<u8>,
}

impl Operation {
    /// Parses a `Frame` into an `Operation`, performing the Dispatcher's
    /// steps 1-3 (parse / validate operation type / validate parameters).
    pub fn parse(frame: &Frame) -> Result<Operation, TcError> {
        if frame.session_id == 0 {
            return Err(TcError::BadRequest("session_id must be non-zero".into()));
        }
        let kind = OperationKind::from_wire_tag(frame.op_type)?;
        let data_type = DataType::from_wire_tag(frame.data_type)?;

        let config_id = if frame.config_id == 0 {
            None
        } else {
            Some(frame.config_id)
        };

        if matches!(
            kind,
            OperationKind::Save | OperationKind::ClearStartup | OperationKind::AbortCandidate
        ) && config_id.is_none()
        {
            return Err(TcError::InvalidSyntax(format!(
                "{kind:?} requires a non-zero config_id"
            )));
        }

        let controller_id = if kind == OperationKind::Audit {
            if frame.payload.is_empty() {
                return Err(TcError::InvalidSyntax(
                    "Audit requires a controller_id payload".into(),
                ));
            }
            Some(String::from_utf8_lossy(&frame.payload).into_owned())
        } else {
            None
        };

        Ok(Operation {
            kind,
            session: frame.session_id,
            config_id,
            data_type,
            controller_id,
            payload: frame.payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(op_type: u32, session_id: u32, config_id: u32) -> Frame {
        let mut f = Frame::new(session_id, config_id, op_type);
        f.data_type = 0;
        f
    }

    #[test]
    fn rejects_zero_session() {
        let f = frame(OperationKind::Commit.wire_tag(), 0, 1);
        assert!(matches!(Operation::parse(&f), Err(TcError::BadRequest(_))));
    }

    #[test]
    fn rejects_unknown_op_type() {
        let f = frame(99, 1, 1);
        assert!(Operation::parse(&f).is_err());
    }

    #[test]
    fn save_requires_config_id() {
        let f = frame(OperationKind::Save.wire_tag(), 1, 0);
        assert!(matches!(
            Operation::parse(&f),
            Err(TcError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn audit_requires_controller_payload() {
        let f = frame(OperationKind::Audit.wire_tag(), 1, 0);
        assert!(matches!(
            Operation::parse(&f),
            Err(TcError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn commit_maps_to_config_class() {
        assert_eq!(
            OperationKind::Commit.operation_class(),
            OperationClass::Config
        );
        assert_eq!(OperationKind::Audit.operation_class(), OperationClass::Global);
        assert_eq!(OperationKind::Read.operation_class(), OperationClass::Read);
    }
}
