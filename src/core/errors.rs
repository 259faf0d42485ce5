// src/core/errors.rs

//! The error taxonomy for the Transaction Coordinator.
//!
//! Every error the TC can produce belongs to one of five kinds: Request,
//! State, Participant, Storage, or Generic. Participant errors additionally
//! carry the phase and role at
//! which they occurred so the coordinator's compensation path and the
//! caller's diagnostics can agree on where things went wrong.

use crate::core::coordinator::phase::Phase;
use crate::core::registry::Role;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum TcError {
    // --- Request errors: malformed or invalid inbound RPC ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid syntax: {0}")]
    InvalidSyntax(String),

    #[error("invalid key type: {0}")]
    InvalidKeyType(String),

    #[error("invalid controller id: {0}")]
    InvalidControllerId(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    // --- State errors: exclusion / session / oper-state violations ---
    #[error("a configuration session is already active")]
    AlreadyConfiguring,

    #[error("invalid config id")]
    InvalidConfigId,

    #[error("invalid session")]
    InvalidSession,

    #[error("invalid operation state: {0}")]
    InvalidOperState(String),

    #[error("system busy, a global operation is in progress")]
    SystemBusy,

    // --- Participant errors: classified failures during commit/audit ---
    #[error("participant failure in phase {phase:?} at {role:?}")]
    ParticipantFailure { phase: Phase, role: Role },

    #[error("participant fatal error in phase {phase:?} at {role:?}")]
    ParticipantFatal { phase: Phase, role: Role },

    #[error("participant unreachable: {0:?}")]
    ParticipantUnreachable(Role),

    // --- Storage errors: lock-metadata persistence ---
    #[error("storage access error: {0}")]
    DbAccess(String),

    #[error("storage record not found")]
    DbNotFound,

    #[error("storage update error: {0}")]
    DbUpdate(String),

    // --- Generic ---
    #[error("internal error: {0}")]
    Generic(String),

    #[error("operation not allowed for this data type")]
    NotAllowedForThisDataType,

    // --- Transport-level, not part of the taxonomy proper but needed to
    //     round-trip a non-Clone std::io::Error the way the reference
    //     stack wraps its own IO errors. ---
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("incomplete frame")]
    IncompleteFrame,
}

impl Clone for TcError {
    fn clone(&self) -> Self {
        match self {
            Self::BadRequest(s) => Self::BadRequest(s.clone()),
            Self::InvalidSyntax(s) => Self::InvalidSyntax(s.clone()),
            Self::InvalidKeyType(s) => Self::InvalidKeyType(s.clone()),
            Self::InvalidControllerId(s) => Self::InvalidControllerId(s.clone()),
            Self::InvalidOption(s) => Self::InvalidOption(s.clone()),
            Self::AlreadyConfiguring => Self::AlreadyConfiguring,
            Self::InvalidConfigId => Self::InvalidConfigId,
            Self::InvalidSession => Self::InvalidSession,
            Self::InvalidOperState(s) => Self::InvalidOperState(s.clone()),
            Self::SystemBusy => Self::SystemBusy,
            Self::ParticipantFailure { phase, role } => Self::ParticipantFailure {
                phase: *phase,
                role: *role,
            },
            Self::ParticipantFatal { phase, role } => Self::ParticipantFatal {
                phase: *phase,
                role: *role,
            },
            Self::ParticipantUnreachable(r) => Self::ParticipantUnreachable(*r),
            Self::DbAccess(s) => Self::DbAccess(s.clone()),
            Self::DbNotFound => Self::DbNotFound,
            Self::DbUpdate(s) => Self::DbUpdate(s.clone()),
            Self::Generic(s) => Self::Generic(s.clone()),
            Self::NotAllowedForThisDataType => Self::NotAllowedForThisDataType,
            Self::Io(e) => Self::Io(Arc::clone(e)),
            Self::Protocol(s) => Self::Protocol(s.clone()),
            Self::IncompleteFrame => Self::IncompleteFrame,
        }
    }
}

impl PartialEq for TcError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::BadRequest(a), Self::BadRequest(b)) => a == b,
            (Self::InvalidSyntax(a), Self::InvalidSyntax(b)) => a == b,
            (Self::InvalidKeyType(a), Self::InvalidKeyType(b)) => a == b,
            (Self::InvalidControllerId(a), Self::InvalidControllerId(b)) => a == b,
            (Self::InvalidOption(a), Self::InvalidOption(b)) => a == b,
            (Self::AlreadyConfiguring, Self::AlreadyConfiguring) => true,
            (Self::InvalidConfigId, Self::InvalidConfigId) => true,
            (Self::InvalidSession, Self::InvalidSession) => true,
            (Self::InvalidOperState(a), Self::InvalidOperState(b)) => a == b,
            (Self::SystemBusy, Self::SystemBusy) => true,
            (
                Self::ParticipantFailure {
                    phase: p1,
                    role: r1,
                },
                Self::ParticipantFailure {
                    phase: p2,
                    role: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (
                Self::ParticipantFatal {
                    phase: p1,
                    role: r1,
                },
                Self::ParticipantFatal {
                    phase: p2,
                    role: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (Self::ParticipantUnreachable(a), Self::ParticipantUnreachable(b)) => a == b,
            (Self::DbAccess(a), Self::DbAccess(b)) => a == b,
            (Self::DbNotFound, Self::DbNotFound) => true,
            (Self::DbUpdate(a), Self::DbUpdate(b)) => a == b,
            (Self::Generic(a), Self::Generic(b)) => a == b,
            (Self::NotAllowedForThisDataType, Self::NotAllowedForThisDataType) => true,
            (Self::Io(a), Self::Io(b)) => a.to_string() == b.to_string(),
            (Self::Protocol(a), Self::Protocol(b)) => a == b,
            (Self::IncompleteFrame, Self::IncompleteFrame) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for TcError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for TcError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for TcError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl TcError {
    /// The stable numeric result code sent on the wire for a given error,
    /// filling the IPC frame's `result_code:u32` field. `0` is reserved for
    /// `Success` and is never produced here.
    pub fn result_code(&self) -> u32 {
        match self {
            Self::BadRequest(_) => 1,
            Self::InvalidSyntax(_) => 2,
            Self::InvalidKeyType(_) => 3,
            Self::InvalidControllerId(_) => 4,
            Self::InvalidOption(_) => 5,
            Self::AlreadyConfiguring => 10,
            Self::InvalidConfigId => 11,
            Self::InvalidSession => 12,
            Self::InvalidOperState(_) => 13,
            Self::SystemBusy => 14,
            Self::ParticipantFailure { .. } => 20,
            Self::ParticipantFatal { .. } => 21,
            Self::ParticipantUnreachable(_) => 22,
            Self::DbAccess(_) => 30,
            Self::DbNotFound => 31,
            Self::DbUpdate(_) => 32,
            Self::Generic(_) => 90,
            Self::NotAllowedForThisDataType => 91,
            Self::Io(_) => 92,
            Self::Protocol(_) => 93,
            Self::IncompleteFrame => 94,
        }
    }
}
