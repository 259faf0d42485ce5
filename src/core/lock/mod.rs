// src/core/lock/mod.rs

//! The Lock Manager (LM): arbitrates config/read sessions and global
//! operation exclusion.
//!
//! All operations are synchronous and block at most briefly on an in-memory
//! critical section — never on the network. The single `parking_lot::Mutex`
//! guarding `LockState` is always held for the duration of one call and
//! released before returning; callers that need durable persistence of the
//! new state call `TcState::persist_session` themselves after a successful
//! `acquire`/`release`, since the DAL write must happen before the change is
//! considered committed and the LM itself has no DAL handle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::TcError;

pub type SessionId = u32;
pub type ConfigId = u32;

/// The class of exclusion an operation requires. Precedence, highest first:
/// `Global > Config > Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationClass {
    Read,
    Config,
    Global,
}

/// Why `acquire` refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    AlreadyConfiguring,
    SystemBusy,
    InvalidTransition,
}

impl From<Denial> for TcError {
    fn from(d: Denial) -> Self {
        match d {
            Denial::AlreadyConfiguring => TcError::AlreadyConfiguring,
            Denial::SystemBusy => TcError::SystemBusy,
            Denial::InvalidTransition => {
                TcError::InvalidOperState("invalid lock state transition".into())
            }
        }
    }
}

/// The in-memory mirror of `(config_session?, read_sessions, global_op?)`.
#[derive(Debug, Default)]
struct LockState {
    config_session: Option<SessionId>,
    config_id: Option<ConfigId>,
    read_sessions: HashSet<SessionId>,
    global_op: Option<SessionId>,
}

/// A snapshot of lock ownership, used by `show-lock` and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockSnapshot {
    pub config_session: Option<SessionId>,
    pub config_id: Option<ConfigId>,
    pub read_sessions: Vec<SessionId>,
    pub global_op: Option<SessionId>,
}

pub struct LockManager {
    state: Mutex<LockState>,
    next_config_id: AtomicU64,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("state", &self.state.lock())
            .finish()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            // Config ids are monotone and never wrap; 0 is never issued so
            // that callers can treat 0 as "no config id".
            next_config_id: AtomicU64::new(1),
        }
    }

    /// Attempts to acquire exclusion of `op_class` on behalf of `session`.
    pub fn acquire(&self, session: SessionId, op_class: OperationClass) -> Result<(), Denial> {
        let mut st = self.state.lock();

        if st.global_op.is_some() {
            return Err(Denial::SystemBusy);
        }

        match op_class {
            OperationClass::Global => {
                if st.config_session.is_some() || !st.read_sessions.is_empty() {
                    return Err(Denial::SystemBusy);
                }
                st.global_op = Some(session);
            }
            OperationClass::Config => {
                if st.config_session.is_some() {
                    return Err(Denial::AlreadyConfiguring);
                }
                st.config_session = Some(session);
            }
            OperationClass::Read => {
                st.read_sessions.insert(session);
            }
        }
        Ok(())
    }

    /// Releases a previously granted exclusion. `config_id` is required and
    /// validated when releasing a `Config` hold.
    pub fn release(
        &self,
        session: SessionId,
        config_id: Option<ConfigId>,
        op_class: OperationClass,
    ) -> Result<(), TcError> {
        let mut st = self.state.lock();
        match op_class {
            OperationClass::Global => {
                if st.global_op != Some(session) {
                    return Err(TcError::InvalidSession);
                }
                st.global_op = None;
            }
            OperationClass::Config => {
                if st.config_session != Some(session) {
                    return Err(TcError::InvalidSession);
                }
                if let Some(want) = config_id
                    && st.config_id != Some(want)
                {
                    return Err(TcError::InvalidConfigId);
                }
                st.config_session = None;
                st.config_id = None;
            }
            OperationClass::Read => {
                if !st.read_sessions.remove(&session) {
                    return Err(TcError::InvalidSession);
                }
            }
        }
        Ok(())
    }

    /// Issues a fresh config id for `session`, which must currently hold
    /// `Config`. Monotone per process lifetime.
    pub fn new_config_id(&self, session: SessionId) -> Result<ConfigId, TcError> {
        let mut st = self.state.lock();
        if st.config_session != Some(session) {
            return Err(TcError::InvalidSession);
        }
        let id = self.next_config_id.fetch_add(1, Ordering::SeqCst) as ConfigId;
        st.config_id = Some(id);
        Ok(id)
    }

    pub fn holder_of(&self, op_class: OperationClass) -> Option<SessionId> {
        let st = self.state.lock();
        match op_class {
            OperationClass::Global => st.global_op,
            OperationClass::Config => st.config_session,
            OperationClass::Read => st.read_sessions.iter().next().copied(),
        }
    }

    /// `true` only if `session` currently holds Config under exactly this
    /// `config_id`. Used to authorize operations that carry a config id on
    /// the wire instead of trusting the caller's say-so.
    pub fn validate(&self, session: SessionId, config_id: ConfigId) -> bool {
        let st = self.state.lock();
        st.config_session == Some(session) && st.config_id == Some(config_id)
    }

    /// Stamps `config_id` onto a `Config` hold `session` already owns.
    /// Companion to `new_config_id` for operations that carry a
    /// client-asserted id on the wire rather than minting a fresh one.
    pub fn establish_config_id(&self, session: SessionId, config_id: ConfigId) -> Result<(), TcError> {
        let mut st = self.state.lock();
        if st.config_session != Some(session) {
            return Err(TcError::InvalidSession);
        }
        st.config_id = Some(config_id);
        Ok(())
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let st = self.state.lock();
        LockSnapshot {
            config_session: st.config_session,
            config_id: st.config_id,
            read_sessions: st.read_sessions.iter().copied().collect(),
            global_op: st.global_op,
        }
    }

    /// Forcibly releases any hold owned by `session`, regardless of class.
    /// Used by `abort-session` and by startup recovery of stale rows: the TC
    /// never auto-resumes the operation, only clears the lock.
    pub fn force_release(&self, session: SessionId) {
        let mut st = self.state.lock();
        if st.config_session == Some(session) {
            st.config_session = None;
            st.config_id = None;
        }
        if st.global_op == Some(session) {
            st.global_op = None;
        }
        st.read_sessions.remove(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_excludes_config() {
        let lm = LockManager::new();
        lm.acquire(1, OperationClass::Config).unwrap();
        assert_eq!(
            lm.acquire(2, OperationClass::Config),
            Err(Denial::AlreadyConfiguring)
        );
    }

    #[test]
    fn global_excludes_everything() {
        let lm = LockManager::new();
        lm.acquire(1, OperationClass::Read).unwrap();
        assert_eq!(
            lm.acquire(2, OperationClass::Global),
            Err(Denial::SystemBusy)
        );
    }

    #[test]
    fn read_excludes_only_global() {
        let lm = LockManager::new();
        lm.acquire(1, OperationClass::Read).unwrap();
        assert!(lm.acquire(2, OperationClass::Read).is_ok());
        assert!(lm.acquire(3, OperationClass::Config).is_ok());
    }

    #[test]
    fn config_id_monotone() {
        let lm = LockManager::new();
        lm.acquire(1, OperationClass::Config).unwrap();
        let id1 = lm.new_config_id(1).unwrap();
        lm.release(1, Some(id1), OperationClass::Config).unwrap();
        lm.acquire(2, OperationClass::Config).unwrap();
        let id2 = lm.new_config_id(2).unwrap();
        assert!(id2 > id1);
    }

    #[test]
    fn release_validates_config_id() {
        let lm = LockManager::new();
        lm.acquire(1, OperationClass::Config).unwrap();
        let id = lm.new_config_id(1).unwrap();
        assert_eq!(
            lm.release(1, Some(id + 1), OperationClass::Config),
            Err(TcError::InvalidConfigId)
        );
        assert!(lm.release(1, Some(id), OperationClass::Config).is_ok());
    }

    #[test]
    fn force_release_clears_any_class() {
        let lm = LockManager::new();
        lm.acquire(5, OperationClass::Global).unwrap();
        lm.force_release(5);
        assert_eq!(lm.holder_of(OperationClass::Global), None);
    }
}
