// src/core/registry/mod.rs

//! The Participant Registry (PR): a process-wide mapping from logical module
//! role to a call target.
//!
//! The TC never owns the LP/PP/driver objects themselves — it owns only
//! role-to-channel entries, published by each module at init and un-published
//! at teardown. This sidesteps the cyclic-ownership problem (modules know
//! about the TC; the TC would otherwise need to know about modules) by making
//! the registry the sole point of indirection.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::errors::TcError;
use crate::core::message::ParticipantChannel;

/// The closed set of logical roles a participant can register under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Lp,
    Pp,
    DriverOpenflow,
    DriverOverlay,
    DriverLegacy,
}

impl Role {
    /// All driver roles, in the stable order the coordinator fans out to them.
    pub const DRIVERS: [Role; 3] = [Role::DriverOpenflow, Role::DriverOverlay, Role::DriverLegacy];

    pub fn is_driver(self) -> bool {
        matches!(
            self,
            Role::DriverOpenflow | Role::DriverOverlay | Role::DriverLegacy
        )
    }
}

/// The driver-identifier enumeration LP returns during driver-id resolution.
/// The TC keeps this static table so driver names are never hard-coded
/// anywhere else in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverId {
    Openflow,
    Overlay,
    Legacy,
}

impl DriverId {
    pub fn role(self) -> Role {
        match self {
            DriverId::Openflow => Role::DriverOpenflow,
            DriverId::Overlay => Role::DriverOverlay,
            DriverId::Legacy => Role::DriverLegacy,
        }
    }
}

/// A process-wide singleton-per-role mapping from `Role` to an RPC channel.
///
/// Read-mostly: entries change only at module start/teardown, so a `DashMap`
/// (rather than a full `RwLock<HashMap<_>>`) keeps lookups lock-free in the
/// steady state while still letting register/unregister mutate safely.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    entries: DashMap<Role, Arc<ParticipantChannel>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Registers `channel` under `role`. Fails if the role is already
    /// occupied — at most one participant may hold a role at a time.
    pub fn register(&self, role: Role, channel: ParticipantChannel) -> Result<(), TcError> {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(role) {
            Entry::Occupied(_) => Err(TcError::Generic(format!(
                "role {role:?} is already registered"
            ))),
            Entry::Vacant(v) => {
                v.insert(Arc::new(channel));
                Ok(())
            }
        }
    }

    pub fn unregister(&self, role: Role) {
        self.entries.remove(&role);
    }

    pub fn lookup(&self, role: Role) -> Option<Arc<ParticipantChannel>> {
        self.entries.get(&role).map(|r| r.clone())
    }

    /// Every driver role currently registered, in the stable order defined by
    /// `Role::DRIVERS`, so fan-out order is deterministic across runs.
    pub fn registered_drivers(&self) -> Vec<Role> {
        Role::DRIVERS
            .into_iter()
            .filter(|r| self.entries.contains_key(r))
            .collect()
    }

    pub fn is_registered(&self, role: Role) -> bool {
        self.entries.contains_key(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::ParticipantChannel;

    #[test]
    fn register_then_lookup() {
        let pr = ParticipantRegistry::new();
        pr.register(Role::Lp, ParticipantChannel::new_test()).unwrap();
        assert!(pr.lookup(Role::Lp).is_some());
        assert!(pr.lookup(Role::Pp).is_none());
    }

    #[test]
    fn double_register_fails() {
        let pr = ParticipantRegistry::new();
        pr.register(Role::Pp, ParticipantChannel::new_test()).unwrap();
        assert!(pr.register(Role::Pp, ParticipantChannel::new_test()).is_err());
    }

    #[test]
    fn unregister_frees_role() {
        let pr = ParticipantRegistry::new();
        pr.register(Role::Lp, ParticipantChannel::new_test()).unwrap();
        pr.unregister(Role::Lp);
        assert!(pr.lookup(Role::Lp).is_none());
    }

    #[test]
    fn registered_drivers_is_stable_order() {
        let pr = ParticipantRegistry::new();
        pr.register(Role::DriverLegacy, ParticipantChannel::new_test()).unwrap();
        pr.register(Role::DriverOpenflow, ParticipantChannel::new_test()).unwrap();
        assert_eq!(
            pr.registered_drivers(),
            vec![Role::DriverOpenflow, Role::DriverLegacy]
        );
    }
}
