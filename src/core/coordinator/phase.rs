// src/core/coordinator/phase.rs

//! The ordered `Phase` enumeration shared by the commit and audit state
//! machines.
//!
//! `Phase` is the authoritative state variable for the Commit/Audit
//! Coordinator: the coordinator never holds side state that isn't derivable
//! from `(Operation, Phase, collected driver results)`.

use serde::{Deserialize, Serialize};

/// A coordinator-level sub-state within a commit or audit run.
///
/// Variants are declared in the order the commit state machine visits them;
/// `Ord` reflects that ordering so callers can ask "has phase P already
/// happened" with a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    TransStart,
    VoteRequest,
    GlobalCommit,
    DriverVoteGlobal,
    DriverResult,
    TransEnd,
    /// The compensating sweep issued when a phase at or after `VoteRequest`
    /// fails; not part of the "happy path" ordering but still a phase the
    /// participant state machine can observe.
    GlobalAbort,
}

impl Phase {
    /// `true` when a failure in this phase requires a compensating
    /// `GlobalAbort` sweep before `TransEnd(aborted)`. `TransStart` itself is
    /// the one exception: a failure that early means no participant has
    /// voted yet, so the run goes straight to `TransEnd(aborted)` with no
    /// `GlobalAbort` step.
    pub fn requires_compensation_on_failure(self) -> bool {
        self > Phase::TransStart
    }
}

/// The outer bracket an audit run adds around the same phase chassis used by
/// commit, plus the commit phases themselves scoped to a single controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditPhase {
    AuditStart,
    Inner(Phase),
    AuditEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_matches_spec_table() {
        assert!(Phase::TransStart < Phase::VoteRequest);
        assert!(Phase::VoteRequest < Phase::GlobalCommit);
        assert!(Phase::GlobalCommit < Phase::DriverVoteGlobal);
        assert!(Phase::DriverVoteGlobal < Phase::DriverResult);
        assert!(Phase::DriverResult < Phase::TransEnd);
    }

    #[test]
    fn trans_start_failures_skip_compensation() {
        assert!(!Phase::TransStart.requires_compensation_on_failure());
        assert!(Phase::VoteRequest.requires_compensation_on_failure());
    }
}
