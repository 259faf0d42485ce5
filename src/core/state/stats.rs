// src/core/state/stats.rs

//! Session/config metrics and the latency monitor: counts and timings the
//! Dispatcher records on every request, independent of the Prometheus export
//! in `crate::core::metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds all state and logic related to TC-wide statistics and monitoring.
#[derive(Debug)]
pub struct StatsState {
    total_requests: AtomicU64,
    total_commits: AtomicU64,
    total_audits: AtomicU64,
    commit_failures: AtomicU64,
    audit_failures: AtomicU64,
    exclusion_denials: AtomicU64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsState {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_commits: AtomicU64::new(0),
            total_audits: AtomicU64::new(0),
            commit_failures: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            exclusion_denials: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self, succeeded: bool) {
        self.total_commits.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.commit_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audit(&self, succeeded: bool) {
        self.total_audits.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exclusion_denial(&self) {
        self.exclusion_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_commits(&self) -> u64 {
        self.total_commits.load(Ordering::Relaxed)
    }

    pub fn total_audits(&self) -> u64 {
        self.total_audits.load(Ordering::Relaxed)
    }

    pub fn commit_failures(&self) -> u64 {
        self.commit_failures.load(Ordering::Relaxed)
    }

    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub fn exclusion_denials(&self) -> u64 {
        self.exclusion_denials.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_independently() {
        let s = StatsState::new();
        s.record_commit(true);
        s.record_commit(false);
        s.record_audit(true);
        s.record_exclusion_denial();
        assert_eq!(s.total_commits(), 2);
        assert_eq!(s.commit_failures(), 1);
        assert_eq!(s.total_audits(), 1);
        assert_eq!(s.audit_failures(), 0);
        assert_eq!(s.exclusion_denials(), 1);
    }
}
