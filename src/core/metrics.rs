// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the Transaction Coordinator.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the process lifetime.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramVec, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
};

lazy_static! {
    // --- Lock Manager gauges ---
    /// Whether a Config session currently holds exclusion (1) or not (0).
    pub static ref CONFIG_LOCK_HELD: Gauge =
        register_gauge!("tc_config_lock_held", "1 if a Config session currently holds exclusion.").unwrap();
    /// The number of currently active Read sessions.
    pub static ref ACTIVE_READ_SESSIONS: Gauge =
        register_gauge!("tc_active_read_sessions", "Number of Read sessions currently holding exclusion.").unwrap();
    /// Whether a Global operation (e.g. Audit) currently holds exclusion.
    pub static ref GLOBAL_LOCK_HELD: Gauge =
        register_gauge!("tc_global_lock_held", "1 if a Global operation currently holds exclusion.").unwrap();

    // --- Counters ---
    /// The total number of requests the Operation Dispatcher has accepted.
    pub static ref REQUESTS_TOTAL: CounterVec =
        register_counter_vec!("tc_requests_total", "Total requests dispatched, labeled by operation kind.", &["op"]).unwrap();
    /// The total number of exclusion denials, labeled by the reason.
    pub static ref EXCLUSION_DENIALS_TOTAL: CounterVec =
        register_counter_vec!("tc_exclusion_denials_total", "Total exclusion denials, labeled by reason.", &["reason"]).unwrap();
    /// The total number of commit runs that completed with each outcome kind.
    pub static ref COMMIT_OUTCOMES_TOTAL: CounterVec =
        register_counter_vec!("tc_commit_outcomes_total", "Total commit runs, labeled by outcome.", &["outcome"]).unwrap();
    /// The total number of audit runs that completed with each outcome kind.
    pub static ref AUDIT_OUTCOMES_TOTAL: CounterVec =
        register_counter_vec!("tc_audit_outcomes_total", "Total audit runs, labeled by outcome.", &["outcome"]).unwrap();
    /// The total number of GlobalAbort compensation sweeps issued.
    pub static ref COMPENSATION_SWEEPS_TOTAL: Counter =
        register_counter!("tc_compensation_sweeps_total", "Total GlobalAbort compensation sweeps issued.").unwrap();
    /// The total number of participant-unreachable classifications.
    pub static ref PARTICIPANT_UNREACHABLE_TOTAL: CounterVec =
        register_counter_vec!("tc_participant_unreachable_total", "Total participant-unreachable events, labeled by role.", &["role"]).unwrap();

    // --- Histograms ---
    /// Wall-clock latency of one phase RPC, labeled by phase name.
    pub static ref PHASE_LATENCY_SECONDS: HistogramVec =
        register_histogram_vec!("tc_phase_latency_seconds", "Latency of one phase RPC in seconds, labeled by phase.", &["phase"]).unwrap();
    /// Wall-clock latency of a full commit or audit run.
    pub static ref TRANSACTION_LATENCY_SECONDS: Histogram =
        register_histogram!("tc_transaction_latency_seconds", "Latency of a full commit/audit run in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
