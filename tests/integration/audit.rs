//! End-to-end audit scenarios (audit is isomorphic to commit with an
//! `AuditStart`/`AuditEnd` bracket and scope narrowed to one controller) and
//! the per-phase timeout scenario.

use std::time::Duration;

use unc_tc::core::message::{MsgKind, Status};
use unc_tc::core::operation::OperationKind;
use unc_tc::core::registry::Role;

use crate::support::{always_ok, fails_at, slow_at, TestContext};

#[tokio::test]
async fn happy_audit_succeeds() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![(Role::Lp, always_ok(&[])), (Role::Pp, always_ok(&[]))],
    );

    let reply = ctx.send(3, OperationKind::Audit, Some("CTR1")).await;

    assert_eq!(reply.result_code, 0);
}

#[tokio::test]
async fn audit_rejects_missing_controller_id() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![(Role::Lp, always_ok(&[])), (Role::Pp, always_ok(&[]))],
    );

    let reply = ctx.send(3, OperationKind::Audit, None).await;

    // InvalidSyntax, per errors.rs::result_code().
    assert_eq!(reply.result_code, 2);
}

#[tokio::test]
async fn audit_vote_request_failure_aborts_and_classifies() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![
            (Role::Lp, always_ok(&[])),
            (Role::Pp, fails_at(MsgKind::VoteRequest, Status::Failure)),
        ],
    );

    let reply = ctx.send(3, OperationKind::Audit, Some("CTR1")).await;

    assert_eq!(reply.result_code, 20); // ParticipantFailure
}

/// Scenario F: LP replies within the phase deadline, PP does not. The
/// deadline overrun classifies the phase as a failure at PP, and the TC still
/// issues a best-effort `AuditEnd` to both.
#[tokio::test]
async fn vote_request_timeout_classifies_as_participant_failure_at_the_slow_role() {
    let ctx = TestContext::new(
        Duration::from_millis(50),
        vec![
            (Role::Lp, always_ok(&[])),
            (Role::Pp, slow_at(MsgKind::VoteRequest, Duration::from_millis(500))),
        ],
    );

    let reply = ctx.send(3, OperationKind::Audit, Some("CTR1")).await;

    assert_eq!(reply.result_code, 20); // ParticipantFailure(VoteRequest, Pp)
}
