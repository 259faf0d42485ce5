//! End-to-end commit scenarios driven through a real `Dispatcher`, against
//! scripted in-process LP/PP/driver participants.

use std::time::Duration;

use unc_tc::core::lock::OperationClass;
use unc_tc::core::message::{MsgKind, ParticipantChannel, Status};
use unc_tc::core::operation::OperationKind;
use unc_tc::core::registry::Role;

use crate::support::{always_ok, delayed_ok, fails_at, Recorder, TestContext};

/// Scenario A: happy commit, two drivers succeed, no compensation issued.
#[tokio::test]
async fn happy_commit_succeeds_and_releases_the_lock() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![
            (Role::Lp, always_ok(&["of0"])),
            (Role::Pp, always_ok(&[])),
            (Role::DriverOpenflow, always_ok(&[])),
            (Role::DriverLegacy, always_ok(&[])),
        ],
    );

    let reply = ctx.send(7, OperationKind::Commit, None).await;

    assert_eq!(reply.result_code, 0);
    assert_eq!(ctx.state.lock_manager.holder_of(OperationClass::Config), None);
}

/// Scenario B: a driver fails during `DriverVoteGlobal`; the TC compensates
/// with `GlobalAbort` to every participant contacted since `VoteRequest` and
/// reports the classified failure.
#[tokio::test]
async fn driver_vote_failure_triggers_compensation() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![
            (Role::Lp, always_ok(&["of0"])),
            (Role::Pp, always_ok(&[])),
            (Role::DriverOpenflow, fails_at(MsgKind::DriverVoteGlobal, Status::Failure)),
            (Role::DriverLegacy, always_ok(&[])),
        ],
    );

    let reply = ctx.send(7, OperationKind::Commit, None).await;

    // ParticipantFailure result code, per errors.rs::result_code().
    assert_eq!(reply.result_code, 20);
    assert_eq!(ctx.state.lock_manager.holder_of(OperationClass::Config), None);
}

/// Invariant 4 (compensation completeness): when `DriverVoteGlobal` fails at
/// one driver, `GlobalAbort` reaches every participant contacted since
/// `VoteRequest` — LP, PP, and every registered driver, since the driver set
/// for this phase is fixed before any of them is called.
#[tokio::test]
async fn global_abort_reaches_every_participant_contacted_since_vote_request() {
    use std::sync::Arc;

    let lp = Arc::new(Recorder::default());
    let pp = Arc::new(Recorder::default());
    let good_driver = Arc::new(Recorder::default());

    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![
            (Role::Lp, ParticipantChannel::InProcess(lp.clone())),
            (Role::Pp, ParticipantChannel::InProcess(pp.clone())),
            (Role::DriverOpenflow, fails_at(MsgKind::DriverVoteGlobal, Status::Failure)),
            (Role::DriverLegacy, ParticipantChannel::InProcess(good_driver.clone())),
        ],
    );

    let reply = ctx.send(7, OperationKind::Commit, None).await;
    assert_eq!(reply.result_code, 20);

    assert!(lp.seen.lock().contains(&MsgKind::GlobalAbort));
    assert!(pp.seen.lock().contains(&MsgKind::GlobalAbort));
    assert!(good_driver.seen.lock().contains(&MsgKind::GlobalAbort));
}

/// Scenario E: a second session's commit attempt is denied `AlreadyConfiguring`
/// while the first is still in flight; no partial state change results.
#[tokio::test]
async fn concurrent_commit_is_denied_already_configuring() {
    let ctx = std::sync::Arc::new(TestContext::new(
        Duration::from_secs(5),
        vec![
            (Role::Lp, delayed_ok(&["of0"], Duration::from_millis(150))),
            (Role::Pp, always_ok(&[])),
        ],
    ));

    let first = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.send(7, OperationKind::Commit, None).await })
    };
    // Give the first commit time to acquire the Config hold before the
    // second one is dispatched.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = ctx.send(8, OperationKind::Commit, None).await;

    assert_eq!(second.result_code, 10); // AlreadyConfiguring, per errors.rs
    let first = first.await.unwrap();
    assert_eq!(first.result_code, 0);
    assert_eq!(ctx.state.lock_manager.holder_of(OperationClass::Config), None);
}
