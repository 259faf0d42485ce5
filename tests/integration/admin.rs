//! Control-CLI-style admin ops (`status`, `abort-session`, `show-lock`) and
//! the direct-dispatch, non-coordinator-driven operations (`Save`, `Setup`,
//! ...), all exercised straight through `Dispatcher::dispatch` the same way
//! `tc-ctl`/a participant would hit them over the wire.

use std::time::Duration;

use unc_tc::core::dispatcher::{OP_ABORT_SESSION, OP_SHOW_LOCK, OP_STATUS};
use unc_tc::core::lock::OperationClass;
use unc_tc::core::operation::OperationKind;
use unc_tc::core::registry::Role;
use unc_tc::core::wire::Frame;

use crate::support::{always_ok, TestContext};

#[tokio::test]
async fn status_and_show_lock_diverge_after_a_commit() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![(Role::Lp, always_ok(&[])), (Role::Pp, always_ok(&[]))],
    );

    ctx.send(1, OperationKind::Commit, None).await;

    let status_reply = ctx.dispatcher.dispatch(Frame::new(0, 0, OP_STATUS)).await;
    let status: serde_json::Value = serde_json::from_slice(&status_reply.payload).unwrap();
    assert_eq!(status["total_commits"], 1);
    assert_eq!(status["exclusion_denials"], 0);

    let lock_reply = ctx.dispatcher.dispatch(Frame::new(0, 0, OP_SHOW_LOCK)).await;
    let lock: serde_json::Value = serde_json::from_slice(&lock_reply.payload).unwrap();
    assert!(lock.get("config_session").is_some());
    assert!(lock.get("total_commits").is_none());
}

#[tokio::test]
async fn abort_session_releases_a_stuck_config_hold() {
    let ctx = TestContext::new(Duration::from_secs(5), vec![]);

    ctx.state.lock_manager.acquire(9, OperationClass::Config).unwrap();
    assert_eq!(
        ctx.state.lock_manager.holder_of(OperationClass::Config),
        Some(9)
    );

    let reply = ctx.dispatcher.dispatch(Frame::new(9, 0, OP_ABORT_SESSION)).await;

    assert_eq!(reply.result_code, 0);
    assert_eq!(ctx.state.lock_manager.holder_of(OperationClass::Config), None);
}

#[tokio::test]
async fn save_is_dispatched_directly_without_the_coordinator() {
    let ctx = TestContext::new(
        Duration::from_secs(5),
        vec![(Role::Lp, always_ok(&[])), (Role::Pp, always_ok(&[]))],
    );

    // Save requires a non-zero config_id (Operation::parse validates this)
    // but acquires and releases its own Config hold for the duration of the
    // single call, same as every other Config-class operation.
    let mut frame = Frame::new(4, 42, OperationKind::Save.wire_tag());
    frame.data_type = 0;
    let reply = ctx.dispatcher.dispatch(frame).await;

    assert_eq!(reply.result_code, 0);
    assert_eq!(ctx.state.lock_manager.holder_of(OperationClass::Config), None);
}
