//! End-to-end dispatch scenarios driven straight through [`domainctl::controller::ModelController`]:
//! a successful composite, a rollback, a partial merge, an in-flight cancellation, and proxy
//! forwarding to a second controller. Property tests at the bottom pin the add/remove
//! compensating-operation round trip across arbitrary subsystem names and values.

#[path = "common/mod.rs"]
mod common;

use domainctl::address::PathAddress;
use domainctl::controller::Envelope;
use domainctl::value::Value;
use proptest::prelude::*;

#[tokio::test]
async fn good_composite_commits_both_swaps() {
    common::init_tracing();
    let controller = common::controller();
    controller
        .execute(common::op(
            "write-attribute",
            &PathAddress::root(),
            &[("name", Value::from("enabled")), ("value", Value::Bool(false))],
        ))
        .await;

    let steps = vec![
        common::good_step(&PathAddress::root(), "enabled", 1),
        common::good_step(&PathAddress::root(), "other", 2),
    ];
    let envelope = controller.execute(common::composite_op(steps, true)).await;
    assert!(envelope.is_success(), "expected success, got {envelope:?}");

    let root = controller.tree().read(&PathAddress::root());
    assert_eq!(root.get("enabled"), &Value::from(1i64));
    assert_eq!(root.get("other"), &Value::from(2i64));
}

#[tokio::test]
async fn failure_with_rollback_discards_every_step() {
    common::init_tracing();
    let controller = common::controller();
    let steps = vec![
        common::good_step(&PathAddress::root(), "enabled", 99),
        common::op("bad", &PathAddress::root(), &[]),
    ];
    let envelope = controller.execute(common::composite_op(steps, true)).await;
    assert!(!envelope.is_success());

    let root = controller.tree().read(&PathAddress::root());
    assert_ne!(root.get("enabled"), &Value::from(99i64), "rollback must discard step one's write");

    let rendered = envelope.to_value();
    assert_eq!(rendered.get("outcome"), &Value::from("failed"));
    assert_eq!(rendered.get("rolled-back"), &Value::Bool(true));
}

#[tokio::test]
async fn failure_without_rollback_keeps_partial_progress() {
    common::init_tracing();
    let controller = common::controller();
    let steps = vec![
        common::good_step(&PathAddress::root(), "enabled", 77),
        common::op("bad", &PathAddress::root(), &[]),
    ];
    let envelope = controller.execute(common::composite_op(steps, false)).await;
    assert!(!envelope.is_success());

    let root = controller.tree().read(&PathAddress::root());
    assert_eq!(root.get("enabled"), &Value::from(77i64), "partial progress must survive");
}

#[tokio::test]
async fn in_flight_operation_can_be_cancelled() {
    common::init_tracing();
    let controller = common::controller();
    let handle = controller.execute_async(common::op("slow", &PathAddress::root(), &[]));
    tokio::task::yield_now().await;
    handle.cancel();
    let envelope = handle.join().await;
    assert!(matches!(envelope, Envelope::Cancelled), "expected Cancelled, got {envelope:?}");
}

#[tokio::test]
async fn proxy_forwards_to_backing_controller() {
    common::init_tracing();
    let anchor = common::subsystem("proxied");
    let (front, backing) = common::with_proxy(&anchor);

    let envelope = front
        .execute(common::op(
            "good",
            &anchor,
            &[("name", Value::from("enabled")), ("value", Value::Bool(true))],
        ))
        .await;
    assert!(envelope.is_success(), "expected success, got {envelope:?}");

    let backing_root = backing.tree().read(&PathAddress::root());
    assert_eq!(backing_root.get("enabled"), &Value::Bool(true));
    assert!(
        !front.tree().exists(&anchor),
        "a proxied address absorbs all writes into the backing controller, never the front tree"
    );
}

proptest! {
    /// `add` then its own compensating `remove` always leaves the address absent again,
    /// regardless of which subsystem or which scalar value was added.
    #[test]
    fn add_then_compensating_remove_restores_absence(
        subsystem in prop::sample::select(vec!["a", "b", "c"]),
        value in any::<i64>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let controller = common::controller();
            let address = common::subsystem(subsystem);

            let add = common::op("add", &address, &[("value", Value::from(value))]);

            let added = controller.execute(add).await;
            prop_assert!(added.is_success());
            prop_assert!(controller.tree().exists(&address));

            let compensating = added.to_value().get("compensating-operation").clone();
            prop_assert_eq!(compensating.get("operation"), &Value::from("remove"));

            let removed = controller.execute(compensating).await;
            prop_assert!(removed.is_success());
            prop_assert!(!controller.tree().exists(&address));
            Ok(())
        })?;
    }
}
