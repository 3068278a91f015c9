//! End-to-end: asks between Components of one namespace.
//!
//! Coordinator, `c1`, and `c2` run in-process; `c2` exposes `add(a, b)`.

use benchlink::FullName;
use benchlink_protocol::rpc::methods;
use benchlink_test_utils::{adder_registry, connect_component, connect_component_with, start_coordinator};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn local_ask_returns_the_registered_methods_result() {
    let coordinator = start_coordinator("N1").await;
    let _c2 = connect_component_with(&coordinator, "c2", adder_registry()).await;
    let c1 = connect_component(&coordinator, "c1").await;

    assert_eq!(c1.handle.full_name().to_string(), "N1.c1");

    let result = c1
        .handle
        .ask(
            FullName::new("N1", "c2").unwrap(),
            "add",
            Some(json!({"a": 2, "b": 3})),
            Duration::from_secs(1),
        )
        .await
        .expect("add should answer");
    assert_eq!(result, json!(5));
}

#[tokio::test]
async fn a_bare_local_receiver_resolves_within_the_namespace() {
    let coordinator = start_coordinator("N1").await;
    let _c2 = connect_component_with(&coordinator, "c2", adder_registry()).await;
    let c1 = connect_component(&coordinator, "c1").await;

    let result = c1
        .handle
        .ask(
            FullName::local_only("c2").unwrap(),
            "add",
            Some(json!({"a": 20, "b": 22})),
            Duration::from_secs(1),
        )
        .await
        .expect("namespace-less receiver should still resolve");
    assert_eq!(result, json!(42));
}

#[tokio::test]
async fn the_directory_tracks_sign_ins_minus_sign_outs() {
    let coordinator = start_coordinator("N1").await;
    let c1 = connect_component(&coordinator, "c1").await;
    let c2 = connect_component(&coordinator, "c2").await;

    let names = c1
        .handle
        .ask_coordinator(methods::SEND_LOCAL_COMPONENTS, None, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(names, json!(["c1", "c2"]));

    c2.handle
        .sign_out(Duration::from_secs(1))
        .await
        .expect("sign_out should be acknowledged");

    let names = c1
        .handle
        .ask_coordinator(methods::SEND_LOCAL_COMPONENTS, None, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(names, json!(["c1"]));
}

#[tokio::test]
async fn concurrent_asks_correlate_independently() {
    let coordinator = start_coordinator("N1").await;
    let _c2 = connect_component_with(&coordinator, "c2", adder_registry()).await;
    let c1 = connect_component(&coordinator, "c1").await;

    let receiver = FullName::new("N1", "c2").unwrap();
    let mut tasks = Vec::new();
    for i in 0..8i64 {
        let handle = c1.handle.clone();
        let receiver = receiver.clone();
        tasks.push(tokio::spawn(async move {
            let result = handle
                .ask(
                    receiver,
                    "add",
                    Some(json!({"a": i, "b": 100})),
                    Duration::from_secs(2),
                )
                .await
                .expect("add should answer");
            (i, result)
        }));
    }
    for task in tasks {
        let (i, result) = task.await.unwrap();
        assert_eq!(result, json!(i + 100), "reply for request {i} got swapped");
    }
}
