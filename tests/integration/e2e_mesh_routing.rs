//! End-to-end: peer federation and cross-namespace routing.
//!
//! Two Coordinators are joined with `add_nodes`; directory replication and
//! the dial-back link must then carry asks both ways.

use benchlink::{AskError, FullName};
use benchlink_protocol::rpc::methods;
use benchlink_test_utils::{adder_registry, connect_component, connect_component_with, start_coordinator, TestComponent};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Poll `probe` until its coordinator's node map contains `namespace`.
async fn wait_for_node(probe: &TestComponent, namespace: &str) -> Value {
    let deadline = Instant::now() + Duration::from_secs(1);
    loop {
        let nodes = probe
            .handle
            .ask_coordinator(methods::SEND_NODES, None, Duration::from_secs(1))
            .await
            .expect("send_nodes should answer");
        if nodes.get(namespace).is_some() {
            return nodes;
        }
        assert!(
            Instant::now() < deadline,
            "{namespace} not replicated in time; nodes = {nodes}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn add_nodes_replicates_across_the_mesh() {
    let n1 = start_coordinator("N1").await;
    let n2 = start_coordinator("N2").await;

    let admin = connect_component(&n1, "admin").await;
    admin
        .handle
        .ask_coordinator(
            methods::ADD_NODES,
            Some(json!({"N2": n2.address()})),
            Duration::from_secs(1),
        )
        .await
        .expect("add_nodes should be acknowledged");

    // Within a second the peer side knows about N1 too.
    let probe = connect_component(&n2, "probe").await;
    let nodes = wait_for_node(&probe, "N1").await;
    assert!(nodes.get("N2").is_some(), "a node map includes its own namespace");
}

#[tokio::test]
async fn cross_namespace_ask_routes_through_the_mesh() {
    let n1 = start_coordinator("N1").await;
    let n2 = start_coordinator("N2").await;
    let _c2 = connect_component_with(&n2, "c2", adder_registry()).await;
    let c1 = connect_component(&n1, "c1").await;

    c1.handle
        .ask_coordinator(
            methods::ADD_NODES,
            Some(json!({"N2": n2.address()})),
            Duration::from_secs(1),
        )
        .await
        .expect("add_nodes should be acknowledged");

    // The return path needs N2's dial-back link; retry until the mesh is
    // fully bidirectional.
    let receiver = FullName::new("N2", "c2").unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match c1
            .handle
            .ask(
                receiver.clone(),
                "add",
                Some(json!({"a": 1, "b": 1})),
                Duration::from_secs(1),
            )
            .await
        {
            Ok(result) => {
                assert_eq!(result, json!(2));
                break;
            }
            Err(AskError::Timeout | AskError::Rpc(_)) if Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => panic!("cross-namespace ask failed: {e}"),
        }
    }
}

#[tokio::test]
async fn transitive_advertisement_closes_the_mesh() {
    let n1 = start_coordinator("N1").await;
    let n2 = start_coordinator("N2").await;
    let n3 = start_coordinator("N3").await;

    // Join N1-N2 and N1-N3 explicitly; N2-N3 must appear transitively via
    // set_nodes replication.
    let admin = connect_component(&n1, "admin").await;
    admin
        .handle
        .ask_coordinator(
            methods::ADD_NODES,
            Some(json!({"N2": n2.address(), "N3": n3.address()})),
            Duration::from_secs(1),
        )
        .await
        .expect("add_nodes should be acknowledged");

    let probe = connect_component(&n2, "probe").await;
    wait_for_node(&probe, "N3").await;
}

#[tokio::test]
async fn admin_asks_reach_a_remote_coordinator() {
    let n1 = start_coordinator("N1").await;
    let n2 = start_coordinator("N2").await;
    let _worker = connect_component(&n2, "worker").await;

    let admin = connect_component(&n1, "admin").await;
    admin
        .handle
        .ask_coordinator(
            methods::ADD_NODES,
            Some(json!({"N2": n2.address()})),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    // Ask N2's coordinator for its local components, across namespaces.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match admin
            .handle
            .ask(
                FullName::coordinator("N2"),
                methods::SEND_LOCAL_COMPONENTS,
                None,
                Duration::from_secs(1),
            )
            .await
        {
            Ok(names) => {
                assert_eq!(names, json!(["worker"]));
                break;
            }
            Err(AskError::Timeout | AskError::Rpc(_)) if Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => panic!("cross-namespace admin ask failed: {e}"),
        }
    }
}
