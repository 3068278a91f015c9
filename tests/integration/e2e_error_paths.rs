//! End-to-end: the contractual error codes on the unhappy paths.

use benchlink::{AskError, Component, ComponentConfig, ConnectError, FullName, RpcRegistry};
use benchlink_protocol::rpc::codes;
use benchlink_test_utils::{connect_component, start_coordinator};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn unknown_receiver_is_minus_32093() {
    let coordinator = start_coordinator("N1").await;
    let c1 = connect_component(&coordinator, "c1").await;

    let outcome = c1
        .handle
        .ask(
            FullName::new("N1", "ghost").unwrap(),
            "x",
            Some(json!({})),
            Duration::from_millis(500),
        )
        .await;
    match outcome {
        Err(AskError::Rpc(error)) => assert_eq!(error.code, codes::RECEIVER_UNKNOWN),
        other => panic!("expected receiver-unknown, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_namespace_is_minus_32092() {
    let coordinator = start_coordinator("N1").await;
    let c1 = connect_component(&coordinator, "c1").await;

    let outcome = c1
        .handle
        .ask(
            FullName::new("NX", "c9").unwrap(),
            "x",
            None,
            Duration::from_millis(500),
        )
        .await;
    match outcome {
        Err(AskError::Rpc(error)) => assert_eq!(error.code, codes::NODE_UNKNOWN),
        other => panic!("expected node-unknown, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_sign_in_is_minus_32091_and_the_first_survives() {
    let coordinator = start_coordinator("N1").await;
    let first = connect_component(&coordinator, "c1").await;

    let second = Component::connect(
        ComponentConfig::new("127.0.0.1", coordinator.port(), "c1"),
        RpcRegistry::new(),
    )
    .await;
    match second {
        Err(ConnectError::Rejected(error)) => assert_eq!(error.code, codes::DUPLICATE_NAME),
        other => panic!("expected duplicate-name rejection, got {other:?}"),
    }

    // The original session is untouched.
    let names = first
        .handle
        .ask_coordinator("send_local_components", None, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(names, json!(["c1"]));
}

#[tokio::test]
async fn unknown_method_on_the_coordinator_is_minus_32601() {
    let coordinator = start_coordinator("N1").await;
    let c1 = connect_component(&coordinator, "c1").await;

    let outcome = c1
        .handle
        .ask_coordinator("frobnicate", None, Duration::from_secs(1))
        .await;
    match outcome {
        Err(AskError::Rpc(error)) => assert_eq!(error.code, codes::METHOD_NOT_FOUND),
        other => panic!("expected method-not-found, got {other:?}"),
    }
}

#[tokio::test]
async fn asks_before_sign_in_are_minus_32090() {
    use benchlink_core::Session;
    use benchlink_protocol::frame::{ControlMessage, ConversationId};
    use benchlink_protocol::rpc::Request;

    let coordinator = start_coordinator("N1").await;
    let _c2 = connect_component(&coordinator, "c2").await;

    // Hand-rolled session that skips the sign-in handshake entirely.
    let mut session = Session::connect("127.0.0.1", coordinator.port())
        .await
        .unwrap();
    let cid = ConversationId::generate();
    let message = ControlMessage::json(
        FullName::new("N1", "c2").unwrap(),
        FullName::local_only("sneak").unwrap(),
        cid,
        &Request::new("add", Some(json!({"a": 1, "b": 1}))),
    );
    session.send(&message).await.unwrap();

    let reply = session
        .poll(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("the coordinator answers unsigned traffic with an error");
    assert_eq!(reply.conversation_id(), cid);
    let payload: serde_json::Value =
        serde_json::from_slice(reply.json_payload().unwrap()).unwrap();
    assert_eq!(payload["error"]["code"], json!(codes::NOT_SIGNED_IN));
}
