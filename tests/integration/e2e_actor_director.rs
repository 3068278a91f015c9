//! End-to-end: a Director driving an Actor across the control plane.

use benchlink::{ActorRegistry, Director, ErrorObject, FullName, RpcRegistry};
use benchlink_test_utils::{connect_component, connect_component_with, start_coordinator};
use serde_json::{json, Map};
use std::sync::{Arc, Mutex};

/// A stand-in instrument: one setpoint, one read-only channel parameter,
/// and a `reset` action.
fn fake_instrument() -> (RpcRegistry, Arc<Mutex<f64>>) {
    let setpoint = Arc::new(Mutex::new(0.0_f64));
    let mut actor = ActorRegistry::new();

    let read = Arc::clone(&setpoint);
    let write = Arc::clone(&setpoint);
    actor.parameter(
        "setpoint",
        move || Ok(json!(*read.lock().unwrap())),
        move |value| {
            let target = value
                .as_f64()
                .ok_or_else(|| ErrorObject::invalid_params("setpoint must be a number"))?;
            *write.lock().unwrap() = target;
            Ok(())
        },
    );
    actor.read_only("ch_A.par1", || Ok(json!("ready")));

    let reset = Arc::clone(&setpoint);
    actor.action("reset", move |_args, _kwargs| {
        *reset.lock().unwrap() = 0.0;
        Ok(json!(null))
    });

    let mut registry = RpcRegistry::new();
    actor.install(&mut registry);
    (registry, setpoint)
}

#[tokio::test]
async fn director_round_trips_parameters_and_actions() {
    let coordinator = start_coordinator("N1").await;
    let (registry, setpoint) = fake_instrument();
    let _actor = connect_component_with(&coordinator, "psu", registry).await;
    let client = connect_component(&coordinator, "gui").await;

    let director = Director::new(client.handle.clone(), FullName::new("N1", "psu").unwrap());

    // Channel traversal reads alongside plain parameters.
    let values = director
        .get_parameters(&["setpoint", "ch_A.par1"])
        .await
        .expect("get_parameters");
    assert_eq!(values["setpoint"], json!(0.0));
    assert_eq!(values["ch_A.par1"], json!("ready"));

    director
        .set_parameter("setpoint", json!(3.25))
        .await
        .expect("set_parameter");
    assert_eq!(*setpoint.lock().unwrap(), 3.25);
    assert_eq!(director.get_parameter("setpoint").await.unwrap(), json!(3.25));

    let result = director
        .call_action("reset", vec![], Map::new())
        .await
        .expect("call_action");
    assert_eq!(result, json!(null));
    assert_eq!(*setpoint.lock().unwrap(), 0.0);
}

#[tokio::test]
async fn writes_to_unknown_parameters_are_rejected_remotely() {
    use benchlink::AskError;
    use benchlink_protocol::rpc::codes;

    let coordinator = start_coordinator("N1").await;
    let (registry, _) = fake_instrument();
    let _actor = connect_component_with(&coordinator, "psu", registry).await;
    let client = connect_component(&coordinator, "gui").await;

    let director = Director::new(client.handle.clone(), FullName::new("N1", "psu").unwrap());
    let outcome = director.set_parameter("bogus", json!(1)).await;
    match outcome {
        Err(AskError::Rpc(error)) => assert_eq!(error.code, codes::INVALID_PARAMS),
        other => panic!("expected invalid-params, got {other:?}"),
    }
}
