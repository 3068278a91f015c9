// benchlink-test-utils: Shared fixtures for the integration suites.
//
// Starts in-process Coordinators and Proxies on ephemeral ports and spawns
// scripted Components, so end-to-end scenarios never depend on well-known
// port numbers being free.

use benchlink_core::{Component, ComponentConfig, ComponentHandle, RpcRegistry};
use benchlink_protocol::rpc::ErrorObject;
use coordinator::{Coordinator, CoordinatorConfig};
use proxy::{Proxy, ProxyConfig};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Coordinator fixture
// ---------------------------------------------------------------------------

/// An in-process Coordinator on an ephemeral port.  Aborted on drop.
pub struct TestCoordinator {
    pub addr: SocketAddr,
    pub namespace: String,
    task: JoinHandle<()>,
}

impl TestCoordinator {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `host:port` in the form peers and `add_nodes` expect.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn start_coordinator(namespace: &str) -> TestCoordinator {
    let coordinator = Coordinator::bind(CoordinatorConfig {
        bind_host: "127.0.0.1".to_owned(),
        port: 0,
        namespace: Some(namespace.to_owned()),
        // Fast sweeps keep peer dials and stale purges snappy under test.
        sweep_interval: Duration::from_millis(200),
        ..CoordinatorConfig::default()
    })
    .await
    .expect("bind test coordinator");
    let addr = coordinator.local_addr();
    let task = tokio::spawn(async move {
        let _ = coordinator.run().await;
    });
    TestCoordinator {
        addr,
        namespace: namespace.to_owned(),
        task,
    }
}

// ---------------------------------------------------------------------------
// Proxy fixture
// ---------------------------------------------------------------------------

/// An in-process data-plane proxy on ephemeral ports.  Aborted on drop.
pub struct TestProxy {
    pub ingress: SocketAddr,
    pub egress: SocketAddr,
    task: JoinHandle<()>,
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn start_proxy() -> TestProxy {
    let proxy = Proxy::bind(ProxyConfig {
        bind_host: "127.0.0.1".to_owned(),
        ingress_port: 0,
        egress_port: 0,
    })
    .await
    .expect("bind test proxy");
    let ingress = proxy.ingress_addr();
    let egress = proxy.egress_addr();
    let task = tokio::spawn(async move {
        let _ = proxy.run().await;
    });
    TestProxy {
        ingress,
        egress,
        task,
    }
}

// ---------------------------------------------------------------------------
// Component fixtures
// ---------------------------------------------------------------------------

/// A signed-in Component driven by its own runtime task.  Aborted on drop.
pub struct TestComponent {
    pub handle: ComponentHandle,
    task: JoinHandle<()>,
}

impl Drop for TestComponent {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn connect_component(coordinator: &TestCoordinator, name: &str) -> TestComponent {
    connect_component_with(coordinator, name, RpcRegistry::new()).await
}

pub async fn connect_component_with(
    coordinator: &TestCoordinator,
    name: &str,
    registry: RpcRegistry,
) -> TestComponent {
    let component = Component::connect(
        ComponentConfig::new("127.0.0.1", coordinator.port(), name),
        registry,
    )
    .await
    .expect("component sign-in");
    let handle = component.handle();
    let task = tokio::spawn(component.run());
    TestComponent { handle, task }
}

/// A registry exposing `add(a, b) -> a + b`.
pub fn adder_registry() -> RpcRegistry {
    let mut registry = RpcRegistry::new();
    registry.register("add", |params| {
        let params = params.ok_or_else(|| ErrorObject::invalid_params("a and b required"))?;
        let a = params["a"]
            .as_i64()
            .ok_or_else(|| ErrorObject::invalid_params("a must be an integer"))?;
        let b = params["b"]
            .as_i64()
            .ok_or_else(|| ErrorObject::invalid_params("b must be an integer"))?;
        Ok(json!(a + b))
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchlink_protocol::rpc::methods;

    #[tokio::test]
    async fn coordinator_fixture_signs_components_in() {
        let coordinator = start_coordinator("TST").await;
        let component = connect_component(&coordinator, "probe").await;
        assert_eq!(component.handle.full_name().to_string(), "TST.probe");

        let names = component
            .handle
            .ask_coordinator(methods::SEND_LOCAL_COMPONENTS, None, Duration::from_secs(1))
            .await
            .expect("send_local_components");
        assert_eq!(names, json!(["probe"]));
    }

    #[tokio::test]
    async fn proxy_fixture_reports_distinct_ports() {
        let proxy = start_proxy().await;
        assert_ne!(proxy.ingress.port(), 0);
        assert_ne!(proxy.egress.port(), 0);
        assert_ne!(proxy.ingress.port(), proxy.egress.port());
    }
}
