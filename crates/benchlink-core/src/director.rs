//! Director: client-side helper for driving a remote Actor.
//!
//! A pure client over [`ComponentHandle::ask`]; it emits exactly the three
//! contract calls (`get_parameters`, `set_parameters`, `call_action`).

use crate::component::{AskError, ComponentHandle};
use benchlink_protocol::rpc::methods;
use benchlink_protocol::FullName;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub struct Director {
    handle: ComponentHandle,
    actor: FullName,
    timeout: Duration,
}

impl Director {
    pub fn new(handle: ComponentHandle, actor: FullName) -> Self {
        Director {
            handle,
            actor,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn actor(&self) -> &FullName {
        &self.actor
    }

    pub async fn get_parameters(&self, names: &[&str]) -> Result<Map<String, Value>, AskError> {
        let result = self
            .handle
            .ask(
                self.actor.clone(),
                methods::GET_PARAMETERS,
                Some(json!({"parameters": names})),
                self.timeout,
            )
            .await?;
        match result {
            Value::Object(values) => Ok(values),
            other => Err(AskError::Protocol(format!(
                "expected parameter map, got {other}"
            ))),
        }
    }

    pub async fn get_parameter(&self, name: &str) -> Result<Value, AskError> {
        let mut values = self.get_parameters(&[name]).await?;
        values
            .remove(name)
            .ok_or_else(|| AskError::Protocol(format!("parameter {name} missing from reply")))
    }

    pub async fn set_parameters(&self, values: Map<String, Value>) -> Result<(), AskError> {
        self.handle
            .ask(
                self.actor.clone(),
                methods::SET_PARAMETERS,
                Some(json!({"parameters": values})),
                self.timeout,
            )
            .await?;
        Ok(())
    }

    pub async fn set_parameter(&self, name: &str, value: Value) -> Result<(), AskError> {
        let mut values = Map::new();
        values.insert(name.to_owned(), value);
        self.set_parameters(values).await
    }

    pub async fn call_action(
        &self,
        action: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, AskError> {
        self.handle
            .ask(
                self.actor.clone(),
                methods::CALL_ACTION,
                Some(json!({"action": action, "args": args, "kwargs": kwargs})),
                self.timeout,
            )
            .await
    }
}
