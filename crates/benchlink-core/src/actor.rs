//! Actor parameter registry.
//!
//! An Actor is a Component whose RPC surface reflects a controlled object,
//! e.g. an instrument driver.  The registry maps parameter paths to getter/
//! setter closures and action names to callables, then installs the three
//! contract methods (`get_parameters`, `set_parameters`, `call_action`) on a
//! Component's RPC registry.
//!
//! A path containing `.` denotes channel traversal: `ch_A.par1` is parameter
//! `par1` of channel `ch_A`.  Registration uses the full dotted path as the
//! key, so traversal is plain lookup.

use crate::registry::RpcRegistry;
use benchlink_protocol::rpc::{methods, ErrorObject};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub type Getter = Box<dyn Fn() -> Result<Value, ErrorObject> + Send + Sync>;
pub type Setter = Box<dyn Fn(Value) -> Result<(), ErrorObject> + Send + Sync>;
pub type Action =
    Box<dyn Fn(Vec<Value>, Map<String, Value>) -> Result<Value, ErrorObject> + Send + Sync>;

#[derive(Default)]
pub struct ActorRegistry {
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
    actions: HashMap<String, Action>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a readable and writable parameter under `path`.
    pub fn parameter<G, S>(&mut self, path: &str, get: G, set: S)
    where
        G: Fn() -> Result<Value, ErrorObject> + Send + Sync + 'static,
        S: Fn(Value) -> Result<(), ErrorObject> + Send + Sync + 'static,
    {
        self.getters.insert(path.to_owned(), Box::new(get));
        self.setters.insert(path.to_owned(), Box::new(set));
    }

    /// Expose a read-only parameter under `path`.
    pub fn read_only<G>(&mut self, path: &str, get: G)
    where
        G: Fn() -> Result<Value, ErrorObject> + Send + Sync + 'static,
    {
        self.getters.insert(path.to_owned(), Box::new(get));
    }

    pub fn action<A>(&mut self, name: &str, action: A)
    where
        A: Fn(Vec<Value>, Map<String, Value>) -> Result<Value, ErrorObject> + Send + Sync + 'static,
    {
        self.actions.insert(name.to_owned(), Box::new(action));
    }

    pub fn get_parameters(&self, names: &[&str]) -> Result<Map<String, Value>, ErrorObject> {
        let mut out = Map::with_capacity(names.len());
        for name in names {
            let getter = self
                .getters
                .get(*name)
                .ok_or_else(|| ErrorObject::invalid_params(&format!("unknown parameter {name}")))?;
            out.insert((*name).to_owned(), getter()?);
        }
        Ok(out)
    }

    pub fn set_parameters(&self, values: &Map<String, Value>) -> Result<(), ErrorObject> {
        for (name, value) in values {
            let setter = self.setters.get(name).ok_or_else(|| {
                ErrorObject::invalid_params(&format!("parameter {name} is not writable"))
            })?;
            setter(value.clone())?;
        }
        Ok(())
    }

    pub fn call_action(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, ErrorObject> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| ErrorObject::invalid_params(&format!("unknown action {name}")))?;
        action(args, kwargs)
    }

    /// Wire the three contract methods onto `rpc`.
    pub fn install(self, rpc: &mut RpcRegistry) {
        let shared = Arc::new(self);

        let actor = Arc::clone(&shared);
        rpc.register(methods::GET_PARAMETERS, move |params| {
            let names = params
                .as_ref()
                .and_then(|p| p.get("parameters"))
                .and_then(Value::as_array)
                .ok_or_else(|| ErrorObject::invalid_params("parameters: [string] required"))?;
            let names: Vec<&str> = names
                .iter()
                .map(|v| {
                    v.as_str()
                        .ok_or_else(|| ErrorObject::invalid_params("parameter names are strings"))
                })
                .collect::<Result<_, _>>()?;
            actor.get_parameters(&names).map(Value::Object)
        });

        let actor = Arc::clone(&shared);
        rpc.register(methods::SET_PARAMETERS, move |params| {
            let values = params
                .as_ref()
                .and_then(|p| p.get("parameters"))
                .and_then(Value::as_object)
                .ok_or_else(|| ErrorObject::invalid_params("parameters: {name: value} required"))?;
            actor.set_parameters(values)?;
            Ok(Value::Null)
        });

        let actor = shared;
        rpc.register(methods::CALL_ACTION, move |params| {
            let params = params
                .ok_or_else(|| ErrorObject::invalid_params("action: string required"))?;
            let name = params
                .get("action")
                .and_then(Value::as_str)
                .ok_or_else(|| ErrorObject::invalid_params("action: string required"))?;
            let args = params
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let kwargs = params
                .get("kwargs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            actor.call_action(name, args, kwargs)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchlink_protocol::rpc::{codes, Request};
    use serde_json::json;
    use std::sync::Mutex;

    fn instrument_registry() -> (ActorRegistry, Arc<Mutex<f64>>) {
        let current = Arc::new(Mutex::new(0.25));
        let mut actor = ActorRegistry::new();

        let read = Arc::clone(&current);
        let write = Arc::clone(&current);
        actor.parameter(
            "current",
            move || Ok(json!(*read.lock().unwrap())),
            move |value| {
                let target = value
                    .as_f64()
                    .ok_or_else(|| ErrorObject::invalid_params("current must be a number"))?;
                *write.lock().unwrap() = target;
                Ok(())
            },
        );
        actor.read_only("ch_A.par1", || Ok(json!(42)));
        actor.action("ramp", |args, kwargs| {
            Ok(json!({
                "args": args,
                "rate": kwargs.get("rate").cloned().unwrap_or(Value::Null),
            }))
        });
        (actor, current)
    }

    #[test]
    fn get_and_set_round_trip_including_channel_paths() {
        let (actor, current) = instrument_registry();

        let values = actor.get_parameters(&["current", "ch_A.par1"]).unwrap();
        assert_eq!(values["current"], json!(0.25));
        assert_eq!(values["ch_A.par1"], json!(42));

        let mut update = Map::new();
        update.insert("current".to_owned(), json!(1.5));
        actor.set_parameters(&update).unwrap();
        assert_eq!(*current.lock().unwrap(), 1.5);
    }

    #[test]
    fn unknown_parameter_and_read_only_writes_are_invalid_params() {
        let (actor, _) = instrument_registry();
        assert_eq!(
            actor.get_parameters(&["missing"]).unwrap_err().code,
            codes::INVALID_PARAMS
        );

        let mut update = Map::new();
        update.insert("ch_A.par1".to_owned(), json!(7));
        assert_eq!(
            actor.set_parameters(&update).unwrap_err().code,
            codes::INVALID_PARAMS
        );
    }

    #[test]
    fn installed_contract_methods_dispatch_via_the_rpc_registry() {
        let (actor, current) = instrument_registry();
        let mut rpc = RpcRegistry::new();
        actor.install(&mut rpc);

        let get = Request::new(
            methods::GET_PARAMETERS,
            Some(json!({"parameters": ["current"]})),
        );
        let response = rpc.handle(&get).unwrap();
        assert_eq!(response.success(), Some(&json!({"current": 0.25})));

        let set = Request::new(
            methods::SET_PARAMETERS,
            Some(json!({"parameters": {"current": 2.0}})),
        );
        assert!(rpc.handle(&set).unwrap().failure().is_none());
        assert_eq!(*current.lock().unwrap(), 2.0);

        let call = Request::new(
            methods::CALL_ACTION,
            Some(json!({"action": "ramp", "args": [3.0], "kwargs": {"rate": 0.1}})),
        );
        let response = rpc.handle(&call).unwrap();
        assert_eq!(
            response.success(),
            Some(&json!({"args": [3.0], "rate": 0.1}))
        );
    }

    #[test]
    fn call_action_without_action_name_is_invalid_params() {
        let (actor, _) = instrument_registry();
        let mut rpc = RpcRegistry::new();
        actor.install(&mut rpc);

        let call = Request::new(methods::CALL_ACTION, Some(json!({"args": []})));
        let response = rpc.handle(&call).unwrap();
        assert_eq!(response.failure().unwrap().code, codes::INVALID_PARAMS);
    }
}
