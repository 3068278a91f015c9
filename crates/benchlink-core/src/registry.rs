//! Local RPC method registry.
//!
//! Populated during setup, read-only during dispatch.  Every handler runs to
//! completion on the runtime's own task; long-running work belongs on a
//! worker thread with its result returned via a follow-up message.

use benchlink_protocol::rpc::{self, ErrorObject, Request, Response, Rpc, RpcPayload};
use serde_json::Value;
use std::collections::HashMap;

pub type Handler = Box<dyn Fn(Option<Value>) -> Result<Value, ErrorObject> + Send + Sync>;

#[derive(Default)]
pub struct RpcRegistry {
    methods: HashMap<String, Handler>,
}

impl RpcRegistry {
    /// An empty registry with the `pong` keepalive preregistered.
    pub fn new() -> Self {
        let mut registry = RpcRegistry::default();
        registry.register(rpc::methods::PONG, |_| Ok(Value::Null));
        registry
    }

    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(Option<Value>) -> Result<Value, ErrorObject> + Send + Sync + 'static,
    {
        self.methods.insert(method.to_owned(), Box::new(handler));
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Run one request.  Notifications produce no response.
    pub fn handle(&self, request: &Request) -> Option<Response> {
        let id = request.id.clone()?;
        let outcome = match self.methods.get(&request.method) {
            None => Err(ErrorObject::method_not_found(&request.method)),
            Some(handler) => handler(request.params.clone()),
        };
        Some(match outcome {
            Ok(result) => Response::result(id, result),
            Err(error) => Response::error(id, error),
        })
    }

    /// Run every request of a parsed payload, preserving batch order.
    /// Returns `None` when nothing calls for a response (all notifications,
    /// or a response-only payload).
    pub fn handle_payload(&self, payload: &RpcPayload) -> Option<RpcPayload> {
        match payload {
            RpcPayload::Single(Rpc::Request(request)) => {
                self.handle(request).map(|r| RpcPayload::Single(Rpc::Response(r)))
            }
            RpcPayload::Single(Rpc::Response(_)) => None,
            RpcPayload::Batch(objects) => {
                let responses: Vec<Rpc> = objects
                    .iter()
                    .filter_map(|object| match object {
                        Rpc::Request(request) => self.handle(request).map(Rpc::Response),
                        Rpc::Response(_) => None,
                    })
                    .collect();
                if responses.is_empty() {
                    None
                } else {
                    Some(RpcPayload::Batch(responses))
                }
            }
        }
    }
}
