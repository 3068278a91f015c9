//! JSON-RPC 2.0 content layer.
//!
//! Strict subset: single objects and batch arrays.  A request has `method`
//! and an `id`; a notification omits `id`; a response has `id` and exactly
//! one of `result` or `error`.  The reserved error codes below are
//! contractual and must round-trip bit-exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Reserved error codes
// ---------------------------------------------------------------------------

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_ERROR: i64 = -32000;
    pub const NOT_SIGNED_IN: i64 = -32090;
    pub const DUPLICATE_NAME: i64 = -32091;
    pub const NODE_UNKNOWN: i64 = -32092;
    pub const RECEIVER_UNKNOWN: i64 = -32093;
}

// ---------------------------------------------------------------------------
// Method vocabulary
// ---------------------------------------------------------------------------

/// Method names of the Coordinator admin surface and the Actor contract.
pub mod methods {
    pub const SIGN_IN: &str = "sign_in";
    pub const SIGN_OUT: &str = "sign_out";
    pub const PONG: &str = "pong";
    pub const SEND_LOCAL_COMPONENTS: &str = "send_local_components";
    pub const SEND_NODES: &str = "send_nodes";
    pub const ADD_NODES: &str = "add_nodes";
    pub const COORDINATOR_SIGN_IN: &str = "coordinator_sign_in";
    pub const COORDINATOR_SIGN_OUT: &str = "coordinator_sign_out";
    pub const SET_NODES: &str = "set_nodes";
    pub const SET_LOCAL_COMPONENTS: &str = "set_local_components";

    pub const GET_PARAMETERS: &str = "get_parameters";
    pub const SET_PARAMETERS: &str = "set_parameters";
    pub const CALL_ACTION: &str = "call_action";
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A request or, when `id` is absent, a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Request {
    /// A request with a fresh numeric id.
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Request {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id: Some(Value::from(NEXT_ID.fetch_add(1, Ordering::Relaxed))),
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Request {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error member of a response: `{code, message, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: &str) -> Self {
        ErrorObject {
            code,
            message: message.to_owned(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found")
            .with_data(Value::from(method))
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self::new(codes::INVALID_PARAMS, "Invalid params").with_data(Value::from(detail))
    }

    pub fn internal_error(detail: &str) -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error").with_data(Value::from(detail))
    }

    pub fn server_error(detail: &str) -> Self {
        Self::new(codes::SERVER_ERROR, "Server error").with_data(Value::from(detail))
    }

    pub fn not_signed_in() -> Self {
        Self::new(codes::NOT_SIGNED_IN, "Not signed in")
    }

    pub fn duplicate_name(name: &str) -> Self {
        Self::new(codes::DUPLICATE_NAME, "Duplicate name").with_data(Value::from(name))
    }

    pub fn node_unknown(namespace: &str) -> Self {
        Self::new(codes::NODE_UNKNOWN, "Node unknown").with_data(Value::from(namespace))
    }

    pub fn receiver_unknown(receiver: &str) -> Self {
        Self::new(codes::RECEIVER_UNKNOWN, "Receiver unknown").with_data(Value::from(receiver))
    }
}

/// Exactly one of `result` or `error`; enforced by deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Success { result: Value },
    Failure { error: ErrorObject },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub id: Value,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            outcome: Outcome::Success { result },
            id,
        }
    }

    pub fn error(id: Value, error: ErrorObject) -> Self {
        Response {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            outcome: Outcome::Failure { error },
            id,
        }
    }

    pub fn success(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { result } => Some(result),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(error),
        }
    }
}

/// One JSON-RPC object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rpc {
    Request(Request),
    Response(Response),
}

impl Rpc {
    fn version(&self) -> &str {
        match self {
            Rpc::Request(r) => &r.jsonrpc,
            Rpc::Response(r) => &r.jsonrpc,
        }
    }
}

/// A single object or a batch array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcPayload {
    Single(Rpc),
    Batch(Vec<Rpc>),
}

// ---------------------------------------------------------------------------
// Parse / serialize
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported jsonrpc version {0:?}")]
    Version(String),
}

/// Parse a payload frame, enforcing the `jsonrpc: "2.0"` marker on every
/// object in the payload.
pub fn parse(bytes: &[u8]) -> Result<RpcPayload, RpcError> {
    let payload: RpcPayload = serde_json::from_slice(bytes)?;
    let objects: Box<dyn Iterator<Item = &Rpc>> = match &payload {
        RpcPayload::Single(rpc) => Box::new(std::iter::once(rpc)),
        RpcPayload::Batch(batch) => Box::new(batch.iter()),
    };
    for rpc in objects {
        if rpc.version() != JSONRPC_VERSION {
            return Err(RpcError::Version(rpc.version().to_owned()));
        }
    }
    Ok(payload)
}

pub fn to_vec(payload: &RpcPayload) -> Vec<u8> {
    serde_json::to_vec(payload).unwrap_or_else(|_| b"null".to_vec())
}
