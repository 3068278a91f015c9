// benchlink-protocol: Wire protocol types and serialization.
//
// Pure data layer: full-name addressing, the multi-frame control and data
// envelopes, the frame-bundle codec, and the JSON-RPC 2.0 content layer with
// the frozen reserved error codes.  No sockets, no async.

pub mod frame;
pub mod log_record;
pub mod name;
pub mod rpc;

pub use frame::{
    ControlHeader, ControlMessage, ConversationId, DataHeader, DataMessage, MalformedFrame,
    MessageType,
};
pub use log_record::LogRecord;
pub use name::{FullName, NameError, COORDINATOR};
pub use rpc::{ErrorObject, Request, Response, Rpc, RpcPayload};

/// Wire protocol version carried in the first control frame.
pub const PROTOCOL_VERSION: u8 = 0;

// ---------------------------------------------------------------------------
// Default ports
// ---------------------------------------------------------------------------

/// Control-plane Coordinator listener.
pub const CONTROL_PORT: u16 = 12300;
/// Data-plane proxy: publishers connect here.
pub const DATA_INGRESS_PORT: u16 = 11100;
/// Data-plane proxy: subscribers connect here.
pub const DATA_EGRESS_PORT: u16 = 11099;
/// Log relay proxy: publishers connect here.
pub const LOG_INGRESS_PORT: u16 = 11098;
/// Log relay proxy: subscribers connect here.
pub const LOG_EGRESS_PORT: u16 = 11097;
