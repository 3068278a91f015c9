// benchlink: Laboratory control messaging.
//
// Components exchange request/response messages through Coordinators that
// form a routed multi-namespace mesh, and broadcast measurement or log
// streams through the data-plane proxy.  This crate re-exports the pieces a
// participating process needs; the `coordinator` and `proxy` binaries live
// in their service crates.

pub use benchlink_core::{
    ActorRegistry, AskError, Component, ComponentConfig, ComponentHandle, ConnectError, Director,
    Publisher, RpcRegistry, SignInState, Subscriber,
};
pub use benchlink_protocol::{
    ControlMessage, ConversationId, DataMessage, ErrorObject, FullName, LogRecord, MessageType,
    COORDINATOR,
};
