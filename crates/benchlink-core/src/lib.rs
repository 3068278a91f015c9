// benchlink-core: Shared Component machinery.
//
// Everything a process needs to participate in the control and data planes:
// frame-bundle wire I/O, the transport session, the correlation buffer, the
// RPC method registry, the Component runtime, data-plane publisher and
// subscriber, and the Actor/Director contract helpers.

pub mod actor;
pub mod component;
pub mod correlation;
pub mod data;
pub mod director;
pub mod registry;
pub mod session;
pub mod wire;

pub use actor::ActorRegistry;
pub use component::{
    AskError, Component, ComponentConfig, ComponentHandle, ConnectError, SignInState,
    HEARTBEAT_INTERVAL, HEARTBEAT_STALE, HEARTBEAT_TIMEOUT,
};
pub use correlation::{ReplyBuffer, ReplyError, ReplySlot};
pub use data::{Publisher, Subscriber};
pub use director::Director;
pub use registry::RpcRegistry;
pub use session::Session;
pub use wire::WireError;
