//! Component runtime.
//!
//! Owns one transport session on its own task: signs in, heartbeats, and
//! demultiplexes incoming traffic into awaited replies, local RPC dispatch,
//! and the unsolicited-message handler.  Everything else in the process
//! talks to the runtime through a cloneable [`ComponentHandle`].
//!
//! Sign-in lifecycle:
//!
//! ```text
//! UNSIGNED -> (send sign_in) -> SIGNING_IN -> (recv ack) -> SIGNED
//! SIGNED -> (sign_out or connection loss) -> UNSIGNED
//! SIGNING_IN -> (recv error, or timeout) -> FAILED
//! ```

use crate::correlation::{ReplyBuffer, ReplyError};
use crate::registry::RpcRegistry;
use crate::session::Session;
use crate::wire::WireError;
use benchlink_protocol::frame::{ControlMessage, ConversationId};
use benchlink_protocol::rpc::{self, methods, ErrorObject, Outcome, Request, Response, Rpc, RpcPayload};
use benchlink_protocol::FullName;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Send a keepalive after this much silence from the Coordinator.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Reconnect and re-sign-in after this much silence.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);
/// A directory or peer record without traffic for this long is stale.
pub const HEARTBEAT_STALE: Duration = Duration::from_secs(30);

/// Granularity of the cooperative poll loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Delay between reconnect attempts after a lost session.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Config and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ComponentConfig {
    /// Coordinator host.
    pub host: String,
    /// Coordinator control port.
    pub port: u16,
    /// Requested local name; the namespace is assigned at sign-in.
    pub name: String,
    pub sign_in_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl ComponentConfig {
    pub fn new(host: &str, port: u16, name: &str) -> Self {
        ComponentConfig {
            host: host.to_owned(),
            port,
            name: name.to_owned(),
            sign_in_timeout: Duration::from_secs(5),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInState {
    Unsigned,
    SigningIn,
    Signed,
    Failed,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("sign-in timed out")]
    Timeout,
    #[error("sign-in rejected: {} ({})", .0.message, .0.code)]
    Rejected(ErrorObject),
    #[error("sign-in protocol violation: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("timed out waiting for reply")]
    Timeout,
    #[error("remote error: {} ({})", .0.message, .0.code)]
    Rpc(ErrorObject),
    #[error("component runtime is gone")]
    Closed,
    #[error("protocol violation in reply: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Thread-safe entry point into a running Component: message submission plus
/// the correlation buffer.  The socket itself stays with the runtime task.
#[derive(Clone)]
pub struct ComponentHandle {
    outgoing: mpsc::Sender<ControlMessage>,
    replies: ReplyBuffer,
    full_name: Arc<Mutex<FullName>>,
}

impl ComponentHandle {
    /// The current full name (re-read after reconnects, since the
    /// Coordinator may reassign the namespace).
    pub fn full_name(&self) -> FullName {
        self.full_name.lock().expect("name lock poisoned").clone()
    }

    /// Queue a prebuilt message for transmission.
    pub async fn send(&self, message: ControlMessage) -> Result<(), AskError> {
        self.outgoing.send(message).await.map_err(|_| AskError::Closed)
    }

    /// Send `method` to `receiver` and wait for the correlated reply.
    pub async fn ask(
        &self,
        receiver: FullName,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, AskError> {
        let request = Request::new(method, params);
        let cid = ConversationId::generate();
        let slot = self.replies.expect(cid);
        let message = ControlMessage::json(receiver, self.full_name(), cid, &request);
        self.outgoing.send(message).await.map_err(|_| AskError::Closed)?;
        let reply = slot.await_reply(timeout).await.map_err(|e| match e {
            ReplyError::Timeout => AskError::Timeout,
            ReplyError::Closed => AskError::Closed,
        })?;
        single_result(&reply)
    }

    /// Ask the local namespace's Coordinator.
    pub async fn ask_coordinator(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, AskError> {
        self.ask(FullName::coordinator(""), method, params, timeout).await
    }

    /// Remove this Component from its Coordinator's directory.
    pub async fn sign_out(&self, timeout: Duration) -> Result<(), AskError> {
        self.ask_coordinator(methods::SIGN_OUT, None, timeout).await?;
        Ok(())
    }
}

/// Interpret a reply envelope as a single JSON-RPC response.
fn single_result(reply: &ControlMessage) -> Result<Value, AskError> {
    let payload = reply
        .json_payload()
        .ok_or_else(|| AskError::Protocol("reply carries no JSON payload".to_owned()))?;
    match rpc::parse(payload) {
        Ok(RpcPayload::Single(Rpc::Response(response))) => match response.outcome {
            Outcome::Success { result } => Ok(result),
            Outcome::Failure { error } => Err(AskError::Rpc(error)),
        },
        Ok(_) => Err(AskError::Protocol("expected a single response".to_owned())),
        Err(e) => Err(AskError::Protocol(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

type UnsolicitedHandler = Box<dyn Fn(ControlMessage) + Send>;

pub struct Component {
    session: Session,
    registry: RpcRegistry,
    replies: ReplyBuffer,
    outgoing_tx: mpsc::Sender<ControlMessage>,
    outgoing_rx: mpsc::Receiver<ControlMessage>,
    full_name: Arc<Mutex<FullName>>,
    state: SignInState,
    config: ComponentConfig,
    on_unsolicited: Option<UnsolicitedHandler>,
    malformed_logged: bool,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("full_name", &self.full_name)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Component {
    /// Connect to the Coordinator and complete the sign-in handshake.  The
    /// session (and with it the identity) is released on every failure path.
    pub async fn connect(
        config: ComponentConfig,
        registry: RpcRegistry,
    ) -> Result<Self, ConnectError> {
        let mut session = Session::connect(&config.host, config.port).await?;
        let assigned = sign_in(&mut session, &config.name, config.sign_in_timeout).await?;
        info!(name = %assigned, "component signed in");

        let (outgoing_tx, outgoing_rx) = mpsc::channel(64);
        Ok(Component {
            session,
            registry,
            replies: ReplyBuffer::new(),
            outgoing_tx,
            outgoing_rx,
            full_name: Arc::new(Mutex::new(assigned)),
            state: SignInState::Signed,
            config,
            on_unsolicited: None,
            malformed_logged: false,
        })
    }

    pub fn handle(&self) -> ComponentHandle {
        ComponentHandle {
            outgoing: self.outgoing_tx.clone(),
            replies: self.replies.clone(),
            full_name: Arc::clone(&self.full_name),
        }
    }

    pub fn full_name(&self) -> FullName {
        self.full_name.lock().expect("name lock poisoned").clone()
    }

    pub fn state(&self) -> SignInState {
        self.state
    }

    /// Setup-time registration; the registry is read-only once `run` starts.
    pub fn registry_mut(&mut self) -> &mut RpcRegistry {
        &mut self.registry
    }

    /// Replace the default log-and-drop handler for notifications and
    /// orphaned replies.
    pub fn on_unsolicited<F>(&mut self, handler: F)
    where
        F: Fn(ControlMessage) + Send + 'static,
    {
        self.on_unsolicited = Some(Box::new(handler));
    }

    /// Drive the dispatch loop.  Runs until every handle is dropped and the
    /// submission queue is drained.
    pub async fn run(mut self) {
        // Release the runtime's own submission sender so the queue actually
        // disconnects once external handles are gone.
        let (dummy_tx, _) = mpsc::channel(1);
        self.outgoing_tx = dummy_tx;

        let mut handles_gone = false;
        let mut last_traffic = Instant::now();
        let mut ping_in_flight = false;

        loop {
            // Drain submissions first so asks leave promptly.
            if !handles_gone {
                loop {
                    match self.outgoing_rx.try_recv() {
                        Ok(message) => {
                            if let Err(e) = self.session.send(&message).await {
                                warn!(error = %e, "send failed; reconnecting");
                                self.recover().await;
                                last_traffic = Instant::now();
                                ping_in_flight = false;
                            }
                        }
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            handles_gone = true;
                            break;
                        }
                    }
                }
            } else if self.replies.pending() == 0 {
                debug!("all handles dropped; component runtime stopping");
                return;
            }

            match self.session.poll(POLL_INTERVAL).await {
                Ok(Some(message)) => {
                    last_traffic = Instant::now();
                    ping_in_flight = false;
                    self.dispatch(message).await;
                }
                Ok(None) => {}
                Err(WireError::Malformed(e)) => {
                    if !self.malformed_logged {
                        warn!(error = %e, "malformed frame from coordinator dropped");
                        self.malformed_logged = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "session lost; reconnecting");
                    self.recover().await;
                    last_traffic = Instant::now();
                    ping_in_flight = false;
                }
            }

            let idle = last_traffic.elapsed();
            if idle >= self.config.heartbeat_timeout {
                warn!("heartbeat timeout; reconnecting");
                self.state = SignInState::Unsigned;
                self.recover().await;
                last_traffic = Instant::now();
                ping_in_flight = false;
            } else if idle >= self.config.heartbeat_interval && !ping_in_flight {
                ping_in_flight = true;
                let ping = ControlMessage::json(
                    FullName::coordinator(""),
                    self.full_name(),
                    ConversationId::generate(),
                    &Request::new(methods::PONG, None),
                );
                if self.session.send(&ping).await.is_err() {
                    self.state = SignInState::Unsigned;
                    self.recover().await;
                    last_traffic = Instant::now();
                    ping_in_flight = false;
                }
            }
        }
    }

    /// Reconnect and re-sign-in, retrying until it sticks.
    async fn recover(&mut self) {
        self.state = SignInState::Unsigned;
        loop {
            if let Err(e) = self.session.reconnect().await {
                warn!(error = %e, "reconnect failed; retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
            self.state = SignInState::SigningIn;
            match sign_in(&mut self.session, &self.config.name, self.config.sign_in_timeout).await
            {
                Ok(assigned) => {
                    info!(name = %assigned, "component re-signed in");
                    *self.full_name.lock().expect("name lock poisoned") = assigned;
                    self.state = SignInState::Signed;
                    self.malformed_logged = false;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "re-sign-in failed; retrying");
                    self.state = SignInState::Failed;
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn dispatch(&mut self, message: ControlMessage) {
        // Awaited reply?
        let Some(message) = self.replies.deliver(message) else {
            return;
        };

        let Some(payload) = message.json_payload() else {
            self.unsolicited(message);
            return;
        };

        let parsed = match rpc::parse(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, "unparseable payload; answering with parse error");
                let response = Response::error(Value::Null, ErrorObject::parse_error());
                self.respond(&message, &RpcPayload::Single(Rpc::Response(response)))
                    .await;
                return;
            }
        };

        if contains_request(&parsed) {
            if let Some(response) = self.registry.handle_payload(&parsed) {
                self.respond(&message, &response).await;
            }
        } else {
            // Orphan response or server-initiated response traffic.
            self.unsolicited(message);
        }
    }

    async fn respond(&mut self, request: &ControlMessage, payload: &RpcPayload) {
        if request.sender.is_empty() {
            debug!("request without sender; response dropped");
            return;
        }
        let reply = ControlMessage::json(
            request.sender.clone(),
            self.full_name(),
            request.conversation_id(),
            payload,
        );
        if let Err(e) = self.session.send(&reply).await {
            warn!(error = %e, "failed to send response");
        }
    }

    fn unsolicited(&self, message: ControlMessage) {
        match &self.on_unsolicited {
            Some(handler) => handler(message),
            None => debug!(
                sender = %message.sender,
                "unsolicited message dropped"
            ),
        }
    }
}

fn contains_request(payload: &RpcPayload) -> bool {
    match payload {
        RpcPayload::Single(Rpc::Request(_)) => true,
        RpcPayload::Single(Rpc::Response(_)) => false,
        RpcPayload::Batch(objects) => objects.iter().any(|o| matches!(o, Rpc::Request(_))),
    }
}

/// The sign-in handshake: send `sign_in`, wait for the correlated reply,
/// adopt the full name the Coordinator assigns.
async fn sign_in(
    session: &mut Session,
    name: &str,
    timeout: Duration,
) -> Result<FullName, ConnectError> {
    let sender = FullName::local_only(name)
        .map_err(|e| ConnectError::Protocol(e.to_string()))?;
    let cid = ConversationId::generate();
    let message = ControlMessage::json(
        FullName::coordinator(""),
        sender,
        cid,
        &Request::new(methods::SIGN_IN, None),
    );
    session.send(&message).await?;

    let deadline = Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero())
        else {
            return Err(ConnectError::Timeout);
        };
        let Some(reply) = session.poll(remaining).await? else {
            return Err(ConnectError::Timeout);
        };
        if reply.conversation_id() != cid {
            debug!("ignoring traffic that predates sign-in completion");
            continue;
        }
        let payload = reply
            .json_payload()
            .ok_or_else(|| ConnectError::Protocol("non-JSON sign-in reply".to_owned()))?;
        return match rpc::parse(payload) {
            Ok(RpcPayload::Single(Rpc::Response(response))) => match response.outcome {
                Outcome::Success { result } => {
                    let full = result
                        .get("full_name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            ConnectError::Protocol("sign-in result lacks full_name".to_owned())
                        })?;
                    FullName::from_bytes(full.as_bytes())
                        .map_err(|e| ConnectError::Protocol(e.to_string()))
                }
                Outcome::Failure { error } => Err(ConnectError::Rejected(error)),
            },
            Ok(_) => Err(ConnectError::Protocol("expected a single response".to_owned())),
            Err(e) => Err(ConnectError::Protocol(e.to_string())),
        };
    }
}
