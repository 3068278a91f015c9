//! Control-plane Coordinator.
//!
//! One Coordinator hosts one namespace: it keeps the directory of locally
//! signed-in Components, federates with peer Coordinators into a mesh, and
//! routes every inbound frame by full name.  Socket identities never cross a
//! hop; the `sender` frame carries all semantic addressing.
//!
//! The listener hands each connection an identity and a pair of reader/
//! writer tasks; everything else happens on one owner task that consumes an
//! event bus, so the directory and peer table need no locks.  Peer RPC the
//! Coordinator itself issues is correlated through a pending table keyed by
//! conversation id; the owner task never awaits a reply.

pub mod directory;
pub mod peers;

mod admin;

use crate::directory::Directory;
use crate::peers::PeerTable;
use benchlink_core::wire::{read_frames, write_frames, WireError};
use benchlink_core::HEARTBEAT_STALE;
use benchlink_protocol::frame::{ControlMessage, ConversationId, MalformedFrame};
use benchlink_protocol::rpc::{self, methods, ErrorObject, Outcome, Request, Response, Rpc, RpcPayload};
use benchlink_protocol::{FullName, CONTROL_PORT};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Connection identity: assigned per accepted or dialed socket, never reused
/// within a process, never visible on the wire.
pub type ConnId = u64;

/// Default namespace: the host name with dots replaced by underscores.
pub fn default_namespace() -> String {
    let hostname = gethostname::gethostname();
    let hostname = hostname.to_string_lossy();
    if hostname.is_empty() {
        "benchlink".to_owned()
    } else {
        hostname.replace('.', "_")
    }
}

// ---------------------------------------------------------------------------
// Config and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_host: String,
    pub port: u16,
    /// Hosted namespace; defaults to [`default_namespace`].
    pub namespace: Option<String>,
    /// Host part of the address peers are told to dial back.
    pub advertise_host: String,
    /// Peers to join on startup, as `(namespace, host:port)`.
    pub seed_nodes: Vec<(String, String)>,
    pub stale_after: Duration,
    pub sweep_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            bind_host: "0.0.0.0".to_owned(),
            port: CONTROL_PORT,
            namespace: None,
            advertise_host: "127.0.0.1".to_owned(),
            seed_nodes: Vec::new(),
            stale_after: HEARTBEAT_STALE,
            sweep_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("coordinator is already running")]
    AlreadyRunning,
    #[error("event bus closed")]
    BusClosed,
}

// ---------------------------------------------------------------------------
// Connections and events
// ---------------------------------------------------------------------------

/// What a connection has authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnKind {
    Unclaimed,
    Component(String),
    PeerIn(String),
    PeerOut(String),
}

pub(crate) struct ConnState {
    pub(crate) tx: mpsc::Sender<ControlMessage>,
    pub(crate) kind: ConnKind,
    malformed_logged: bool,
}

enum Event {
    Accepted {
        id: ConnId,
        tx: mpsc::Sender<ControlMessage>,
    },
    PeerLinked {
        namespace: String,
        id: ConnId,
        tx: mpsc::Sender<ControlMessage>,
    },
    DialFailed {
        namespace: String,
    },
    Inbound {
        id: ConnId,
        message: ControlMessage,
    },
    Malformed {
        id: ConnId,
        error: MalformedFrame,
    },
    Disconnected {
        id: ConnId,
    },
}

enum Registration {
    Incoming,
    PeerDial(String),
}

/// Peer RPC issued by this Coordinator, keyed by conversation id.
pub(crate) enum PendingPeerRpc {
    SignIn { namespace: String },
    SendNodes { namespace: String },
}

impl PendingPeerRpc {
    fn namespace(&self) -> &str {
        match self {
            PendingPeerRpc::SignIn { namespace } | PendingPeerRpc::SendNodes { namespace } => {
                namespace
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    config: CoordinatorConfig,
    namespace: String,
    /// Advertised `host:port` peers dial back.
    address: String,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    events_tx: mpsc::Sender<Event>,
    events_rx: Option<mpsc::Receiver<Event>>,
    pub(crate) conns: HashMap<ConnId, ConnState>,
    pub(crate) directory: Directory,
    pub(crate) peers: PeerTable,
    pub(crate) pending: HashMap<ConversationId, PendingPeerRpc>,
    pub(crate) dialing: HashSet<String>,
    next_conn_id: Arc<AtomicU64>,
}

impl Coordinator {
    /// Bind the control listener.  Bind failure is fatal at startup.
    pub async fn bind(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let namespace = config
            .namespace
            .clone()
            .unwrap_or_else(default_namespace);
        let bind_addr = format!("{}:{}", config.bind_host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| CoordinatorError::Bind {
                addr: bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().expect("local_addr after bind");
        let address = format!("{}:{}", config.advertise_host, local_addr.port());
        let (events_tx, events_rx) = mpsc::channel(1024);
        let stale_after = config.stale_after;

        Ok(Coordinator {
            config,
            namespace,
            address,
            listener: Some(listener),
            local_addr,
            events_tx,
            events_rx: Some(events_rx),
            conns: HashMap::new(),
            directory: Directory::new(stale_after),
            peers: PeerTable::new(),
            pending: HashMap::new(),
            dialing: HashSet::new(),
            next_conn_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The address this Coordinator advertises to peers.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Drive the Coordinator.  Consumes the listener; runs until the event
    /// bus dies.
    pub async fn run(mut self) -> Result<(), CoordinatorError> {
        let listener = self.listener.take().ok_or(CoordinatorError::AlreadyRunning)?;
        let mut events_rx = self
            .events_rx
            .take()
            .ok_or(CoordinatorError::AlreadyRunning)?;
        info!(
            namespace = %self.namespace,
            addr = %self.local_addr,
            "coordinator listening"
        );

        let events = self.events_tx.clone();
        let counter = Arc::clone(&self.next_conn_id);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let _ = stream.set_nodelay(true);
                        let id = counter.fetch_add(1, Ordering::Relaxed);
                        start_connection(stream, id, Registration::Incoming, events.clone())
                            .await;
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        });

        for (namespace, address) in self.config.seed_nodes.clone() {
            self.add_node(&namespace, &address);
        }

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => return Err(CoordinatorError::BusClosed),
                },
                _ = sweep.tick() => self.sweep(),
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Accepted { id, tx } => {
                self.conns.insert(
                    id,
                    ConnState {
                        tx,
                        kind: ConnKind::Unclaimed,
                        malformed_logged: false,
                    },
                );
            }
            Event::PeerLinked { namespace, id, tx } => self.peer_linked(namespace, id, tx),
            Event::DialFailed { namespace } => {
                self.dialing.remove(&namespace);
            }
            Event::Inbound { id, message } => self.route(id, message),
            Event::Malformed { id, error } => {
                if let Some(conn) = self.conns.get_mut(&id) {
                    if !conn.malformed_logged {
                        warn!(conn = id, error = %error, "malformed frame dropped");
                        conn.malformed_logged = true;
                    }
                }
            }
            Event::Disconnected { id } => self.disconnected(id),
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    fn route(&mut self, id: ConnId, mut message: ControlMessage) {
        let Some(state) = self.conns.get(&id) else {
            return;
        };
        let kind = state.kind.clone();

        // Traffic proves liveness, and the sender frame is rewritten here:
        // a Component's sender is forced to its registered name so socket
        // identities and spoofed names never travel onward.
        match &kind {
            ConnKind::Component(name) => {
                self.directory.touch_name(name);
                message.sender = FullName {
                    namespace: self.namespace.clone(),
                    local: name.clone(),
                };
            }
            ConnKind::PeerIn(ns) | ConnKind::PeerOut(ns) => {
                self.peers.touch(ns);
                message.sender.fill_namespace(&self.namespace);
            }
            ConnKind::Unclaimed => {
                message.sender.fill_namespace(&self.namespace);
            }
        }

        let local_delivery =
            !message.receiver.has_namespace() || message.receiver.namespace == self.namespace;

        if local_delivery && message.receiver.is_coordinator() {
            self.coordinator_message(id, &kind, message);
            return;
        }

        // Everything past the Coordinator itself requires a completed
        // sign-in.
        if kind == ConnKind::Unclaimed {
            self.reply_error(id, &message, ErrorObject::not_signed_in());
            return;
        }

        if local_delivery {
            let target = self
                .directory
                .lookup(&message.receiver.local)
                .map(|record| record.identity);
            match target {
                Some(target) => {
                    message.receiver.fill_namespace(&self.namespace);
                    if let Err(returned) = self.try_forward(target, message) {
                        // Record lingers past its connection; drop it now.
                        self.directory.remove_identity(target);
                        let receiver = returned.receiver.to_string();
                        self.reply_error(
                            id,
                            &returned,
                            ErrorObject::receiver_unknown(&receiver),
                        );
                    }
                }
                None => {
                    let receiver = message.receiver.to_string();
                    self.reply_error(id, &message, ErrorObject::receiver_unknown(&receiver));
                }
            }
        } else {
            let namespace = message.receiver.namespace.clone();
            let target = self
                .peers
                .get(&namespace)
                .filter(|p| p.link_up() && p.is_healthy(self.config.stale_after))
                .and_then(|p| p.identity_out);
            match target {
                Some(target) => {
                    if let Err(returned) = self.try_forward(target, message) {
                        self.peers.drop_conn(target);
                        self.reply_error(id, &returned, ErrorObject::node_unknown(&namespace));
                    }
                }
                None => self.reply_error(id, &message, ErrorObject::node_unknown(&namespace)),
            }
        }
    }

    /// A message addressed to this Coordinator: admin requests in, replies
    /// to our own peer RPC back.
    fn coordinator_message(&mut self, id: ConnId, kind: &ConnKind, message: ControlMessage) {
        let parsed = match message.json_payload() {
            Some(payload) => rpc::parse(payload),
            None => {
                debug!("non-JSON message for the coordinator dropped");
                return;
            }
        };
        match parsed {
            Err(e) => {
                debug!(error = %e, "unparseable coordinator payload");
                let response = RpcPayload::Single(Rpc::Response(Response::error(
                    Value::Null,
                    ErrorObject::parse_error(),
                )));
                self.respond(id, &message, &response);
            }
            Ok(RpcPayload::Single(Rpc::Request(request))) => {
                if let Some(response) = self.dispatch_admin(id, kind, &message, &request) {
                    self.respond(
                        id,
                        &message,
                        &RpcPayload::Single(Rpc::Response(response)),
                    );
                }
            }
            Ok(RpcPayload::Single(Rpc::Response(response))) => {
                self.peer_response(&message, response);
            }
            Ok(RpcPayload::Batch(objects)) => {
                let mut responses = Vec::new();
                for object in objects {
                    match object {
                        Rpc::Request(request) => {
                            if let Some(response) =
                                self.dispatch_admin(id, kind, &message, &request)
                            {
                                responses.push(Rpc::Response(response));
                            }
                        }
                        Rpc::Response(response) => self.peer_response(&message, response),
                    }
                }
                if !responses.is_empty() {
                    self.respond(id, &message, &RpcPayload::Batch(responses));
                }
            }
        }
    }

    /// A reply to RPC this Coordinator sent to a peer.
    fn peer_response(&mut self, envelope: &ControlMessage, response: Response) {
        let Some(pending) = self.pending.remove(&envelope.conversation_id()) else {
            debug!("unmatched coordinator response dropped");
            return;
        };
        match pending {
            PendingPeerRpc::SignIn { namespace } => match response.outcome {
                Outcome::Success { .. } => {
                    info!(peer = %namespace, "signed in to peer coordinator");
                    if let Some(peer) = self.peers.get_mut(&namespace) {
                        peer.signed_in_out = true;
                    }
                    self.peers.touch(&namespace);
                    self.request_nodes(&namespace);
                    self.push_directory(&namespace);
                }
                Outcome::Failure { error } => warn!(
                    peer = %namespace,
                    code = error.code,
                    message = %error.message,
                    "peer rejected coordinator sign-in"
                ),
            },
            PendingPeerRpc::SendNodes { namespace } => match response.outcome {
                Outcome::Success { result } => self.merge_nodes(&result),
                Outcome::Failure { error } => warn!(
                    peer = %namespace,
                    code = error.code,
                    "peer refused send_nodes"
                ),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Peer mesh maintenance
    // -----------------------------------------------------------------------

    /// Record a peer address and dial it if there is no outbound link yet.
    /// Existing entries are left untouched.
    pub(crate) fn add_node(&mut self, namespace: &str, address: &str) {
        if namespace == self.namespace || namespace.is_empty() {
            return;
        }
        if self.peers.insert_if_absent(namespace, address) {
            info!(peer = %namespace, %address, "learned of peer coordinator");
        }
        let undialed = self
            .peers
            .get(namespace)
            .is_some_and(|p| p.identity_out.is_none());
        if undialed {
            self.start_dial(namespace);
        }
    }

    /// Merge a `namespace -> address` map, dialing newly learned peers so
    /// the mesh closes transitively.
    pub(crate) fn merge_nodes(&mut self, nodes: &Value) {
        let Some(map) = nodes.as_object() else {
            return;
        };
        for (namespace, address) in map {
            if let Some(address) = address.as_str() {
                self.add_node(namespace, address);
            }
        }
    }

    fn start_dial(&mut self, namespace: &str) {
        let Some(address) = self.peers.get(namespace).map(|p| p.address.clone()) else {
            return;
        };
        if !self.dialing.insert(namespace.to_owned()) {
            return;
        }
        debug!(peer = %namespace, %address, "dialing peer coordinator");
        let events = self.events_tx.clone();
        let counter = Arc::clone(&self.next_conn_id);
        let namespace = namespace.to_owned();
        tokio::spawn(async move {
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let id = counter.fetch_add(1, Ordering::Relaxed);
                    start_connection(stream, id, Registration::PeerDial(namespace), events)
                        .await;
                }
                Err(e) => {
                    debug!(peer = %namespace, error = %e, "peer dial failed");
                    let _ = events.send(Event::DialFailed { namespace }).await;
                }
            }
        });
    }

    /// An outbound peer connection is up; claim it and sign in.
    fn peer_linked(&mut self, namespace: String, id: ConnId, tx: mpsc::Sender<ControlMessage>) {
        self.dialing.remove(&namespace);
        let Some(peer) = self.peers.get_mut(&namespace) else {
            debug!(peer = %namespace, "dialed a peer that is no longer known");
            return;
        };
        peer.identity_out = Some(id);
        peer.signed_in_out = false;
        self.conns.insert(
            id,
            ConnState {
                tx,
                kind: ConnKind::PeerOut(namespace.clone()),
                malformed_logged: false,
            },
        );

        let cid = ConversationId::generate();
        self.pending.insert(
            cid,
            PendingPeerRpc::SignIn {
                namespace: namespace.clone(),
            },
        );
        let request = Request::new(
            methods::COORDINATOR_SIGN_IN,
            Some(json!({"namespace": self.namespace, "address": self.address})),
        );
        let message = ControlMessage::json(
            FullName::coordinator(&namespace),
            FullName::coordinator(&self.namespace),
            cid,
            &request,
        );
        self.send_to_conn(id, message);
    }

    /// Ask a peer for its node map.
    fn request_nodes(&mut self, namespace: &str) {
        let Some(target) = self.peers.get(namespace).and_then(|p| p.identity_out) else {
            return;
        };
        let cid = ConversationId::generate();
        self.pending.insert(
            cid,
            PendingPeerRpc::SendNodes {
                namespace: namespace.to_owned(),
            },
        );
        let message = ControlMessage::json(
            FullName::coordinator(namespace),
            FullName::coordinator(&self.namespace),
            cid,
            &Request::new(methods::SEND_NODES, None),
        );
        self.send_to_conn(target, message);
    }

    /// Push the full node map and local component list to one peer.
    fn push_directory(&mut self, namespace: &str) {
        let Some(target) = self.peers.get(namespace).and_then(|p| p.identity_out) else {
            return;
        };
        let nodes = self.nodes_json();
        let components = json!(self.directory.names());
        self.send_notification(target, namespace, methods::SET_NODES, Some(nodes));
        self.send_notification(
            target,
            namespace,
            methods::SET_LOCAL_COMPONENTS,
            Some(components),
        );
    }

    /// Full-map replication on every local directory change.
    pub(crate) fn replicate_directory(&mut self) {
        for (namespace, _) in self.peers.routable(self.config.stale_after) {
            self.push_directory(&namespace);
        }
    }

    /// `namespace -> address` for this node and every known peer.
    pub(crate) fn nodes_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(self.namespace.clone(), Value::from(self.address.clone()));
        for (namespace, address) in self.peers.address_map() {
            map.insert(namespace, Value::from(address));
        }
        Value::Object(map)
    }

    fn sweep(&mut self) {
        let dead = self.directory.purge_stale();
        if !dead.is_empty() {
            for (name, conn) in &dead {
                info!(component = %name, "component heartbeat expired");
                if let Some(state) = self.conns.get_mut(conn) {
                    if state.kind == ConnKind::Component(name.clone()) {
                        state.kind = ConnKind::Unclaimed;
                    }
                }
            }
            self.replicate_directory();
        }

        for (namespace, target) in self.peers.routable(self.config.stale_after) {
            self.send_notification(target, &namespace, methods::PONG, None);
        }

        for namespace in self.peers.undialed() {
            self.start_dial(&namespace);
        }
    }

    fn disconnected(&mut self, id: ConnId) {
        let Some(state) = self.conns.remove(&id) else {
            return;
        };
        match state.kind {
            ConnKind::Component(name) => {
                if self.directory.sign_out(&name, id) {
                    info!(component = %name, "component connection lost; signed out");
                    self.replicate_directory();
                }
            }
            ConnKind::PeerIn(_) | ConnKind::PeerOut(_) => {
                if let Some((namespace, side)) = self.peers.drop_conn(id) {
                    debug!(peer = %namespace, ?side, "peer connection lost");
                    // In-flight peer RPC toward that namespace is dead too.
                    self.pending.retain(|_, p| p.namespace() != namespace);
                }
            }
            ConnKind::Unclaimed => {}
        }
    }

    // -----------------------------------------------------------------------
    // Outbound helpers
    // -----------------------------------------------------------------------

    fn send_notification(
        &mut self,
        target: ConnId,
        namespace: &str,
        method: &str,
        params: Option<Value>,
    ) {
        let message = ControlMessage::json(
            FullName::coordinator(namespace),
            FullName::coordinator(&self.namespace),
            ConversationId::generate(),
            &Request::notification(method, params),
        );
        self.send_to_conn(target, message);
    }

    /// Queue toward a connection's writer; hand the message back on a dead
    /// link.  A full queue drops the message, as a slow consumer must not
    /// stall the routing loop.
    fn try_forward(&mut self, target: ConnId, message: ControlMessage) -> Result<(), ControlMessage> {
        let Some(conn) = self.conns.get(&target) else {
            return Err(message);
        };
        match conn.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = target, "writer queue full; message dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(message)) => Err(message),
        }
    }

    pub(crate) fn send_to_conn(&mut self, target: ConnId, message: ControlMessage) -> bool {
        self.try_forward(target, message).is_ok()
    }

    /// Answer an admin request on its arrival connection.
    pub(crate) fn respond(&mut self, id: ConnId, request: &ControlMessage, payload: &RpcPayload) {
        if request.sender.is_empty() {
            return;
        }
        let reply = ControlMessage::json(
            request.sender.clone(),
            FullName::coordinator(&self.namespace),
            request.conversation_id(),
            payload,
        );
        self.send_to_conn(id, reply);
    }

    /// Reply `error` to every request in the original payload that carries
    /// an id.  Undeliverable responses (response-direction traffic whose
    /// receiver is unresolvable) are dropped.
    fn reply_error(&mut self, id: ConnId, original: &ControlMessage, error: ErrorObject) {
        let Some(payload) = original.json_payload() else {
            return;
        };
        let Ok(parsed) = rpc::parse(payload) else {
            return;
        };
        if let Some(responses) = error_responses(&parsed, &error) {
            self.respond(id, original, &responses);
        }
    }
}

/// Map each id-carrying request of `payload` to `error`.
fn error_responses(payload: &RpcPayload, error: &ErrorObject) -> Option<RpcPayload> {
    match payload {
        RpcPayload::Single(Rpc::Request(request)) => request.id.clone().map(|rid| {
            RpcPayload::Single(Rpc::Response(Response::error(rid, error.clone())))
        }),
        RpcPayload::Single(Rpc::Response(_)) => None,
        RpcPayload::Batch(objects) => {
            let responses: Vec<Rpc> = objects
                .iter()
                .filter_map(|object| match object {
                    Rpc::Request(request) => request
                        .id
                        .clone()
                        .map(|rid| Rpc::Response(Response::error(rid, error.clone()))),
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

// ---------------------------------------------------------------------------
// Per-connection tasks
// ---------------------------------------------------------------------------

/// Register a connection on the event bus, then hand its halves to reader
/// and writer tasks.  The registration event is enqueued before the reader
/// starts, so the owner loop always sees the connection before its traffic.
async fn start_connection(
    stream: TcpStream,
    id: ConnId,
    registration: Registration,
    events: mpsc::Sender<Event>,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel(256);
    let event = match registration {
        Registration::Incoming => Event::Accepted { id, tx },
        Registration::PeerDial(namespace) => Event::PeerLinked { namespace, id, tx },
    };
    if events.send(event).await.is_err() {
        return;
    }
    tokio::spawn(write_loop(write_half, rx));
    tokio::spawn(read_loop(read_half, id, events));
}

async fn write_loop(mut half: OwnedWriteHalf, mut rx: mpsc::Receiver<ControlMessage>) {
    while let Some(message) = rx.recv().await {
        if write_frames(&mut half, &message.to_frames()).await.is_err() {
            break;
        }
    }
}

async fn read_loop(mut half: OwnedReadHalf, id: ConnId, events: mpsc::Sender<Event>) {
    loop {
        match read_frames(&mut half).await {
            Ok(frames) => match ControlMessage::from_frames(frames) {
                Ok(message) => {
                    if events.send(Event::Inbound { id, message }).await.is_err() {
                        return;
                    }
                }
                Err(error) => {
                    if events.send(Event::Malformed { id, error }).await.is_err() {
                        return;
                    }
                }
            },
            Err(WireError::Malformed(error)) => {
                if events.send(Event::Malformed { id, error }).await.is_err() {
                    return;
                }
            }
            Err(_) => {
                let _ = events.send(Event::Disconnected { id }).await;
                return;
            }
        }
    }
}
