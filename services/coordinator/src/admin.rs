//! Administrative RPC surface, exposed at `<namespace>.COORDINATOR`.
//!
//! Dispatch runs on the owner task; handlers mutate the directory and peer
//! table directly and return at most one response per id-carrying request.
//! Before a connection completes `sign_in`, only `sign_in`, `pong`, and
//! `coordinator_sign_in` are admitted; everything else earns a Not-signed-in
//! error.

use crate::directory::SignIn;
use crate::{ConnId, ConnKind, Coordinator};
use benchlink_protocol::frame::ControlMessage;
use benchlink_protocol::rpc::{methods, ErrorObject, Request, Response};
use benchlink_protocol::COORDINATOR;
use serde_json::{json, Value};
use tracing::info;

impl Coordinator {
    pub(crate) fn dispatch_admin(
        &mut self,
        id: ConnId,
        kind: &ConnKind,
        envelope: &ControlMessage,
        request: &Request,
    ) -> Option<Response> {
        let signed = *kind != ConnKind::Unclaimed;
        let allowed_pre_sign_in = matches!(
            request.method.as_str(),
            methods::SIGN_IN | methods::PONG | methods::COORDINATOR_SIGN_IN
        );
        if !signed && !allowed_pre_sign_in {
            return request
                .id
                .clone()
                .map(|rid| Response::error(rid, ErrorObject::not_signed_in()));
        }

        let params = request.params.as_ref();
        let outcome = match request.method.as_str() {
            methods::SIGN_IN => self.admin_sign_in(id, kind, envelope),
            methods::SIGN_OUT => self.admin_sign_out(id, kind),
            // Liveness was already recorded when the frame arrived.
            methods::PONG => Ok(Value::Null),
            methods::SEND_LOCAL_COMPONENTS => Ok(json!(self.directory.names())),
            methods::SEND_NODES => Ok(self.nodes_json()),
            methods::ADD_NODES => self.admin_add_nodes(params),
            methods::COORDINATOR_SIGN_IN => self.admin_coordinator_sign_in(id, kind, params),
            methods::COORDINATOR_SIGN_OUT => self.admin_coordinator_sign_out(id, kind),
            methods::SET_NODES => self.admin_set_nodes(params),
            methods::SET_LOCAL_COMPONENTS => self.admin_set_local_components(kind, params),
            other => Err(ErrorObject::method_not_found(other)),
        };

        let rid = request.id.clone()?;
        Some(match outcome {
            Ok(result) => Response::result(rid, result),
            Err(error) => Response::error(rid, error),
        })
    }

    /// Create a Component Record from the sender identity and local name.
    fn admin_sign_in(
        &mut self,
        id: ConnId,
        kind: &ConnKind,
        envelope: &ControlMessage,
    ) -> Result<Value, ErrorObject> {
        let local = envelope.sender.local.clone();
        if local.is_empty() || local == COORDINATOR {
            return Err(ErrorObject::invalid_params(
                "sign_in requires a component local name",
            ));
        }
        match kind {
            ConnKind::Component(existing) if *existing == local => {
                Ok(self.full_name_result(&local))
            }
            ConnKind::Component(existing) => Err(ErrorObject::duplicate_name(&format!(
                "connection is already signed in as {existing}"
            ))),
            ConnKind::PeerIn(_) | ConnKind::PeerOut(_) => Err(ErrorObject::invalid_params(
                "peer links cannot sign in as components",
            )),
            ConnKind::Unclaimed => match self.directory.sign_in(&local, id) {
                Ok(outcome) => {
                    if let SignIn::Replaced(old) = outcome {
                        if let Some(conn) = self.conns.get_mut(&old) {
                            conn.kind = ConnKind::Unclaimed;
                        }
                    }
                    if let Some(conn) = self.conns.get_mut(&id) {
                        conn.kind = ConnKind::Component(local.clone());
                    }
                    info!(component = %local, "component signed in");
                    self.replicate_directory();
                    Ok(self.full_name_result(&local))
                }
                Err(_) => Err(ErrorObject::duplicate_name(&local)),
            },
        }
    }

    fn full_name_result(&self, local: &str) -> Value {
        json!({"full_name": format!("{}.{}", self.namespace(), local)})
    }

    /// Remove the caller's record iff its identity still holds it.  Any
    /// mismatch leaves the directory untouched.
    fn admin_sign_out(&mut self, id: ConnId, kind: &ConnKind) -> Result<Value, ErrorObject> {
        match kind {
            ConnKind::Component(name) if self.directory.sign_out(name, id) => {
                if let Some(conn) = self.conns.get_mut(&id) {
                    conn.kind = ConnKind::Unclaimed;
                }
                info!(component = %name, "component signed out");
                self.replicate_directory();
                Ok(Value::Null)
            }
            _ => Err(ErrorObject::not_signed_in()),
        }
    }

    /// Learn peers and dial them; existing entries are untouched.
    fn admin_add_nodes(&mut self, params: Option<&Value>) -> Result<Value, ErrorObject> {
        let nodes = params
            .and_then(Value::as_object)
            .ok_or_else(|| ErrorObject::invalid_params("expected {namespace: address}"))?;
        for (namespace, address) in nodes {
            let address = address
                .as_str()
                .ok_or_else(|| ErrorObject::invalid_params("addresses are strings"))?;
            self.add_node(namespace, address);
        }
        Ok(Value::Null)
    }

    /// Peer-side sign-in: peer links bypass the component directory.
    fn admin_coordinator_sign_in(
        &mut self,
        id: ConnId,
        kind: &ConnKind,
        params: Option<&Value>,
    ) -> Result<Value, ErrorObject> {
        if matches!(kind, ConnKind::Component(_)) {
            return Err(ErrorObject::invalid_params(
                "components cannot sign in as coordinators",
            ));
        }
        let params = params
            .ok_or_else(|| ErrorObject::invalid_params("namespace and address required"))?;
        let namespace = params
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| ErrorObject::invalid_params("namespace required"))?;
        let address = params
            .get("address")
            .and_then(Value::as_str)
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| ErrorObject::invalid_params("address required"))?;
        if namespace == self.namespace() {
            return Err(ErrorObject::invalid_params(
                "peer claims this coordinator's own namespace",
            ));
        }

        let peer = self.peers.upsert(namespace, address);
        peer.address = address.to_owned();
        peer.identity_in = Some(id);
        peer.signed_in_in = true;
        let needs_dial = peer.identity_out.is_none();
        self.peers.touch(namespace);
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.kind = ConnKind::PeerIn(namespace.to_owned());
        }
        info!(peer = %namespace, %address, "peer coordinator signed in");
        if needs_dial {
            self.add_node(namespace, address);
        }
        Ok(json!({"namespace": self.namespace()}))
    }

    /// Tear down the inbound side of a peer link; the record disappears once
    /// neither direction remains.
    fn admin_coordinator_sign_out(
        &mut self,
        id: ConnId,
        kind: &ConnKind,
    ) -> Result<Value, ErrorObject> {
        let ConnKind::PeerIn(namespace) = kind else {
            return Err(ErrorObject::invalid_params("not a peer link"));
        };
        let mut record_gone = false;
        if let Some(peer) = self.peers.get_mut(namespace) {
            peer.identity_in = None;
            peer.signed_in_in = false;
            record_gone = peer.identity_out.is_none();
        }
        if record_gone {
            self.peers.remove(namespace);
        }
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.kind = ConnKind::Unclaimed;
        }
        info!(peer = %namespace, "peer coordinator signed out");
        Ok(Value::Null)
    }

    /// Idempotent node-map replication; unknown namespaces are dialed so the
    /// mesh closes transitively.
    fn admin_set_nodes(&mut self, params: Option<&Value>) -> Result<Value, ErrorObject> {
        let nodes = params
            .ok_or_else(|| ErrorObject::invalid_params("expected {namespace: address}"))?;
        self.merge_nodes(nodes);
        Ok(Value::Null)
    }

    /// Replicated remote component names; kept for introspection only.
    fn admin_set_local_components(
        &mut self,
        kind: &ConnKind,
        params: Option<&Value>,
    ) -> Result<Value, ErrorObject> {
        let (ConnKind::PeerIn(namespace) | ConnKind::PeerOut(namespace)) = kind else {
            return Err(ErrorObject::invalid_params("not a peer link"));
        };
        let names = params
            .and_then(Value::as_array)
            .ok_or_else(|| ErrorObject::invalid_params("expected [name, ...]"))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ErrorObject::invalid_params("names are strings"))
            })
            .collect::<Result<Vec<String>, ErrorObject>>()?;
        if let Some(peer) = self.peers.get_mut(namespace) {
            peer.remote_components = names;
        }
        Ok(Value::Null)
    }
}
