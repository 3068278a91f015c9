//! Peer Coordinator table.
//!
//! Every peer link is two TCP connections, one initiated from each side,
//! so a record carries two directional identities and two directional
//! sign-in states.  A link routes traffic only through the outbound side.

use crate::ConnId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub namespace: String,
    pub address: String,
    pub identity_out: Option<ConnId>,
    pub identity_in: Option<ConnId>,
    pub signed_in_out: bool,
    pub signed_in_in: bool,
    pub last_heartbeat: Instant,
    /// Replicated remote local names; introspection only, never routing.
    pub remote_components: Vec<String>,
}

impl PeerRecord {
    fn new(namespace: &str, address: &str) -> Self {
        PeerRecord {
            namespace: namespace.to_owned(),
            address: address.to_owned(),
            identity_out: None,
            identity_in: None,
            signed_in_out: false,
            signed_in_in: false,
            last_heartbeat: Instant::now(),
            remote_components: Vec::new(),
        }
    }

    /// Healthy means traffic seen recently enough.
    pub fn is_healthy(&self, stale_after: Duration) -> bool {
        self.last_heartbeat.elapsed() < stale_after
    }

    /// Whether the outbound direction can carry forwarded frames.
    pub fn link_up(&self) -> bool {
        self.signed_in_out && self.identity_out.is_some()
    }
}

/// Which directional connection of a peer link dropped.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerSide {
    Outbound,
    Inbound,
}

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str) -> Option<&PeerRecord> {
        self.peers.get(namespace)
    }

    pub fn get_mut(&mut self, namespace: &str) -> Option<&mut PeerRecord> {
        self.peers.get_mut(namespace)
    }

    /// Add a peer if it is unknown; existing entries are left untouched.
    /// Returns true when the namespace was new.
    pub fn insert_if_absent(&mut self, namespace: &str, address: &str) -> bool {
        if self.peers.contains_key(namespace) {
            return false;
        }
        self.peers
            .insert(namespace.to_owned(), PeerRecord::new(namespace, address));
        true
    }

    /// Ensure a record exists and return it mutably.
    pub fn upsert(&mut self, namespace: &str, address: &str) -> &mut PeerRecord {
        self.peers
            .entry(namespace.to_owned())
            .or_insert_with(|| PeerRecord::new(namespace, address))
    }

    pub fn remove(&mut self, namespace: &str) -> Option<PeerRecord> {
        self.peers.remove(namespace)
    }

    pub fn touch(&mut self, namespace: &str) {
        if let Some(peer) = self.peers.get_mut(namespace) {
            peer.last_heartbeat = Instant::now();
        }
    }

    /// Clear whichever directional identity `id` held.
    pub fn drop_conn(&mut self, id: ConnId) -> Option<(String, PeerSide)> {
        for peer in self.peers.values_mut() {
            if peer.identity_out == Some(id) {
                peer.identity_out = None;
                peer.signed_in_out = false;
                return Some((peer.namespace.clone(), PeerSide::Outbound));
            }
            if peer.identity_in == Some(id) {
                peer.identity_in = None;
                peer.signed_in_in = false;
                return Some((peer.namespace.clone(), PeerSide::Inbound));
            }
        }
        None
    }

    /// `namespace -> address`, sorted, as reported by `send_nodes`.
    pub fn address_map(&self) -> Vec<(String, String)> {
        let mut nodes: Vec<(String, String)> = self
            .peers
            .values()
            .map(|p| (p.namespace.clone(), p.address.clone()))
            .collect();
        nodes.sort();
        nodes
    }

    /// Peers whose outbound link can carry replication pushes right now.
    pub fn routable(&self, stale_after: Duration) -> Vec<(String, ConnId)> {
        self.peers
            .values()
            .filter(|p| p.link_up() && p.is_healthy(stale_after))
            .map(|p| (p.namespace.clone(), p.identity_out.expect("link_up implies identity")))
            .collect()
    }

    /// Namespaces with an address but no outbound connection; candidates for
    /// the background dialer.
    pub fn undialed(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.identity_out.is_none())
            .map(|p| p.namespace.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_leaves_existing_entries_untouched() {
        let mut table = PeerTable::new();
        assert!(table.insert_if_absent("N2", "127.0.0.1:60001"));
        table.get_mut("N2").unwrap().signed_in_out = true;

        assert!(!table.insert_if_absent("N2", "10.0.0.9:1"));
        let peer = table.get("N2").unwrap();
        assert_eq!(peer.address, "127.0.0.1:60001");
        assert!(peer.signed_in_out);
    }

    #[test]
    fn link_up_requires_the_outbound_side() {
        let mut table = PeerTable::new();
        table.insert_if_absent("N2", "127.0.0.1:60001");
        assert!(!table.get("N2").unwrap().link_up());

        {
            let peer = table.get_mut("N2").unwrap();
            peer.identity_in = Some(7);
            peer.signed_in_in = true;
        }
        assert!(!table.get("N2").unwrap().link_up());

        {
            let peer = table.get_mut("N2").unwrap();
            peer.identity_out = Some(8);
            peer.signed_in_out = true;
        }
        assert!(table.get("N2").unwrap().link_up());
        assert_eq!(table.routable(Duration::from_secs(30)), vec![("N2".to_owned(), 8)]);
    }

    #[test]
    fn drop_conn_clears_only_the_matching_side() {
        let mut table = PeerTable::new();
        let peer = table.upsert("N2", "127.0.0.1:60001");
        peer.identity_out = Some(8);
        peer.signed_in_out = true;
        peer.identity_in = Some(7);
        peer.signed_in_in = true;

        assert_eq!(table.drop_conn(8), Some(("N2".to_owned(), PeerSide::Outbound)));
        let peer = table.get("N2").unwrap();
        assert!(!peer.signed_in_out);
        assert!(peer.signed_in_in);
        assert_eq!(peer.identity_in, Some(7));

        assert_eq!(table.drop_conn(99), None);
    }

    #[test]
    fn staleness_gates_health_not_membership() {
        let mut table = PeerTable::new();
        let peer = table.upsert("N2", "127.0.0.1:60001");
        peer.identity_out = Some(8);
        peer.signed_in_out = true;
        peer.last_heartbeat = Instant::now() - Duration::from_secs(120);

        assert!(!table.get("N2").unwrap().is_healthy(Duration::from_secs(30)));
        assert!(table.routable(Duration::from_secs(30)).is_empty());
        assert_eq!(table.address_map().len(), 1);

        table.touch("N2");
        assert!(table.get("N2").unwrap().is_healthy(Duration::from_secs(30)));
    }
}
