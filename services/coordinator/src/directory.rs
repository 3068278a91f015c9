//! Local component directory.
//!
//! Invariants: at most one record per local name, and `local_name ->
//! identity` is a bijection while a sign-in is live.  Records die on
//! sign-out, on identity disappearance, or on heartbeat staleness.

use crate::ConnId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ComponentRecord {
    pub local_name: String,
    pub identity: ConnId,
    pub last_heartbeat: Instant,
}

/// A live record already holds the requested name.
#[derive(Debug, PartialEq, Eq)]
pub struct DuplicateName;

/// Outcome of a successful sign-in.
#[derive(Debug, PartialEq, Eq)]
pub enum SignIn {
    Fresh,
    /// A stale record was taken over; its old identity is returned so the
    /// caller can demote that connection.
    Replaced(ConnId),
}

#[derive(Debug)]
pub struct Directory {
    records: HashMap<String, ComponentRecord>,
    stale_after: Duration,
}

impl Directory {
    pub fn new(stale_after: Duration) -> Self {
        Directory {
            records: HashMap::new(),
            stale_after,
        }
    }

    /// Create a record for `local_name` held by `identity`.  A live record
    /// under the same name rejects the attempt; a stale one is replaced.
    pub fn sign_in(&mut self, local_name: &str, identity: ConnId) -> Result<SignIn, DuplicateName> {
        match self.records.get(local_name) {
            Some(existing) if existing.identity == identity => {
                self.touch_name(local_name);
                Ok(SignIn::Fresh)
            }
            Some(existing) if existing.last_heartbeat.elapsed() < self.stale_after => {
                Err(DuplicateName)
            }
            existing => {
                let replaced = existing.map(|r| r.identity);
                self.records.insert(
                    local_name.to_owned(),
                    ComponentRecord {
                        local_name: local_name.to_owned(),
                        identity,
                        last_heartbeat: Instant::now(),
                    },
                );
                Ok(match replaced {
                    Some(old) => SignIn::Replaced(old),
                    None => SignIn::Fresh,
                })
            }
        }
    }

    /// Remove the record iff `identity` still holds it.  A mismatched
    /// identity leaves the directory untouched.
    pub fn sign_out(&mut self, local_name: &str, identity: ConnId) -> bool {
        match self.records.get(local_name) {
            Some(record) if record.identity == identity => {
                self.records.remove(local_name);
                true
            }
            _ => false,
        }
    }

    /// Identity disappearance (connection loss).  Returns the freed name.
    pub fn remove_identity(&mut self, identity: ConnId) -> Option<String> {
        let name = self
            .records
            .values()
            .find(|r| r.identity == identity)
            .map(|r| r.local_name.clone())?;
        self.records.remove(&name);
        Some(name)
    }

    pub fn touch_name(&mut self, local_name: &str) {
        if let Some(record) = self.records.get_mut(local_name) {
            record.last_heartbeat = Instant::now();
        }
    }

    pub fn lookup(&self, local_name: &str) -> Option<&ComponentRecord> {
        self.records.get(local_name)
    }

    /// Sorted local names, as reported by `send_local_components`.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records past the staleness threshold; returns what was removed.
    pub fn purge_stale(&mut self) -> Vec<(String, ConnId)> {
        let stale_after = self.stale_after;
        let dead: Vec<(String, ConnId)> = self
            .records
            .values()
            .filter(|r| r.last_heartbeat.elapsed() >= stale_after)
            .map(|r| (r.local_name.clone(), r.identity))
            .collect();
        for (name, _) in &dead {
            self.records.remove(name);
        }
        dead
    }
}
