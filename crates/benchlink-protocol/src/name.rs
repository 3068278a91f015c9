//! Full-name addressing: `<namespace>.<local>`.
//!
//! Either part may be absent on the wire; an empty string stands for the
//! omitted part and receivers fill it with their defaults.  The literal
//! local name `COORDINATOR` always addresses the Coordinator hosting the
//! namespace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reserved local name of every namespace's Coordinator.
pub const COORDINATOR: &str = "COORDINATOR";

/// Errors from parsing or constructing a full name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is not valid UTF-8")]
    InvalidUtf8,
    /// Neither segment may contain a `.` of its own.
    #[error("name segment contains '.': {0}")]
    EmbeddedDot(String),
}

/// A component address `namespace.local`.
///
/// An empty `namespace` means "the namespace of whichever Coordinator sees
/// the frame"; an empty `local` only occurs on anonymous outbound senders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullName {
    pub namespace: String,
    pub local: String,
}

impl FullName {
    pub fn new(namespace: &str, local: &str) -> Result<Self, NameError> {
        for segment in [namespace, local] {
            if segment.contains('.') {
                return Err(NameError::EmbeddedDot(segment.to_owned()));
            }
        }
        Ok(FullName {
            namespace: namespace.to_owned(),
            local: local.to_owned(),
        })
    }

    /// A name with the namespace left for the Coordinator to fill in.
    pub fn local_only(local: &str) -> Result<Self, NameError> {
        Self::new("", local)
    }

    /// The Coordinator address of `namespace`.
    pub fn coordinator(namespace: &str) -> Self {
        FullName {
            namespace: namespace.to_owned(),
            local: COORDINATOR.to_owned(),
        }
    }

    /// Parse wire bytes.  Empty bytes are the empty name; a dotless name is
    /// a bare local name; otherwise the first `.` splits the segments.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NameError> {
        let text = std::str::from_utf8(bytes).map_err(|_| NameError::InvalidUtf8)?;
        match text.split_once('.') {
            None => Self::new("", text),
            Some((namespace, local)) => Self::new(namespace, local),
        }
    }

    /// Wire form: `namespace.local`, a bare local name when the namespace is
    /// empty, or no bytes at all for the empty name.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.local.is_empty()
    }

    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Fill an omitted namespace with `namespace`; a present one is kept.
    pub fn or_namespace(mut self, namespace: &str) -> Self {
        self.fill_namespace(namespace);
        self
    }

    /// In-place variant of [`Self::or_namespace`].
    pub fn fill_namespace(&mut self, namespace: &str) {
        if self.namespace.is_empty() {
            self.namespace = namespace.to_owned();
        }
    }

    /// Whether this name addresses a namespace's Coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.local == COORDINATOR
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}.{}", self.namespace, self.local)
        }
    }
}
