//! Replica identifier type and related functionality.
//!
//! This module contains the definition of ReplicaId, which uniquely identifies
//! each participant in the distributed CRDT system.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for each replica (editing session or server) in the
/// distributed system.
///
/// Replica ids break ties between operations that carry the same counter, so
/// they are compared lexicographically and must be distinct across replicas.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Creates a replica id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        ReplicaId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(id: &str) -> Self {
        ReplicaId::new(id)
    }
}

impl From<String> for ReplicaId {
    fn from(id: String) -> Self {
        ReplicaId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_ordering() {
        assert!(ReplicaId::from("alice") < ReplicaId::from("bob"));
        assert!(ReplicaId::from("B") < ReplicaId::from("a"));
        assert!(ReplicaId::from("node-10") < ReplicaId::from("node-9"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ReplicaId::from("server-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"server-1\"");
        let back: ReplicaId = serde_json::from_str("\"server-1\"").unwrap();
        assert_eq!(back, id);
    }
}
