//! Operation identifiers for RGA elements.
//!
//! An `OperationId` is the pair `(counter, replica_id)` produced by a replica's
//! Lamport clock. It is both the identity of an element and the priority used
//! to order concurrent insertions at the same position.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crdt::types::replica::ReplicaId;
use crate::error::IdParseError;

const ROOT_LITERAL: &str = "root";

/// A globally unique, totally ordered identifier.
///
/// # Ordering
///
/// Identifiers are ordered first by counter, then by replica id. The order is
/// identical on every replica, which makes it usable for conflict resolution:
/// of two concurrent insertions after the same element, the greater id wins
/// the position closest to that element.
///
/// The root sentinel is `(0, "")`. Clocks start coining ids at counter 1, so
/// no replica can ever produce it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    /// The logical clock value when this id was coined
    pub counter: u64,
    /// The replica that coined this id
    pub replica_id: ReplicaId,
}

impl OperationId {
    pub fn new(counter: u64, replica_id: impl Into<ReplicaId>) -> Self {
        OperationId {
            counter,
            replica_id: replica_id.into(),
        }
    }

    /// The id of the root sentinel.
    pub fn root() -> Self {
        OperationId {
            counter: 0,
            replica_id: ReplicaId::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.counter == 0 && self.replica_id.is_empty()
    }

    /// Returns true if `self` wins a conflict against `other`.
    pub fn has_priority_over(&self, other: &OperationId) -> bool {
        self > other
    }
}

impl PartialOrd for OperationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OperationId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.replica_id.cmp(&other.replica_id),
            other => other,
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(ROOT_LITERAL)
        } else {
            write!(f, "{}@{}", self.counter, self.replica_id)
        }
    }
}

impl FromStr for OperationId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT_LITERAL {
            return Ok(OperationId::root());
        }
        let (counter, replica) = s
            .split_once('@')
            .ok_or_else(|| IdParseError(s.to_string()))?;
        let counter = counter
            .parse::<u64>()
            .map_err(|_| IdParseError(s.to_string()))?;
        let id = OperationId::new(counter, replica);
        // The root is only ever spelled `root`
        if id.is_root() {
            return Err(IdParseError(s.to_string()));
        }
        Ok(id)
    }
}

impl Serialize for OperationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
