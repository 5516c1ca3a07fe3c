//! Identifier types used throughout the mesh.
//!
//! Node ids are operator-chosen strings (`node1`, `edge-7`); their
//! lexicographic order doubles as the last-writer-wins tie-breaker.
//! Event ids are random UUIDs assigned by the ingesting node.

use crate::Error;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an edge node (or the gateway's view of one).
///
/// Plain string, totally ordered. The ordering matters: concurrent register
/// writes with equal timestamps are resolved in favor of the greater node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for a telemetry event.
///
/// Assigned by the node that ingests the event; globally unique with
/// overwhelming probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event id from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses an event id from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A unique add-tag: which node observed which event.
///
/// Tags are the unit of add/remove bookkeeping in the replicated event set.
/// On the wire a tag is the string `"<event_id>@<node_id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    /// The event this tag observes.
    pub event_id: EventId,
    /// The node that performed the add.
    pub node_id: NodeId,
}

impl Tag {
    /// Creates a tag for an event observed by a node.
    #[must_use]
    pub fn new(event_id: EventId, node_id: NodeId) -> Self {
        Self { event_id, node_id }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.event_id, self.node_id)
    }
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (event, node) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidTag(s.to_string()))?;
        if node.is_empty() {
            return Err(Error::InvalidTag(s.to_string()));
        }
        let event_id = EventId::parse(event).map_err(|_| Error::InvalidTag(s.to_string()))?;
        Ok(Self {
            event_id,
            node_id: NodeId::new(node),
        })
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrips_through_display() {
        let tag = Tag::new(EventId::new(), NodeId::new("node7"));
        let parsed: Tag = tag.to_string().parse().unwrap();
        assert_eq!(parsed, tag);
    }

    #[test]
    fn tag_serializes_as_string() {
        let id = EventId::parse("6fa459ea-ee8a-4ca4-894e-db77e160355e").unwrap();
        let tag = Tag::new(id, NodeId::new("node1"));
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"6fa459ea-ee8a-4ca4-894e-db77e160355e@node1\"");
    }

    #[test]
    fn tag_rejects_missing_separator() {
        assert!("no-separator".parse::<Tag>().is_err());
    }

    #[test]
    fn tag_rejects_empty_node() {
        let s = format!("{}@", EventId::new());
        assert!(s.parse::<Tag>().is_err());
    }

    #[test]
    fn node_ids_order_lexicographically() {
        assert!(NodeId::new("node2") > NodeId::new("node1"));
        assert!(NodeId::new("nodeB") > NodeId::new("nodeA"));
    }
}
