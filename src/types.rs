//! Shared identifier types and the identity classifier.

use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};

/// Store-assigned row key.
pub type RowId = i64;

/// Client-generated token naming a node that has no durable row yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempToken(String);

impl TempToken {
    /// Returns the raw token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an identifier denotes a client-local or an already persisted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Created client-side, never written to the store.
    Pending,
    /// Already has a durable row.
    Persisted,
}

/// Tagged node identifier, parsed once at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// Client-local temporary identifier.
    Temp(TempToken),
    /// Store-assigned identifier.
    Persistent(RowId),
}

/// Returned when an identifier string is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyNodeId;

impl fmt::Display for EmptyNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("node id must not be empty")
    }
}

impl std::error::Error for EmptyNodeId {}

/// Classifies a raw identifier string. Total: never fails.
///
/// Store keys are positive decimal integers without sign or leading zeros;
/// anything else is a client token.
pub fn classify(raw: &str) -> Classification {
    match parse_row_id(raw) {
        Some(_) => Classification::Persisted,
        None => Classification::Pending,
    }
}

fn parse_row_id(raw: &str) -> Option<RowId> {
    if raw.is_empty() || raw.starts_with('0') || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<RowId>().ok().filter(|v| *v > 0)
}

impl NodeId {
    /// Parses a wire identifier into its tagged form.
    pub fn parse(raw: &str) -> Result<Self, EmptyNodeId> {
        if raw.is_empty() {
            return Err(EmptyNodeId);
        }
        Ok(match parse_row_id(raw) {
            Some(id) => Self::Persistent(id),
            None => Self::Temp(TempToken(raw.to_string())),
        })
    }

    /// Identity classification of this id.
    pub fn classification(&self) -> Classification {
        match self {
            Self::Temp(_) => Classification::Pending,
            Self::Persistent(_) => Classification::Persisted,
        }
    }

    /// Returns the row id when already persisted.
    pub fn persistent(&self) -> Option<RowId> {
        match self {
            Self::Persistent(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(token) => write!(f, "{token}"),
            Self::Persistent(id) => write!(f, "{id}"),
        }
    }
}

impl From<RowId> for NodeId {
    fn from(value: RowId) -> Self {
        Self::Persistent(value)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct NodeIdVisitor;

impl Visitor<'_> for NodeIdVisitor {
    type Value = NodeId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-empty id string or a positive integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
        NodeId::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeId, E> {
        match RowId::try_from(v) {
            Ok(id) if id > 0 => Ok(NodeId::Persistent(id)),
            _ => Err(E::custom(format!("row id out of range: {v}"))),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeId, E> {
        if v > 0 {
            Ok(NodeId::Persistent(v))
        } else {
            Err(E::custom(format!("row id out of range: {v}")))
        }
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeIdVisitor)
    }
}

/// Deserializes a [`RowId`] sent either as a JSON integer or a numeric string.
pub fn deserialize_row_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RowId, D::Error> {
    match NodeId::deserialize(deserializer)? {
        NodeId::Persistent(id) => Ok(id),
        NodeId::Temp(token) => Err(de::Error::custom(format!(
            "expected a persistent id, got token {token}"
        ))),
    }
}
