//! Node identifiers.
//!
//! Nodes are addressed by string id everywhere: adjacency, tombstones and
//! the replicated maps are all keyed by [`NodeId`], never by reference.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, replica-independent node identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prints_inner_string() {
        assert_eq!(format!("{}", NodeId::new("root")), "root");
    }

    #[test]
    fn default_sorts_before_every_id() {
        assert!(NodeId::default() < NodeId::new("a"));
        assert!(NodeId::default() < NodeId::new("0"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&NodeId::new("n1")).unwrap();
        assert_eq!(json, "\"n1\"");
    }
}
