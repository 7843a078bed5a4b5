//! Graph edges: one per established transport.

use crate::descriptor::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized edge identifier shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    /// `sorted(a, b).join("-") + "-" + suffix`, identical on both sides of a link.
    pub fn between(a: &NodeId, b: &NodeId, suffix: &str) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}-{}-{}", lo, hi, suffix))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Weighted link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub msg_count: u64,
}

fn default_weight() -> u32 {
    1
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId, weight: u32, is_local: bool) -> Self {
        Self {
            id,
            source,
            target,
            weight,
            is_local,
            msg_count: 0,
        }
    }

    #[must_use]
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    #[must_use]
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Whether both edges join the same pair of nodes, in either direction.
    #[must_use]
    pub fn same_endpoints(&self, other: &Edge) -> bool {
        (self.source == other.source && self.target == other.target)
            || (self.source == other.target && self.target == other.source)
    }
}
