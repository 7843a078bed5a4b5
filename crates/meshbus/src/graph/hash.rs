//! Structural graph hash.
//!
//! Covers node ids, handled-event sets and sorted incident-edge ids only.
//! Counters and timestamps never contribute.

use super::edge::{Edge, EdgeId};
use crate::descriptor::{NodeDescriptor, NodeId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Hex-encoded SHA-256 of a graph's structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphHash(String);

impl GraphHash {
    /// Hash an arbitrary set of nodes and edges.
    pub fn compute<'a, N, E>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator<Item = &'a NodeDescriptor>,
        E: IntoIterator<Item = &'a Edge>,
    {
        let mut entries: BTreeMap<&NodeId, (&NodeDescriptor, Vec<&EdgeId>)> = nodes
            .into_iter()
            .map(|n| (&n.id, (n, Vec::new())))
            .collect();

        for edge in edges {
            if let Some((_, incident)) = entries.get_mut(&edge.source) {
                incident.push(&edge.id);
            }
            if edge.target != edge.source {
                if let Some((_, incident)) = entries.get_mut(&edge.target) {
                    incident.push(&edge.id);
                }
            }
        }

        let mut hasher = Sha256::new();
        for (id, (node, mut incident)) in entries {
            incident.sort();
            hasher.update(id.as_str().as_bytes());
            hasher.update([0u8]);
            for name in &node.handled_events {
                hasher.update(name.as_bytes());
                hasher.update([1u8]);
            }
            hasher.update([0u8]);
            for edge in incident {
                hasher.update(edge.as_str().as_bytes());
                hasher.update([2u8]);
            }
            hasher.update([0xffu8]);
        }

        Self(hex::encode(hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
