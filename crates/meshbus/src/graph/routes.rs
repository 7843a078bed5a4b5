//! Shortest paths from the local node.
//!
//! Dijkstra over edge weights. `BinaryHeap` is a max-heap, so entries are
//! wrapped in `Reverse`; equal distances pop in node-id order, which keeps
//! route choice deterministic across nodes.

use super::edge::{Edge, EdgeId};
use crate::descriptor::NodeId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One step of a path: alternating nodes and edges, starting at self.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    Node(NodeId),
    Edge(EdgeId),
}

/// Single-source shortest-path tree rooted at the local node.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    root: Option<NodeId>,
    distance: HashMap<NodeId, u64>,
    previous: HashMap<NodeId, (NodeId, EdgeId)>,
}

impl RouteTable {
    /// Run Dijkstra from `root` over `edges` (undirected).
    pub fn compute<'a>(root: &NodeId, edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut adjacency: HashMap<&NodeId, Vec<(&NodeId, &EdgeId, u64)>> = HashMap::new();
        for edge in edges {
            let weight = u64::from(edge.weight);
            adjacency
                .entry(&edge.source)
                .or_default()
                .push((&edge.target, &edge.id, weight));
            adjacency
                .entry(&edge.target)
                .or_default()
                .push((&edge.source, &edge.id, weight));
        }

        let mut distance: HashMap<NodeId, u64> = HashMap::new();
        let mut previous: HashMap<NodeId, (NodeId, EdgeId)> = HashMap::new();
        let mut heap = BinaryHeap::new();

        distance.insert(root.clone(), 0);
        heap.push(Reverse((0u64, root.clone())));

        while let Some(Reverse((dist, node))) = heap.pop() {
            if distance.get(&node).is_some_and(|&best| dist > best) {
                continue;
            }
            let Some(neighbours) = adjacency.get(&node) else {
                continue;
            };
            for &(next, edge_id, weight) in neighbours {
                let candidate = dist.saturating_add(weight);
                let improves = distance.get(next).map_or(true, |&known| candidate < known);
                if improves {
                    distance.insert(next.clone(), candidate);
                    previous.insert(next.clone(), (node.clone(), edge_id.clone()));
                    heap.push(Reverse((candidate, next.clone())));
                }
            }
        }

        Self {
            root: Some(root.clone()),
            distance,
            previous,
        }
    }

    /// Shortest distance to `node`, if reachable.
    #[must_use]
    pub fn distance(&self, node: &NodeId) -> Option<u64> {
        self.distance.get(node).copied()
    }

    /// Full path from the root to `target`. Unreachable targets yield just
    /// the root, and the root itself yields a single element.
    #[must_use]
    pub fn path(&self, target: &NodeId) -> Vec<PathElement> {
        let mut reversed = Vec::new();
        let mut cursor = target.clone();
        while let Some((prev, edge)) = self.previous.get(&cursor) {
            reversed.push(PathElement::Node(cursor.clone()));
            reversed.push(PathElement::Edge(edge.clone()));
            cursor = prev.clone();
        }
        if let Some(root) = &self.root {
            reversed.push(PathElement::Node(root.clone()));
        }
        reversed.reverse();
        reversed
    }

    /// The edge leaving the root on the way to `target`.
    #[must_use]
    pub fn first_edge(&self, target: &NodeId) -> Option<EdgeId> {
        match self.path(target).get(1) {
            Some(PathElement::Edge(edge)) => Some(edge.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str, a: &str, b: &str, weight: u32) -> Edge {
        Edge::new(EdgeId::new(id), NodeId::from(a), NodeId::from(b), weight, false)
    }

    #[test]
    fn test_prefers_lighter_path() {
        let edges = vec![
            edge("ab", "a", "b", 1),
            edge("bc", "b", "c", 1),
            edge("ac", "a", "c", 5),
        ];
        let table = RouteTable::compute(&NodeId::from("a"), &edges);

        assert_eq!(table.distance(&NodeId::from("c")), Some(2));
        assert_eq!(table.first_edge(&NodeId::from("c")), Some(EdgeId::new("ab")));
        assert_eq!(table.path(&NodeId::from("c")).len(), 5);
    }

    #[test]
    fn test_unreachable_path_is_short() {
        let edges = vec![edge("bc", "b", "c", 1)];
        let table = RouteTable::compute(&NodeId::from("a"), &edges);

        assert_eq!(table.distance(&NodeId::from("c")), None);
        assert_eq!(table.path(&NodeId::from("c")).len(), 1);
        assert_eq!(table.first_edge(&NodeId::from("c")), None);
    }
}
