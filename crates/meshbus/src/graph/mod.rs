//! # Topology Graph
//!
//! A node's view of the bus: every known node descriptor plus one weighted
//! edge per established transport anywhere in the mesh.
//!
//! ## Mutations
//!
//! - **add_edge / remove_edge**: local handshake completion and disconnect.
//! - **merge_remote**: fold in a peer's gossiped view.
//! - **localize**: drop everything outside self's connected component.
//!
//! Every structural mutation bumps the revision and clears the cached hash
//! and route table.

mod edge;
mod hash;
mod routes;


pub use edge::{Edge, EdgeId};
pub use hash::GraphHash;
pub use routes::{PathElement, RouteTable};

use crate::descriptor::{NodeDescriptor, NodeId};
use crate::error::GraphError;
use crate::scope::Scope;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Serializable copy of a graph, as carried in gossip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    /// Structural hash of the snapshot.
    #[must_use]
    pub fn hash(&self) -> GraphHash {
        GraphHash::compute(&self.nodes, &self.edges)
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| &n.id == id)
    }
}

/// Node and edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

/// How to reach a node from self.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The target is self.
    Local,
    /// Leave through this edge.
    Via(EdgeId),
    /// The node is known but no path exists yet.
    Unreachable,
    /// The node is not in the graph.
    UnknownNode,
}

/// Topology graph owned by one bus node.
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    own: NodeDescriptor,
    remote: BTreeMap<NodeId, NodeDescriptor>,
    edges: BTreeMap<EdgeId, Edge>,
    removed_edges: HashSet<EdgeId>,
    revision: u64,
    hash_cache: OnceCell<GraphHash>,
    route_cache: OnceCell<RouteTable>,
}

impl TopologyGraph {
    /// Graph containing only the local node.
    pub fn new(own: NodeDescriptor) -> Self {
        Self {
            own,
            remote: BTreeMap::new(),
            edges: BTreeMap::new(),
            removed_edges: HashSet::new(),
            revision: 0,
            hash_cache: OnceCell::new(),
            route_cache: OnceCell::new(),
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    #[must_use]
    pub fn own_id(&self) -> &NodeId {
        &self.own.id
    }

    #[must_use]
    pub fn own_node(&self) -> &NodeDescriptor {
        &self.own
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeDescriptor> {
        if id == &self.own.id {
            Some(&self.own)
        } else {
            self.remote.get(id)
        }
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    #[must_use]
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// All nodes, self first.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        std::iter::once(&self.own).chain(self.remote.values())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id.clone()).collect()
    }

    #[must_use]
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: 1 + self.remote.len(),
            edges: self.edges.len(),
        }
    }

    /// Incremented on every structural change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn was_removed(&self, id: &EdgeId) -> bool {
        self.removed_edges.contains(id)
    }

    /// Structural hash, cached until the next mutation.
    pub fn hash(&self) -> GraphHash {
        self.hash_cache
            .get_or_init(|| GraphHash::compute(self.nodes(), self.edges.values()))
            .clone()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    fn routes(&self) -> &RouteTable {
        self.route_cache
            .get_or_init(|| RouteTable::compute(&self.own.id, self.edges.values()))
    }

    /// Shortest-path distance from self.
    #[must_use]
    pub fn distance(&self, id: &NodeId) -> Option<u64> {
        self.routes().distance(id)
    }

    #[must_use]
    pub fn path_to(&self, id: &NodeId) -> Vec<PathElement> {
        self.routes().path(id)
    }

    /// Next hop towards `target`.
    #[must_use]
    pub fn route_to(&self, target: &NodeId) -> Route {
        if target == &self.own.id {
            return Route::Local;
        }
        if !self.contains(target) {
            return Route::UnknownNode;
        }
        // Fewer than three elements (self, edge, target) means no route.
        if self.path_to(target).len() < 3 {
            return Route::Unreachable;
        }
        match self.routes().first_edge(target) {
            Some(edge) => Route::Via(edge),
            None => Route::Unreachable,
        }
    }

    // =========================================================================
    // Own descriptor
    // =========================================================================

    /// Mark `name` as handled by self. Returns whether the set changed.
    pub fn add_handled_event(&mut self, name: &str) -> bool {
        let changed = self.own.handled_events.insert(name.to_string());
        if changed {
            self.updated();
        }
        changed
    }

    /// Drop `name` from self's handled set. Returns whether the set changed.
    pub fn remove_handled_event(&mut self, name: &str) -> bool {
        let changed = self.own.handled_events.remove(name);
        if changed {
            self.updated();
        }
        changed
    }

    pub fn count_message(&mut self) {
        self.own.msg_count += 1;
    }

    pub fn count_lost_packet(&mut self) {
        self.own.lost_packets += 1;
    }

    /// Bump self's `last_info_time` ahead of a broadcast.
    pub fn touch_own(&mut self) -> u64 {
        self.own.touch()
    }

    /// Count a packet sent over an edge. Does not affect the hash.
    pub fn record_traffic(&mut self, id: &EdgeId) {
        if let Some(edge) = self.edges.get_mut(id) {
            edge.msg_count += 1;
        }
    }

    // =========================================================================
    // Structural mutation
    // =========================================================================

    fn invalidate(&mut self) {
        self.hash_cache = OnceCell::new();
        self.route_cache = OnceCell::new();
    }

    fn updated(&mut self) {
        self.revision += 1;
        self.invalidate();
    }

    /// Insert or replace an edge. Both endpoints must already be known.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        for end in [&edge.source, &edge.target] {
            if !self.contains(end) {
                return Err(GraphError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: end.clone(),
                });
            }
        }
        debug!(edge = %edge.id, source = %edge.source, target = %edge.target, "Adding edge");
        self.removed_edges.remove(&edge.id);
        self.edges.insert(edge.id.clone(), edge);
        self.updated();
        Ok(())
    }

    /// Remove an edge and remember it so stale gossip cannot resurrect it.
    pub fn remove_edge(&mut self, id: &EdgeId) -> bool {
        self.removed_edges.insert(id.clone());
        let removed = self.edges.remove(id).is_some();
        if removed {
            debug!(edge = %id, "Removed edge");
            self.updated();
        }
        removed
    }

    /// Keep only self's connected component.
    pub fn localize(&mut self) {
        let reachable = self.component(|_| true);
        let before = self.stats();

        self.remote.retain(|id, _| reachable.contains(id));
        self.edges
            .retain(|_, e| reachable.contains(&e.source) && reachable.contains(&e.target));

        let after = self.stats();
        if after != before {
            debug!(
                dropped_nodes = before.nodes - after.nodes,
                dropped_edges = before.edges - after.edges,
                "Localized graph"
            );
            self.updated();
        }
    }

    /// Nodes reachable from self over edges accepted by `follow`.
    fn component(&self, follow: impl Fn(&Edge) -> bool) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(self.own.id.clone());
        queue.push_back(self.own.id.clone());

        while let Some(current) = queue.pop_front() {
            for edge in self.edges.values().filter(|e| follow(e)) {
                if let Some(next) = edge.other_end(&current) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        seen
    }

    /// Fold a peer's view into this graph.
    ///
    /// Returns `Ok(false)` without touching anything when both views already
    /// share a structural hash, otherwise whether self's structure changed.
    /// All validation happens before the first mutation, so an error leaves
    /// the graph as it was.
    pub fn merge_remote(
        &mut self,
        remote_id: &NodeId,
        view: &GraphSnapshot,
        suppress_localize: bool,
    ) -> Result<bool, GraphError> {
        let own_id = self.own.id.clone();
        let local_hash = self.hash();
        let remote_hash = view.hash();

        if local_hash == remote_hash {
            let local = self.stats();
            if local.nodes != view.nodes.len() || local.edges != view.edges.len() {
                return Err(GraphError::HashCollision {
                    hash: local_hash.to_string(),
                    local_nodes: local.nodes,
                    local_edges: local.edges,
                    remote_nodes: view.nodes.len(),
                    remote_edges: view.edges.len(),
                });
            }
            return Ok(false);
        }

        if view.node(remote_id).is_none() {
            return Err(GraphError::MissingOwnNode);
        }

        // The remote's copy of self and of self's links is never trusted.
        let incoming_nodes: BTreeMap<&NodeId, &NodeDescriptor> = view
            .nodes
            .iter()
            .filter(|n| n.id != own_id)
            .map(|n| (&n.id, n))
            .collect();
        let incoming_edges: Vec<&Edge> =
            view.edges.iter().filter(|e| !e.touches(&own_id)).collect();

        for edge in &incoming_edges {
            for end in [&edge.source, &edge.target] {
                if !incoming_nodes.contains_key(end) {
                    return Err(GraphError::DanglingEdge {
                        edge: edge.id.clone(),
                        node: end.clone(),
                    });
                }
            }
            if let Some(existing) = self.edges.get(&edge.id) {
                if !existing.same_endpoints(edge) {
                    return Err(GraphError::EdgeConflict {
                        edge: edge.id.clone(),
                        local_source: existing.source.clone(),
                        local_target: existing.target.clone(),
                        remote_source: edge.source.clone(),
                        remote_target: edge.target.clone(),
                    });
                }
            }
        }

        // Union; ties go to the remote copy.
        for (id, node) in incoming_nodes {
            let keep_local = self
                .remote
                .get(id)
                .is_some_and(|existing| existing.last_info_time > node.last_info_time);
            if !keep_local {
                self.remote.insert(id.clone(), node.clone());
            }
        }
        for edge in &incoming_edges {
            self.edges.insert(edge.id.clone(), (*edge).clone());
        }

        // The remote is authoritative about its own links.
        let remote_edge_ids: HashSet<&EdgeId> = view.edges.iter().map(|e| &e.id).collect();
        let stale: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches(remote_id) && !e.touches(&own_id))
            .filter(|e| !remote_edge_ids.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        for id in &stale {
            self.edges.remove(id);
        }

        let removed = &self.removed_edges;
        self.edges.retain(|id, _| !removed.contains(id));

        self.invalidate();
        if !suppress_localize {
            self.localize();
        }

        let changed = self.hash() != local_hash;
        if changed {
            self.updated();
        }

        debug!(
            remote = %remote_id,
            pruned = stale.len(),
            changed,
            nodes = self.stats().nodes,
            edges = self.stats().edges,
            "Merged remote graph"
        );
        Ok(changed)
    }

    // =========================================================================
    // Scope expansion
    // =========================================================================

    /// Ids of nodes within `scope` that handle `event`, in id order.
    pub fn expand_scope(&self, scope: Scope, event: &str) -> Vec<NodeId> {
        let handles = |id: &NodeId| self.node(id).is_some_and(|n| n.handles(event));

        let candidates: BTreeSet<NodeId> = match scope {
            Scope::Immediate => std::iter::once(self.own.id.clone()).collect(),
            Scope::Local => self.component(|e| e.is_local),
            Scope::Neighbours => {
                let mut set: BTreeSet<NodeId> = self
                    .edges
                    .values()
                    .filter_map(|e| e.other_end(&self.own.id).cloned())
                    .collect();
                set.insert(self.own.id.clone());
                set
            }
            Scope::Nearest => {
                if self.own.handles(event) {
                    return vec![self.own.id.clone()];
                }
                return self
                    .remote
                    .values()
                    .filter(|n| n.handles(event))
                    .filter_map(|n| self.distance(&n.id).map(|d| (d, &n.id)))
                    .min()
                    .map(|(_, id)| vec![id.clone()])
                    .unwrap_or_default();
            }
            Scope::Global => self.nodes().map(|n| n.id.clone()).collect(),
        };

        candidates.into_iter().filter(|id| handles(id)).collect()
    }

    /// String-scoped variant of [`TopologyGraph::expand_scope`].
    pub fn expand_scope_named(&self, scope: &str, event: &str) -> Result<Vec<NodeId>, GraphError> {
        let scope: Scope = scope.parse()?;
        Ok(self.expand_scope(scope, event))
    }
}
