//! # Error Types
//!
//! One `thiserror` enum per concern. Routing failures are not errors: they
//! surface as lost-packet counts or re-queues.

use crate::descriptor::NodeId;
use crate::graph::EdgeId;
use serde_json::Value;
use thiserror::Error;

/// Topology graph errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Scope name not recognised.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Two views share a structural hash but disagree on their shape.
    #[error("Hash collision: equal hash {hash} but {local_nodes}/{local_edges} vs {remote_nodes}/{remote_edges} nodes/edges")]
    HashCollision {
        hash: String,
        local_nodes: usize,
        local_edges: usize,
        remote_nodes: usize,
        remote_edges: usize,
    },

    /// An edge id is known with different endpoints.
    #[error("Edge conflict on {edge}: local {local_source}->{local_target}, remote {remote_source}->{remote_target}")]
    EdgeConflict {
        edge: EdgeId,
        local_source: NodeId,
        local_target: NodeId,
        remote_source: NodeId,
        remote_target: NodeId,
    },

    /// The local node disappeared from its own graph.
    #[error("Own node missing from graph")]
    MissingOwnNode,

    /// An edge references a node that is not in the graph.
    #[error("Edge {edge} references unknown node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The link is gone.
    #[error("Transport closed")]
    Closed,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Inbound or outbound frame exceeds the configured limit.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame could not be decoded.
    #[error("Frame decode error: {0}")]
    Decode(String),

    /// Transport already bound to another node.
    #[error("Transport already attached to {owner}, refusing {requested}")]
    AlreadyAttached { owner: NodeId, requested: NodeId },
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Self::Closed,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Snapshot codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Compression failed: {0}")]
    Compress(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("Snapshot JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Errors surfaced through the bus handle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// No node in the requested scope handles this name.
    #[error("No nodes for event/request type {name}")]
    NonexistentType { name: String },

    /// A handler rejected the request; carries the rejection payload.
    #[error("Request failed: {0}")]
    RequestFailed(Value),

    /// Scope name not recognised.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Internal consistency violated; the node stops.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// The node's event loop is no longer running.
    #[error("Bus node stopped")]
    NodeStopped,

    /// Component is not plugged into a bus.
    #[error("Component not plugged into a bus")]
    NotPlugged,

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl BusError {
    /// Whether this is the "no eligible recipient" error.
    #[must_use]
    pub fn is_nonexistent_type(&self) -> bool {
        matches!(self, Self::NonexistentType { .. })
    }
}

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;
