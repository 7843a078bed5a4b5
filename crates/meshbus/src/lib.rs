//! # Meshbus - Peer-to-Peer Event Bus
//!
//! Nodes connect over arbitrary transports into a mesh. Each node keeps a
//! weighted view of the whole connected topology, learned through gossip,
//! and uses it to route named events and requests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  Frame  ┌──────────┐  Frame  ┌──────────┐
//! │  Node A  │ ◀─────▶ │  Node B  │ ◀─────▶ │  Node C  │
//! │  graph   │         │  graph   │         │  graph   │
//! └──────────┘         └──────────┘         └──────────┘
//!      ▲ emit / request / on
//!      │
//!  BusHandle
//! ```
//!
//! - **Topology:** [`TopologyGraph`] merges peers' views, drops everything
//!   outside self's connected component and answers shortest-path queries.
//! - **Forwarding:** packets follow the shortest path; nodes with a stale
//!   view stop marking packets as seen and re-broadcast their own view.
//! - **Scopes:** `immediate`, `local`, `neighbours`, `nearest`, `global`.
//! - **Requests:** answers are collected from every targeted node that is
//!   still in the graph.
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> meshbus::BusResult<()> {
//! use meshbus::{memory, BusConfig, BusNode, TransportOptions};
//! use serde_json::json;
//!
//! let a = BusNode::spawn(BusConfig::default());
//! let b = BusNode::spawn(BusConfig::default());
//! let (ta, tb, _link) = memory::pair(TransportOptions::default());
//! a.add_transport(ta).await?;
//! b.add_transport(tb).await?;
//!
//! b.on("add", |v| async move { Ok(json!(v["x"].as_i64().unwrap_or(0) + 1)) }).await?;
//! let answer = a.request("add", json!({"x": 1})).await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod codec;
pub mod component;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod node;
pub mod packet;
pub mod scope;
pub mod transport;

// Re-export main types
pub use codec::{NoOpCodec, SnapshotCodec, ZstdCodec};
pub use component::{Component, HandlerTable, SENDER_COMPONENT_FIELD};
pub use config::BusConfig;
pub use descriptor::{NodeDescriptor, NodeId};
pub use error::{BusError, BusResult, CodecError, GraphError, TransportError};
pub use graph::{Edge, EdgeId, GraphHash, GraphSnapshot, GraphStats, TopologyGraph};
pub use node::{handler, BusHandle, BusNode, BusStats, Handler, ListenerId, NodeInfo, PacketFilter, NODE_INFO_EVENT};
pub use packet::{Packet, PacketBody, RequestId, ResponseState};
pub use scope::Scope;
pub use transport::memory::{self, LinkControl};
pub use transport::tcp::TcpTransport;
pub use transport::{Frame, FrameSink, FrameStream, Transport, TransportId, TransportOptions};
