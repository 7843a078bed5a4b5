//! # Transports
//!
//! A transport is one bidirectional link to a peer node. The bus only sees
//! it as a sink and a stream of [`Frame`]s; the stream ending means the peer
//! is gone.
//!
//! ## Frames
//!
//! | event | data |
//! |---|---|
//! | `bus::handshakeSYN` | `{nodeId, edgeId}` |
//! | `bus::handshakeSYNACK` | `{nodeId, edgeId}` |
//! | `bus::nodeInfoInitial` | hex of the compressed topology snapshot |
//! | `bus::packet` | a routed [`Packet`] |
//! | `disconnect` | `{reason}` |
//!
//! Implementations: [`memory::pair`] for in-process links and tests,
//! [`tcp::TcpTransport`] for sockets.

pub mod handshake;
pub mod memory;
pub mod tcp;

pub use handshake::{Handshake, HandshakeStep, LinkState};

use crate::descriptor::NodeId;
use crate::error::TransportError;
use crate::packet::Packet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default upper bound on one encoded frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Handshake payload: sender id plus its current candidate edge suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeHello {
    pub node_id: NodeId,
    pub edge_id: String,
}

/// Unit of exchange on a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Frame {
    #[serde(rename = "bus::handshakeSYN")]
    HandshakeSyn(HandshakeHello),
    #[serde(rename = "bus::handshakeSYNACK")]
    HandshakeSynAck(HandshakeHello),
    #[serde(rename = "bus::nodeInfoInitial")]
    NodeInfoInitial(#[serde(with = "hex_bytes")] Vec<u8>),
    #[serde(rename = "bus::packet")]
    Packet(Packet),
    #[serde(rename = "disconnect")]
    Disconnect { reason: String },
}

impl Frame {
    /// Wire name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeSyn(_) => "bus::handshakeSYN",
            Self::HandshakeSynAck(_) => "bus::handshakeSYNACK",
            Self::NodeInfoInitial(_) => "bus::nodeInfoInitial",
            Self::Packet(_) => "bus::packet",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Release the link. Further sends fail.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Inbound half of a transport.
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, or `None` once the link is gone.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Per-link settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Edge weight used for shortest paths.
    pub weight: u32,
    /// Whether the link stays inside one host; drives the `local` scope.
    pub is_local: bool,
    pub max_frame_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            weight: 1,
            is_local: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransportOptions {
    #[must_use]
    pub fn local() -> Self {
        Self {
            is_local: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

/// An unattached link, ready to be handed to a bus node.
pub struct Transport {
    options: TransportOptions,
    sink: Box<dyn FrameSink>,
    stream: Box<dyn FrameStream>,
}

impl Transport {
    pub fn new(options: TransportOptions, sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) -> Self {
        Self {
            options,
            sink,
            stream,
        }
    }

    #[must_use]
    pub fn weight(&self) -> u32 {
        self.options.weight
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.options.is_local
    }

    #[must_use]
    pub fn options(&self) -> TransportOptions {
        self.options
    }

    pub fn into_parts(self) -> (TransportOptions, Box<dyn FrameSink>, Box<dyn FrameStream>) {
        (self.options, self.sink, self.stream)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").field("options", &self.options).finish()
    }
}

/// Node-local handle for an attached transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub(crate) u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}
