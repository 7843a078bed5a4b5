//! Topology gossip payloads.
//!
//! A node advertises its descriptor plus its full graph. The JSON is
//! compressed with the node's [`SnapshotCodec`]; as a routed event the
//! compressed bytes travel hex-encoded.

use crate::codec::SnapshotCodec;
use crate::descriptor::NodeDescriptor;
use crate::error::CodecError;
use crate::graph::GraphSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the routed gossip event.
pub const NODE_INFO_EVENT: &str = "bus::nodeInfo";

/// `{id, handledEvents, msgCount, lostPackets, hostname, pid, lastInfoTime, graph}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(flatten)]
    pub descriptor: NodeDescriptor,
    pub graph: GraphSnapshot,
}

pub(crate) fn encode(codec: &dyn SnapshotCodec, info: &NodeInfo) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(info)?;
    codec.compress(&json)
}

pub(crate) fn decode(codec: &dyn SnapshotCodec, bytes: &[u8]) -> Result<NodeInfo, CodecError> {
    let json = codec.decompress(bytes)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Decode the payload of a routed `bus::nodeInfo` event.
pub(crate) fn decode_event(codec: &dyn SnapshotCodec, data: &Value) -> Result<NodeInfo, CodecError> {
    let encoded = data
        .as_str()
        .ok_or_else(|| CodecError::Json("node info payload is not a string".to_string()))?;
    let bytes = hex::decode(encoded).map_err(|e| CodecError::Decompress(e.to_string()))?;
    decode(codec, &bytes)
}

pub(crate) fn event_payload(bytes: &[u8]) -> Value {
    Value::String(hex::encode(bytes))
}
