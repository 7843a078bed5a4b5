//! # Packets
//!
//! Routed application messages. A packet is an immutable value: every step
//! of forwarding derives a new packet instead of editing one in place.
//!
//! ```text
//! { "type": "request", "sender": "a-..", "seenBy": [..], "recipients": [..],
//!   "immediateSender": { "id": "..", "graphHash": ".." }, "hops": 2,
//!   "name": "getTime", "data": {..}, "requestId": "a-..-7", "singleResponse": true }
//! ```

use crate::descriptor::NodeId;
use crate::graph::GraphHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Correlation id of a request: `<origin node id>-<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Build the id for the `counter`-th request issued by `origin`.
    pub fn new(origin: &NodeId, counter: u64) -> Self {
        Self(format!("{}-{}", origin, counter))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome carried by a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseState {
    Success,
    Failure,
}

/// The last node that relayed a packet, with its graph hash at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImmediateSender {
    pub id: NodeId,
    pub graph_hash: GraphHash,
}

/// Kind-specific packet contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PacketBody {
    Event {
        name: String,
        #[serde(default)]
        data: Value,
    },
    Request {
        name: String,
        #[serde(default)]
        data: Value,
        #[serde(rename = "requestId")]
        request_id: RequestId,
        #[serde(rename = "singleResponse", default)]
        single_response: bool,
    },
    Response {
        #[serde(rename = "responseTo")]
        response_to: RequestId,
        state: ResponseState,
        #[serde(default)]
        result: Value,
    },
}

/// A routed bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    sender: NodeId,
    #[serde(default)]
    seen_by: Vec<NodeId>,
    recipients: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    immediate_sender: Option<ImmediateSender>,
    #[serde(default)]
    hops: u32,
    #[serde(flatten)]
    body: PacketBody,
}

impl Packet {
    fn fresh(sender: NodeId, recipients: Vec<NodeId>, body: PacketBody) -> Self {
        Self {
            sender,
            seen_by: Vec::new(),
            recipients,
            immediate_sender: None,
            hops: 0,
            body,
        }
    }

    /// New event packet.
    pub fn event(sender: NodeId, recipients: Vec<NodeId>, name: impl Into<String>, data: Value) -> Self {
        Self::fresh(
            sender,
            recipients,
            PacketBody::Event {
                name: name.into(),
                data,
            },
        )
    }

    /// New request packet.
    pub fn request(
        sender: NodeId,
        recipients: Vec<NodeId>,
        name: impl Into<String>,
        data: Value,
        request_id: RequestId,
        single_response: bool,
    ) -> Self {
        Self::fresh(
            sender,
            recipients,
            PacketBody::Request {
                name: name.into(),
                data,
                request_id,
                single_response,
            },
        )
    }

    /// New response packet addressed to the requester.
    pub fn response(
        sender: NodeId,
        requester: NodeId,
        response_to: RequestId,
        state: ResponseState,
        result: Value,
    ) -> Self {
        Self::fresh(
            sender,
            vec![requester],
            PacketBody::Response {
                response_to,
                state,
                result,
            },
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn sender(&self) -> &NodeId {
        &self.sender
    }

    #[must_use]
    pub fn seen_by(&self) -> &[NodeId] {
        &self.seen_by
    }

    #[must_use]
    pub fn recipients(&self) -> &[NodeId] {
        &self.recipients
    }

    #[must_use]
    pub fn immediate_sender(&self) -> Option<&ImmediateSender> {
        self.immediate_sender.as_ref()
    }

    /// Number of relays this packet went through.
    #[must_use]
    pub fn hops(&self) -> u32 {
        self.hops
    }

    #[must_use]
    pub fn body(&self) -> &PacketBody {
        &self.body
    }

    /// Event or request name; `None` for responses.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.body {
            PacketBody::Event { name, .. } | PacketBody::Request { name, .. } => Some(name),
            PacketBody::Response { .. } => None,
        }
    }

    /// Event or request payload; `None` for responses.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            PacketBody::Event { data, .. } | PacketBody::Request { data, .. } => Some(data),
            PacketBody::Response { .. } => None,
        }
    }

    #[must_use]
    pub fn has_seen(&self, node: &NodeId) -> bool {
        self.seen_by.contains(node)
    }

    // =========================================================================
    // Derived packets
    // =========================================================================

    /// Same packet addressed to a different recipient list.
    #[must_use]
    pub fn with_recipients(mut self, recipients: Vec<NodeId>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Same packet with `node` appended to the visited list.
    #[must_use]
    pub fn seen_by_node(mut self, node: NodeId) -> Self {
        self.seen_by.push(node);
        self
    }

    /// Same packet stamped with the relaying node.
    #[must_use]
    pub fn stamped(mut self, relay: ImmediateSender) -> Self {
        self.immediate_sender = Some(relay);
        self
    }

    /// Same packet with the hop counter advanced.
    #[must_use]
    pub fn relayed(mut self) -> Self {
        self.hops = self.hops.saturating_add(1);
        self
    }

    /// Same event or request with a new payload. Responses are returned unchanged.
    #[must_use]
    pub fn with_data(mut self, new_data: Value) -> Self {
        match &mut self.body {
            PacketBody::Event { data, .. } | PacketBody::Request { data, .. } => *data = new_data,
            PacketBody::Response { .. } => {}
        }
        self
    }
}
