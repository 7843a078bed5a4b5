//! # Link Handshake
//!
//! Three-way exchange that makes both ends of a transport agree on one edge
//! id.
//!
//! ## Algorithm
//!
//! 1. On attach each side draws a random candidate suffix.
//! 2. Both sides send SYN `{nodeId, candidate}`.
//! 3. On SYN from the peer: adopt the smaller candidate, answer SYN-ACK and
//!    send the initial topology snapshot.
//! 4. On SYN-ACK: adopt the smaller candidate and send the snapshot.
//! 5. On the peer's snapshot: derive `sorted(a, b) + "-" + candidate` and
//!    mark the link established.
//!
//! Frames on one link are ordered, so a peer's snapshot always arrives after
//! its SYN and both sides have already converged on the minimum.

use super::HandshakeHello;
use crate::descriptor::NodeId;
use crate::error::TransportError;
use crate::graph::EdgeId;
use rand::Rng;
use tracing::debug;

/// Transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unbound,
    Attached,
    Handshaking,
    Established,
    Disconnected,
}

/// What the owner must do after a handshake frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Answer with SYN-ACK carrying this hello, then send the snapshot.
    ReplyAndSnapshot(HandshakeHello),
    /// Send the snapshot.
    Snapshot,
    /// Self-echo or stale frame.
    Ignore,
}

/// Handshake state for one transport.
#[derive(Debug, Clone)]
pub struct Handshake {
    owner: Option<NodeId>,
    peer: Option<NodeId>,
    candidate: String,
    state: LinkState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            owner: None,
            peer: None,
            candidate: String::new(),
            state: LinkState::Unbound,
        }
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    #[must_use]
    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    #[must_use]
    pub fn peer(&self) -> Option<&NodeId> {
        self.peer.as_ref()
    }

    /// Bind to `owner`. Attaching twice to the same node is a no-op.
    pub fn attach(&mut self, owner: &NodeId) -> Result<(), TransportError> {
        match &self.owner {
            Some(current) if current == owner => Ok(()),
            Some(current) => Err(TransportError::AlreadyAttached {
                owner: current.clone(),
                requested: owner.clone(),
            }),
            None => {
                self.owner = Some(owner.clone());
                self.candidate = format!("{:016x}", rand::thread_rng().gen::<u64>());
                self.state = LinkState::Attached;
                Ok(())
            }
        }
    }

    fn hello(&self) -> Result<HandshakeHello, TransportError> {
        let owner = self.owner.clone().ok_or(TransportError::Closed)?;
        Ok(HandshakeHello {
            node_id: owner,
            edge_id: self.candidate.clone(),
        })
    }

    /// Opening SYN.
    pub fn syn(&mut self) -> Result<HandshakeHello, TransportError> {
        let hello = self.hello()?;
        self.state = LinkState::Handshaking;
        Ok(hello)
    }

    fn adopt(&mut self, hello: &HandshakeHello) {
        if hello.edge_id < self.candidate {
            self.candidate = hello.edge_id.clone();
        }
        self.peer = Some(hello.node_id.clone());
        if self.state == LinkState::Attached {
            self.state = LinkState::Handshaking;
        }
    }

    fn is_echo(&self, hello: &HandshakeHello) -> bool {
        self.owner.as_ref() == Some(&hello.node_id)
    }

    pub fn on_syn(&mut self, hello: &HandshakeHello) -> Result<HandshakeStep, TransportError> {
        if self.is_echo(hello) || self.state == LinkState::Disconnected {
            return Ok(HandshakeStep::Ignore);
        }
        self.adopt(hello);
        debug!(peer = %hello.node_id, candidate = %self.candidate, "Received SYN");
        Ok(HandshakeStep::ReplyAndSnapshot(self.hello()?))
    }

    pub fn on_syn_ack(&mut self, hello: &HandshakeHello) -> HandshakeStep {
        if self.is_echo(hello) || self.state == LinkState::Disconnected {
            return HandshakeStep::Ignore;
        }
        self.adopt(hello);
        debug!(peer = %hello.node_id, candidate = %self.candidate, "Received SYN-ACK");
        HandshakeStep::Snapshot
    }

    /// Derive the shared edge id once the peer's snapshot arrived.
    pub fn establish(&mut self, peer: &NodeId) -> Result<EdgeId, TransportError> {
        let owner = self.owner.as_ref().ok_or(TransportError::Closed)?;
        let edge = EdgeId::between(owner, peer, &self.candidate);
        self.peer = Some(peer.clone());
        self.state = LinkState::Established;
        Ok(edge)
    }

    pub fn disconnect(&mut self) {
        self.state = LinkState::Disconnected;
    }
}
