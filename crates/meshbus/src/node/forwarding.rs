//! Packet forwarding and local delivery.
//!
//! ## Algorithm
//!
//! 1. Drop self-echoes and packets over the hop cap.
//! 2. If self already saw the packet, or the relay's graph hash differs from
//!    ours, schedule gossip and leave `seenBy` alone; otherwise append self.
//! 3. Stamp `immediateSender = {self, hash}`.
//! 4. Per recipient: self is delivered last; unknown nodes count as lost;
//!    known but unroutable nodes get a single-recipient copy parked until
//!    the next graph revision.
//! 5. One packet per next-hop transport.

use super::correlation::Arrival;
use super::{BusNode, Command, PacketFilter, NODE_INFO_EVENT};
use crate::descriptor::NodeId;
use crate::error::{BusError, BusResult};
use crate::graph::Route;
use crate::packet::{ImmediateSender, Packet, PacketBody, ResponseState};
use crate::transport::{Frame, TransportId};
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

fn apply_filters(filters: &[PacketFilter], mut packet: Packet) -> BusResult<Packet> {
    for filter in filters {
        packet = filter(packet)
            .ok_or_else(|| BusError::Invariant("packet filter returned no packet".to_string()))?;
    }
    Ok(packet)
}

impl BusNode {
    pub(super) fn filter_output(&self, packet: Packet) -> BusResult<Packet> {
        apply_filters(&self.output_filters, packet)
    }

    fn filter_input(&self, packet: Packet) -> BusResult<Packet> {
        apply_filters(&self.input_filters, packet)
    }

    /// Route a packet one step further.
    pub(super) fn forward(&mut self, incoming: Packet) -> BusResult<()> {
        if incoming.immediate_sender().is_some_and(|s| s.id == self.id) {
            return Ok(());
        }
        self.graph.count_message();

        if incoming.hops() > self.config.max_hops {
            warn!(
                node = %self.id,
                sender = %incoming.sender(),
                hops = incoming.hops(),
                "Dropping packet over hop limit"
            );
            self.graph.count_lost_packet();
            return Ok(());
        }
        if incoming.recipients().is_empty() {
            return Err(BusError::Invariant(format!(
                "packet from {} has no recipients",
                incoming.sender()
            )));
        }

        let hash = self.graph.hash();
        let stale = incoming.has_seen(&self.id)
            || incoming
                .immediate_sender()
                .is_some_and(|relay| relay.graph_hash != hash);

        let mut packet = incoming.clone();
        if stale {
            self.schedule_gossip();
        } else {
            packet = packet.seen_by_node(self.id.clone());
        }
        let packet = packet.stamped(ImmediateSender {
            id: self.id.clone(),
            graph_hash: hash,
        });

        let mut for_self = false;
        let mut by_link: BTreeMap<TransportId, Vec<NodeId>> = BTreeMap::new();

        for recipient in packet.recipients() {
            match self.graph.route_to(recipient) {
                Route::Local => for_self = true,
                Route::UnknownNode => {
                    warn!(node = %self.id, recipient = %recipient, "No such node, packet lost");
                    self.graph.count_lost_packet();
                }
                Route::Unreachable => {
                    self.requeue(incoming.clone().with_recipients(vec![recipient.clone()]));
                }
                Route::Via(edge) => match self.edge_links.get(&edge) {
                    Some(tid) => by_link.entry(*tid).or_default().push(recipient.clone()),
                    None => {
                        self.requeue(incoming.clone().with_recipients(vec![recipient.clone()]));
                    }
                },
            }
        }

        for (tid, recipients) in by_link {
            let Some(link) = self.links.get(&tid) else {
                continue;
            };
            trace!(
                node = %self.id,
                transport = %tid,
                recipients = recipients.len(),
                "Writing packet"
            );
            link.send(Frame::Packet(packet.clone().with_recipients(recipients).relayed()));
            if let Some(edge) = link.edge.clone() {
                self.graph.record_traffic(&edge);
            }
        }

        if for_self {
            self.deliver_local(packet)?;
        }
        Ok(())
    }

    /// Park a packet until the graph changes, then run it through
    /// [`BusNode::forward`] again.
    fn requeue(&self, packet: Packet) {
        debug!(
            node = %self.id,
            recipient = ?packet.recipients().first(),
            "No route yet, re-queueing packet"
        );
        let mut updates = self.revision_tx.subscribe();
        self.post_later(async move {
            updates.changed().await.ok()?;
            Some(Command::Requeue(packet))
        });
    }

    fn deliver_local(&mut self, packet: Packet) -> BusResult<()> {
        let packet = self.filter_input(packet)?;
        let sender = packet.sender().clone();

        match packet.body().clone() {
            PacketBody::Event { name, data } => {
                trace!(node = %self.id, event = %name, "Local event");
                if name == NODE_INFO_EVENT {
                    return self.on_node_info(&data);
                }
                for listener in self.listeners.handlers(&name) {
                    let fut = listener(data.clone());
                    let node = self.id.clone();
                    let event = name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = fut.await {
                            warn!(node = %node, event = %event, error = %e, "Event listener failed");
                        }
                    });
                }
            }
            PacketBody::Request {
                name,
                data,
                request_id,
                ..
            } => {
                trace!(node = %self.id, request = %name, request_id = %request_id, "Local request");
                let calls: Vec<_> = self
                    .listeners
                    .handlers(&name)
                    .into_iter()
                    .map(|h| h(data.clone()))
                    .collect();

                self.post_later(async move {
                    let mut successes = Vec::with_capacity(calls.len());
                    let mut failure = None;
                    for outcome in join_all(calls).await {
                        match outcome {
                            Ok(value) => successes.push(value),
                            Err(payload) => {
                                failure.get_or_insert(payload);
                            }
                        }
                    }
                    let (state, result) = match failure {
                        Some(payload) => (ResponseState::Failure, payload),
                        None => (ResponseState::Success, Value::Array(successes)),
                    };
                    Some(Command::Responded {
                        requester: sender,
                        request_id,
                        state,
                        result,
                    })
                });
            }
            PacketBody::Response {
                response_to,
                state,
                result,
            } => {
                trace!(node = %self.id, request_id = %response_to, "Local response");
                let arrival = Arrival {
                    sender,
                    state,
                    result,
                };
                self.poke_waiter(&response_to, Some(arrival))?;
            }
        }
        Ok(())
    }
}
