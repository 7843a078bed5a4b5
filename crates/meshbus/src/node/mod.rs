//! # Bus Node
//!
//! The orchestrator. One actor task per node owns the topology graph, the
//! attached links, the listener table and the correlation table. Every
//! mutation runs inside that task, one command at a time; callers talk to it
//! through a cloneable [`BusHandle`].
//!
//! ```text
//!  BusHandle ──Command──▶ ┌───────────────┐ ──Frame──▶ writer task ──▶ FrameSink
//!                         │  BusNode task │
//!  reader task ─Inbound─▶ │  graph, links │ ◀─Requeue── revision watch
//!                         │  waiters      │ ◀─Responded─ handler tasks
//!                         └───────────────┘
//! ```
//!
//! Suspension happens only in the spawned tasks: socket I/O, handler futures
//! and "wait for the next graph revision".

mod correlation;
mod forwarding;
mod gossip;
mod handlers;


pub use gossip::{NodeInfo, NODE_INFO_EVENT};
pub use handlers::{handler, Handler, ListenerId, PacketFilter};

use crate::codec::{SnapshotCodec, ZstdCodec};
use crate::config::BusConfig;
use crate::descriptor::{NodeDescriptor, NodeId};
use crate::error::{BusError, BusResult, GraphError, TransportError};
use crate::graph::{Edge, EdgeId, GraphHash, GraphSnapshot, GraphStats, Route, TopologyGraph};
use crate::packet::{Packet, RequestId, ResponseState};
use crate::scope::Scope;
use crate::transport::{Frame, Handshake, HandshakeStep, Transport, TransportId, TransportOptions};
use correlation::{outcome_result, Arrival, ResponseWaiter, WaiterOutcome};
use handlers::ListenerTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, trace, warn};

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Snapshot of a node's counters and topology view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Requests still waiting for answers.
    pub unanswered: usize,
    pub msg_count: u64,
    pub lost_packets: u64,
    pub id: NodeId,
    pub graph: GraphSnapshot,
}

// =============================================================================
// COMMANDS
// =============================================================================

pub(crate) enum Command {
    AddTransport {
        transport: Transport,
        reply: oneshot::Sender<TransportId>,
    },
    Disconnect {
        transport: TransportId,
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    Inbound {
        transport: TransportId,
        frame: Frame,
    },
    LinkClosed {
        transport: TransportId,
    },
    Emit {
        name: String,
        data: Value,
        scope: Scope,
        reply: oneshot::Sender<()>,
    },
    Request {
        name: String,
        data: Value,
        scope: Scope,
        reply: oneshot::Sender<BusResult<Value>>,
    },
    On {
        name: String,
        handler: Handler,
        reply: oneshot::Sender<ListenerId>,
    },
    RemoveListener {
        id: ListenerId,
        reply: oneshot::Sender<bool>,
    },
    AddInputFilter {
        filter: PacketFilter,
        reply: oneshot::Sender<()>,
    },
    AddOutputFilter {
        filter: PacketFilter,
        reply: oneshot::Sender<()>,
    },
    Stats(oneshot::Sender<BusStats>),
    GraphStats(oneshot::Sender<GraphStats>),
    ListIds(oneshot::Sender<Vec<NodeId>>),
    FlushGossip,
    Requeue(Packet),
    Responded {
        requester: NodeId,
        request_id: RequestId,
        state: ResponseState,
        result: Value,
    },
}

// =============================================================================
// LINKS
// =============================================================================

/// An attached transport as seen by the node.
struct Link {
    options: TransportOptions,
    handshake: Handshake,
    frames: mpsc::UnboundedSender<Frame>,
    reader: JoinHandle<()>,
    edge: Option<EdgeId>,
}

impl Link {
    fn send(&self, frame: Frame) {
        if self.frames.send(frame).is_err() {
            trace!("Writer task gone, dropping frame");
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// =============================================================================
// NODE
// =============================================================================

/// Actor state of one bus node. Created through [`BusNode::spawn`].
pub struct BusNode {
    id: NodeId,
    config: BusConfig,
    codec: Arc<dyn SnapshotCodec>,
    graph: TopologyGraph,
    commands: mpsc::WeakUnboundedSender<Command>,
    revision_tx: watch::Sender<u64>,
    published_revision: u64,

    links: BTreeMap<TransportId, Link>,
    edge_links: HashMap<EdgeId, TransportId>,
    connecting: BTreeSet<TransportId>,
    next_transport: u64,

    listeners: ListenerTable,
    input_filters: Vec<PacketFilter>,
    output_filters: Vec<PacketFilter>,

    waiters: BTreeMap<RequestId, ResponseWaiter>,
    request_counter: u64,

    gossip_pending: bool,
    last_published: Option<GraphHash>,
}

impl BusNode {
    /// Start a node with zstd-compressed gossip. Must be called inside a
    /// tokio runtime.
    pub fn spawn(config: BusConfig) -> BusHandle {
        let codec = Arc::new(ZstdCodec::new(config.compression_level));
        Self::spawn_with_codec(config, codec)
    }

    /// Start a node with a custom snapshot codec. Every node on a mesh must
    /// use the same codec.
    pub fn spawn_with_codec(config: BusConfig, codec: Arc<dyn SnapshotCodec>) -> BusHandle {
        let descriptor = NodeDescriptor::local(config.hostname.clone());
        let id = descriptor.id.clone();
        let mut graph = TopologyGraph::new(descriptor);
        graph.add_handled_event(NODE_INFO_EVENT);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (revision_tx, revision_rx) = watch::channel(graph.revision());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let node = Self {
            id: id.clone(),
            config,
            codec,
            published_revision: graph.revision(),
            graph,
            commands: command_tx.downgrade(),
            revision_tx,
            links: BTreeMap::new(),
            edge_links: HashMap::new(),
            connecting: BTreeSet::new(),
            next_transport: 0,
            listeners: ListenerTable::default(),
            input_filters: Vec::new(),
            output_filters: Vec::new(),
            waiters: BTreeMap::new(),
            request_counter: 0,
            gossip_pending: false,
            last_published: None,
        };

        info!(node = %id, "Starting bus node");
        tokio::spawn(node.run(command_rx, shutdown_rx));

        BusHandle {
            id,
            commands: command_tx,
            revision: revision_rx,
            shutdown: Arc::new(shutdown_tx),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            let result = self.handle(command).and_then(|()| self.publish_revision());
            match result {
                Ok(()) => {}
                Err(BusError::Invariant(reason)) => {
                    error!(node = %self.id, reason = %reason, "Invariant violated, stopping bus node");
                    break;
                }
                Err(e) => {
                    error!(node = %self.id, error = %e, "Command failed");
                }
            }
        }

        info!(node = %self.id, links = self.links.len(), unanswered = self.waiters.len(), "Bus node stopped");
    }

    fn handle(&mut self, command: Command) -> BusResult<()> {
        match command {
            Command::AddTransport { transport, reply } => {
                let id = self.attach(transport)?;
                let _ = reply.send(id);
            }
            Command::Disconnect {
                transport,
                reason,
                reply,
            } => {
                if let Some(link) = self.links.get(&transport) {
                    link.send(Frame::Disconnect {
                        reason: reason.clone(),
                    });
                }
                let known = self.close_link(transport, &reason);
                let _ = reply.send(known);
            }
            Command::Inbound { transport, frame } => self.on_frame(transport, frame)?,
            Command::LinkClosed { transport } => {
                self.close_link(transport, "transport closed");
            }
            Command::Emit {
                name,
                data,
                scope,
                reply,
            } => {
                self.emit_scoped(&name, data, scope)?;
                let _ = reply.send(());
            }
            Command::Request {
                name,
                data,
                scope,
                reply,
            } => self.start_request(name, data, scope, reply)?,
            Command::On {
                name,
                handler,
                reply,
            } => {
                let id = self.listeners.add(&name, handler);
                debug!(node = %self.id, event = %name, listener = %id, "Added listener");
                if self.graph.add_handled_event(&name) {
                    self.schedule_gossip();
                }
                let _ = reply.send(id);
            }
            Command::RemoveListener { id, reply } => {
                let removed = self.listeners.remove(id);
                if let Some((name, true)) = &removed {
                    debug!(node = %self.id, event = %name, "Last listener removed");
                    if name != NODE_INFO_EVENT && self.graph.remove_handled_event(name) {
                        self.schedule_gossip();
                    }
                }
                let _ = reply.send(removed.is_some());
            }
            Command::AddInputFilter { filter, reply } => {
                self.input_filters.push(filter);
                let _ = reply.send(());
            }
            Command::AddOutputFilter { filter, reply } => {
                self.output_filters.push(filter);
                let _ = reply.send(());
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::GraphStats(reply) => {
                let _ = reply.send(self.graph.stats());
            }
            Command::ListIds(reply) => {
                let _ = reply.send(self.graph.node_ids());
            }
            Command::FlushGossip => self.flush_gossip()?,
            Command::Requeue(packet) => {
                trace!(node = %self.id, "Re-running requeued packet");
                self.forward(packet)?;
            }
            Command::Responded {
                requester,
                request_id,
                state,
                result,
            } => {
                let packet = Packet::response(self.id.clone(), requester, request_id, state, result);
                let packet = self.filter_output(packet)?;
                self.forward(packet)?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> BusStats {
        let own = self.graph.own_node();
        BusStats {
            unanswered: self.waiters.len(),
            msg_count: own.msg_count,
            lost_packets: own.lost_packets,
            id: self.id.clone(),
            graph: self.graph.snapshot(),
        }
    }

    /// Post a command to this node's own queue from a spawned task.
    fn post_later<F>(&self, work: F)
    where
        F: Future<Output = Option<Command>> + Send + 'static,
    {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            if let Some(command) = work.await {
                if let Some(tx) = commands.upgrade() {
                    let _ = tx.send(command);
                }
            }
        });
    }

    /// Announce a new graph revision and poke every waiter.
    fn publish_revision(&mut self) -> BusResult<()> {
        let revision = self.graph.revision();
        if revision == self.published_revision {
            return Ok(());
        }
        self.published_revision = revision;
        self.revision_tx.send_replace(revision);
        trace!(node = %self.id, revision, "Graph updated");

        let pending: Vec<RequestId> = self.waiters.keys().cloned().collect();
        for request_id in pending {
            self.poke_waiter(&request_id, None)?;
        }
        Ok(())
    }

    // =========================================================================
    // Transport lifecycle
    // =========================================================================

    fn attach(&mut self, transport: Transport) -> BusResult<TransportId> {
        self.next_transport += 1;
        let tid = TransportId(self.next_transport);
        let (options, mut sink, mut stream) = transport.into_parts();

        let mut handshake = Handshake::new();
        handshake.attach(&self.id)?;

        let (frames, mut outbound) = mpsc::unbounded_channel::<Frame>();
        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                let kind = frame.kind();
                match sink.send(frame).await {
                    Ok(()) => {}
                    // Per-frame failures; the link itself is fine.
                    Err(e @ (TransportError::FrameTooLarge { .. } | TransportError::Decode(_))) => {
                        warn!(transport = %tid, frame = kind, error = %e, "Dropping unsendable frame");
                    }
                    Err(TransportError::Closed) => {
                        debug!(transport = %tid, "Peer closed the link");
                        break;
                    }
                    Err(e) => {
                        warn!(transport = %tid, error = %e, "Write failed, closing link");
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        let commands = self.commands.clone();
        let reader = tokio::spawn(async move {
            loop {
                let frame = match stream.next_frame().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(TransportError::Decode(e))) => {
                        warn!(transport = %tid, error = %e, "Dropping undecodable frame");
                        continue;
                    }
                    Some(Err(e)) => {
                        debug!(transport = %tid, error = %e, "Read failed");
                        break;
                    }
                    None => break,
                };
                let Some(tx) = commands.upgrade() else {
                    return;
                };
                if tx.send(Command::Inbound { transport: tid, frame }).is_err() {
                    return;
                }
            }
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::LinkClosed { transport: tid });
            }
        });

        let mut link = Link {
            options,
            handshake,
            frames,
            reader,
            edge: None,
        };
        let syn = link.handshake.syn()?;
        link.send(Frame::HandshakeSyn(syn));

        debug!(node = %self.id, transport = %tid, weight = options.weight, local = options.is_local, "Attached transport");
        self.links.insert(tid, link);
        self.connecting.insert(tid);
        Ok(tid)
    }

    /// Tear a link down locally. Returns whether it was known.
    fn close_link(&mut self, tid: TransportId, reason: &str) -> bool {
        self.connecting.remove(&tid);
        let Some(mut link) = self.links.remove(&tid) else {
            return false;
        };
        link.handshake.disconnect();

        if let Some(edge) = link.edge.take() {
            self.edge_links.remove(&edge);
            self.graph.remove_edge(&edge);
        }
        self.graph.localize();
        self.schedule_gossip();

        debug!(node = %self.id, transport = %tid, reason = %reason, "Transport disconnected");
        true
    }

    fn send_frame(&self, tid: TransportId, frame: Frame) {
        if let Some(link) = self.links.get(&tid) {
            link.send(frame);
        }
    }

    fn on_frame(&mut self, tid: TransportId, frame: Frame) -> BusResult<()> {
        trace!(node = %self.id, transport = %tid, frame = frame.kind(), "Inbound frame");
        match frame {
            Frame::HandshakeSyn(hello) => {
                let step = match self.links.get_mut(&tid) {
                    Some(link) => link.handshake.on_syn(&hello)?,
                    None => return Ok(()),
                };
                if let HandshakeStep::ReplyAndSnapshot(reply) = step {
                    self.send_frame(tid, Frame::HandshakeSynAck(reply));
                    self.send_initial_snapshot(tid)?;
                }
            }
            Frame::HandshakeSynAck(hello) => {
                let step = match self.links.get_mut(&tid) {
                    Some(link) => link.handshake.on_syn_ack(&hello),
                    None => return Ok(()),
                };
                if step == HandshakeStep::Snapshot {
                    self.send_initial_snapshot(tid)?;
                }
            }
            Frame::NodeInfoInitial(bytes) => self.on_initial_snapshot(tid, &bytes)?,
            Frame::Packet(packet) => {
                if packet.immediate_sender().is_some_and(|s| s.id == self.id) {
                    return Ok(());
                }
                self.forward(packet)?;
            }
            Frame::Disconnect { reason } => {
                self.close_link(tid, &reason);
            }
        }
        Ok(())
    }

    fn send_initial_snapshot(&mut self, tid: TransportId) -> BusResult<()> {
        if let Some(bytes) = self.encode_own_info(true)? {
            self.send_frame(tid, Frame::NodeInfoInitial(bytes));
        }
        Ok(())
    }

    fn on_initial_snapshot(&mut self, tid: TransportId, bytes: &[u8]) -> BusResult<()> {
        if !self.links.contains_key(&tid) {
            return Ok(());
        }
        let info = match gossip::decode(self.codec.as_ref(), bytes) {
            Ok(info) => info,
            Err(e) => {
                error!(node = %self.id, transport = %tid, error = %e, "Malformed initial node info");
                self.reject_link(tid);
                return Ok(());
            }
        };
        let peer = info.descriptor.id.clone();
        if peer == self.id {
            warn!(node = %self.id, transport = %tid, "Transport loops back to self");
            self.reject_link(tid);
            return Ok(());
        }

        debug!(node = %self.id, transport = %tid, peer = %peer, "Received initial node info");
        if self.merge_info(&info)?.is_none() {
            self.reject_link(tid);
            return Ok(());
        }

        let Some(link) = self.links.get_mut(&tid) else {
            return Ok(());
        };
        let edge_id = match link.handshake.establish(&peer) {
            Ok(edge_id) => edge_id,
            Err(e) => {
                error!(node = %self.id, transport = %tid, error = %e, "Handshake failed");
                self.reject_link(tid);
                return Ok(());
            }
        };
        let (source, target) = if self.id <= peer {
            (self.id.clone(), peer.clone())
        } else {
            (peer.clone(), self.id.clone())
        };
        let edge = Edge::new(edge_id.clone(), source, target, link.options.weight, link.options.is_local);
        let previous = link.edge.replace(edge_id.clone());

        if let Some(old) = previous.filter(|old| old != &edge_id) {
            self.edge_links.remove(&old);
            self.graph.remove_edge(&old);
        }

        self.graph
            .add_edge(edge)
            .map_err(|e| BusError::Invariant(format!("peer {} missing after merge: {}", peer, e)))?;
        self.edge_links.insert(edge_id.clone(), tid);
        self.connecting.remove(&tid);
        self.schedule_gossip();

        debug!(node = %self.id, transport = %tid, edge = %edge_id, "Transport established");
        Ok(())
    }

    /// Abandon a link whose handshake cannot complete. A link left in
    /// `connecting` would suppress localization for every later merge.
    fn reject_link(&mut self, tid: TransportId) {
        const REASON: &str = "invalid initial node info";
        self.send_frame(
            tid,
            Frame::Disconnect {
                reason: REASON.to_string(),
            },
        );
        self.close_link(tid, REASON);
    }

    /// Merge a peer's advertised graph. `Ok(None)` means the exchange was
    /// rejected and logged.
    fn merge_info(&mut self, info: &NodeInfo) -> BusResult<Option<bool>> {
        let suppress_localize = !self.connecting.is_empty();
        match self
            .graph
            .merge_remote(&info.descriptor.id, &info.graph, suppress_localize)
        {
            Ok(changed) => Ok(Some(changed)),
            Err(e @ (GraphError::HashCollision { .. } | GraphError::EdgeConflict { .. })) => {
                Err(BusError::Invariant(e.to_string()))
            }
            Err(e) => {
                error!(node = %self.id, remote = %info.descriptor.id, error = %e, "Rejected node info");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Gossip
    // =========================================================================

    /// Coalesce broadcasts: at most one flush is queued at a time.
    fn schedule_gossip(&mut self) {
        if self.gossip_pending {
            return;
        }
        self.gossip_pending = true;

        let debounce = self.config.gossip_debounce;
        if debounce.is_zero() {
            if let Some(tx) = self.commands.upgrade() {
                let _ = tx.send(Command::FlushGossip);
            }
        } else {
            self.post_later(async move {
                tokio::time::sleep(debounce).await;
                Some(Command::FlushGossip)
            });
        }
    }

    /// Encode self's descriptor and graph. Non-initial snapshots are skipped
    /// when the structure did not change since the last one.
    fn encode_own_info(&mut self, initial: bool) -> BusResult<Option<Vec<u8>>> {
        let hash = self.graph.hash();
        if self.last_published.as_ref() != Some(&hash) {
            self.graph.touch_own();
            self.last_published = Some(hash);
        } else if !initial {
            trace!(node = %self.id, "Graph unchanged, skipping node info");
            return Ok(None);
        }

        let info = NodeInfo {
            descriptor: self.graph.own_node().clone(),
            graph: self.graph.snapshot(),
        };
        Ok(Some(gossip::encode(self.codec.as_ref(), &info)?))
    }

    fn flush_gossip(&mut self) -> BusResult<()> {
        self.gossip_pending = false;
        let Some(bytes) = self.encode_own_info(false)? else {
            return Ok(());
        };

        let recipients: Vec<NodeId> = self
            .graph
            .expand_scope(Scope::Neighbours, NODE_INFO_EVENT)
            .into_iter()
            .filter(|id| id != &self.id)
            .collect();
        if recipients.is_empty() {
            return Ok(());
        }

        debug!(node = %self.id, neighbours = recipients.len(), bytes = bytes.len(), "Broadcasting node info");
        let packet = Packet::event(self.id.clone(), recipients, NODE_INFO_EVENT, gossip::event_payload(&bytes));
        let packet = self.filter_output(packet)?;
        self.forward(packet)
    }

    fn on_node_info(&mut self, data: &Value) -> BusResult<()> {
        let info = match gossip::decode_event(self.codec.as_ref(), data) {
            Ok(info) => info,
            Err(e) => {
                error!(node = %self.id, error = %e, "Malformed node info");
                return Ok(());
            }
        };
        if info.descriptor.id == self.id {
            return Ok(());
        }
        trace!(node = %self.id, remote = %info.descriptor.id, "Received node info");
        if self.merge_info(&info)?.is_some() {
            self.schedule_gossip();
        }
        Ok(())
    }

    // =========================================================================
    // Emit / request
    // =========================================================================

    fn emit_scoped(&mut self, name: &str, data: Value, scope: Scope) -> BusResult<()> {
        let recipients = self.graph.expand_scope(scope, name);
        debug!(node = %self.id, event = %name, scope = %scope, recipients = recipients.len(), "Emit");
        if recipients.is_empty() {
            return Ok(());
        }
        let packet = Packet::event(self.id.clone(), recipients, name, data);
        let packet = self.filter_output(packet)?;
        self.forward(packet)
    }

    fn start_request(
        &mut self,
        name: String,
        data: Value,
        scope: Scope,
        reply: oneshot::Sender<BusResult<Value>>,
    ) -> BusResult<()> {
        let recipients = self.graph.expand_scope(scope, &name);
        if recipients.is_empty() {
            debug!(node = %self.id, request = %name, scope = %scope, "No handler in scope");
            let _ = reply.send(Err(BusError::NonexistentType { name }));
            return Ok(());
        }

        let request_id = RequestId::new(&self.id, self.request_counter);
        self.request_counter += 1;
        debug!(
            node = %self.id,
            request = %name,
            request_id = %request_id,
            scope = %scope,
            recipients = recipients.len(),
            "Request"
        );

        let packet = Packet::request(
            self.id.clone(),
            recipients.clone(),
            name.as_str(),
            data.clone(),
            request_id.clone(),
            scope == Scope::Nearest,
        );
        self.waiters.insert(
            request_id,
            ResponseWaiter::new(name, data, scope, recipients, reply),
        );
        let packet = self.filter_output(packet)?;
        self.forward(packet)
    }

    fn poke_waiter(&mut self, request_id: &RequestId, arrival: Option<Arrival>) -> BusResult<()> {
        let graph = &self.graph;
        let Some(waiter) = self.waiters.get_mut(request_id) else {
            if arrival.is_some() {
                warn!(node = %self.id, request_id = %request_id, "Response for unknown request");
            }
            return Ok(());
        };
        let outcome = waiter.on_response(arrival, |node| {
            matches!(graph.route_to(node), Route::Local | Route::Via(_))
        });
        if outcome == WaiterOutcome::Pending {
            return Ok(());
        }

        let Some(waiter) = self.waiters.remove(request_id) else {
            return Ok(());
        };
        if outcome == WaiterOutcome::Reissue {
            debug!(node = %self.id, request_id = %request_id, "Re-issuing request without answer");
            let (name, data, scope, reply) = waiter.into_reissue();
            return self.start_request(name, data, scope, reply);
        }
        if let Some(result) = outcome_result(outcome) {
            debug!(node = %self.id, request_id = %request_id, ok = result.is_ok(), "Request settled");
            waiter.finish(result);
        }
        Ok(())
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable handle to a running bus node.
///
/// Dropping every handle stops the node.
#[derive(Clone)]
pub struct BusHandle {
    id: NodeId,
    commands: mpsc::UnboundedSender<Command>,
    revision: watch::Receiver<u64>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle").field("id", &self.id).finish()
    }
}

impl BusHandle {
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Whether the node's event loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> BusResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| BusError::NodeStopped)?;
        rx.await.map_err(|_| BusError::NodeStopped)
    }

    // -------------------------------------------------------------------------
    // Transports
    // -------------------------------------------------------------------------

    /// Attach a transport and start the handshake.
    pub async fn add_transport(&self, transport: Transport) -> BusResult<TransportId> {
        self.call(|reply| Command::AddTransport { transport, reply })
            .await
    }

    /// Tell the peer we are leaving, then drop the link. Returns whether the
    /// transport was attached.
    pub async fn disconnect(&self, transport: TransportId, reason: &str) -> BusResult<bool> {
        let reason = reason.to_string();
        self.call(|reply| Command::Disconnect {
            transport,
            reason,
            reply,
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Listeners and filters
    // -------------------------------------------------------------------------

    /// Register an async listener for `name`.
    pub async fn on<F, Fut>(&self, name: &str, f: F) -> BusResult<ListenerId>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.on_handler(name, handler(f)).await
    }

    /// Register an already boxed [`Handler`].
    pub async fn on_handler(&self, name: &str, handler: Handler) -> BusResult<ListenerId> {
        let name = name.to_string();
        self.call(|reply| Command::On {
            name,
            handler,
            reply,
        })
        .await
    }

    pub async fn remove_listener(&self, id: ListenerId) -> BusResult<bool> {
        self.call(|reply| Command::RemoveListener { id, reply }).await
    }

    pub async fn add_input_filter<F>(&self, filter: F) -> BusResult<()>
    where
        F: Fn(Packet) -> Option<Packet> + Send + Sync + 'static,
    {
        let filter: PacketFilter = Arc::new(filter);
        self.call(|reply| Command::AddInputFilter { filter, reply }).await
    }

    pub async fn add_output_filter<F>(&self, filter: F) -> BusResult<()>
    where
        F: Fn(Packet) -> Option<Packet> + Send + Sync + 'static,
    {
        let filter: PacketFilter = Arc::new(filter);
        self.call(|reply| Command::AddOutputFilter { filter, reply }).await
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Emit to every handling node in `scope`. Resolves once the packet has
    /// been handed to the forwarding loop; an empty scope is not an error.
    pub async fn emit_scoped(&self, name: &str, data: Value, scope: Scope) -> BusResult<()> {
        let name = name.to_string();
        self.call(|reply| Command::Emit {
            name,
            data,
            scope,
            reply,
        })
        .await
    }

    pub async fn emit(&self, name: &str, data: Value) -> BusResult<()> {
        self.emit_global(name, data).await
    }

    pub async fn emit_global(&self, name: &str, data: Value) -> BusResult<()> {
        self.emit_scoped(name, data, Scope::Global).await
    }

    pub async fn emit_local(&self, name: &str, data: Value) -> BusResult<()> {
        self.emit_scoped(name, data, Scope::Local).await
    }

    pub async fn emit_immediate(&self, name: &str, data: Value) -> BusResult<()> {
        self.emit_scoped(name, data, Scope::Immediate).await
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Send a request to the handlers in `scope`.
    ///
    /// `Nearest` resolves with the single handler's value. Broader scopes
    /// resolve with one flat list: every node answers with the array of its
    /// local handlers' results and those arrays are concatenated in arrival
    /// order, so which node produced which value is not preserved. Tag the
    /// values themselves if callers need that.
    ///
    /// Completion waits only for targeted nodes that are still reachable.
    /// No handler in scope fails immediately with
    /// [`BusError::NonexistentType`]. There is no built-in timeout.
    pub async fn request_scoped(&self, name: &str, data: Value, scope: Scope) -> BusResult<Value> {
        let name = name.to_string();
        self.call(|reply| Command::Request {
            name,
            data,
            scope,
            reply,
        })
        .await?
    }

    pub async fn request(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_nearest(name, data).await
    }

    pub async fn request_nearest(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_scoped(name, data, Scope::Nearest).await
    }

    pub async fn request_local(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_scoped(name, data, Scope::Local).await
    }

    /// Ask every handler on the mesh. The result is the flattened list
    /// described on [`BusHandle::request_scoped`].
    pub async fn request_global(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_scoped(name, data, Scope::Global).await
    }

    pub async fn request_immediate(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_scoped(name, data, Scope::Immediate).await
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub async fn stats(&self) -> BusResult<BusStats> {
        self.call(Command::Stats).await
    }

    pub async fn graph_stats(&self) -> BusResult<GraphStats> {
        self.call(Command::GraphStats).await
    }

    pub async fn list_all_ids(&self) -> BusResult<Vec<NodeId>> {
        self.call(Command::ListIds).await
    }

    /// Stream of graph revisions, starting with the current one.
    pub fn graph_updates(&self) -> WatchStream<u64> {
        WatchStream::new(self.revision.clone())
    }

    /// Stop the node. Pending requests fail with [`BusError::NodeStopped`]
    /// and every link is dropped.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
