//! # Integration Fixtures
//!
//! Helpers shared by the multi-node scenarios. Nodes converge
//! asynchronously, so every assertion about remote state goes through one of
//! the `wait_*` helpers, bounded by [`CONVERGE`].

pub mod components;
pub mod handshake;
pub mod requests;
pub mod routing;
pub mod tcp;

use meshbus::{memory, BusConfig, BusHandle, BusNode, BusResult, GraphStats, LinkControl, Scope, TransportId, TransportOptions};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Upper bound for any convergence wait.
pub const CONVERGE: Duration = Duration::from_secs(5);

const POLL: Duration = Duration::from_millis(5);

/// A live in-memory link between two nodes.
pub struct MemoryLink {
    pub left: TransportId,
    pub right: TransportId,
    pub control: LinkControl,
}

/// Spawn a node with test defaults and test logging.
pub fn spawn_node() -> BusHandle {
    spawn_node_with(BusConfig::for_testing())
}

pub fn spawn_node_with(config: BusConfig) -> BusHandle {
    meshbus_telemetry::init_test_logging();
    BusNode::spawn(config)
}

pub fn spawn_nodes(count: usize) -> Vec<BusHandle> {
    (0..count).map(|_| spawn_node()).collect()
}

/// Connect two nodes with an in-memory link.
pub async fn connect(a: &BusHandle, b: &BusHandle, options: TransportOptions) -> MemoryLink {
    let (ta, tb, control) = memory::pair(options);
    let left = a.add_transport(ta).await.unwrap();
    let right = b.add_transport(tb).await.unwrap();
    MemoryLink { left, right, control }
}

/// Poll `check` until it holds, panicking with `what` after [`CONVERGE`].
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let converged = timeout(CONVERGE, async {
        while !check().await {
            sleep(POLL).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "timed out waiting for {what}");
}

/// Wait until `bus` sees exactly `nodes` nodes and `edges` edges.
pub async fn wait_for_graph(bus: &BusHandle, nodes: usize, edges: usize) {
    let expected = GraphStats { nodes, edges };
    wait_until(&format!("{} to see {nodes} nodes / {edges} edges", bus.id()), || async {
        bus.graph_stats().await.ok() == Some(expected)
    })
    .await;
}

/// Wait until `bus` knows `count` nodes handling `name`.
pub async fn wait_for_handlers(bus: &BusHandle, name: &str, count: usize) {
    wait_until(&format!("{} to see {count} handlers of {name}", bus.id()), || async {
        match bus.stats().await {
            Ok(stats) => stats.graph.nodes.iter().filter(|n| n.handles(name)).count() == count,
            Err(_) => false,
        }
    })
    .await;
}

/// Issue a request, bounded by [`CONVERGE`].
pub async fn request(bus: &BusHandle, name: &str, data: Value, scope: Scope) -> BusResult<Value> {
    timeout(CONVERGE, bus.request_scoped(name, data, scope))
        .await
        .unwrap_or_else(|_| panic!("request {name} timed out"))
}

/// Sort a JSON array of strings, for comparing arrival-ordered results.
pub fn sorted(value: Value) -> Vec<String> {
    let mut items: Vec<String> = value
        .as_array()
        .expect("array result")
        .iter()
        .map(|v| v.as_str().expect("string item").to_string())
        .collect();
    items.sort();
    items
}
