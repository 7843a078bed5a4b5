//! # Multi-Hop Routing
//!
//! Chains and rings of in-memory links. Packets for non-adjacent nodes are
//! relayed by intermediate nodes along the cheapest path.

#[cfg(test)]
mod tests {
    use crate::integration::*;
    use meshbus::{BusConfig, Scope, TransportOptions};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn answering(name: &'static str) -> impl Fn(Value) -> futures::future::Ready<Result<Value, Value>> + Send + Sync + 'static {
        move |_| futures::future::ready(Ok(json!(name)))
    }

    #[tokio::test]
    async fn test_chain_converges_and_relays() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        c.on("where", answering("c")).await.unwrap();

        connect(a, b, TransportOptions::default()).await;
        connect(b, c, TransportOptions::default()).await;
        for node in &nodes {
            wait_for_graph(node, 3, 2).await;
        }
        wait_for_handlers(a, "where", 1).await;

        assert_eq!(request(a, "where", json!({}), Scope::Nearest).await.unwrap(), json!("c"));
        assert!(b.stats().await.unwrap().msg_count > 0);
    }

    #[tokio::test]
    async fn test_global_and_nearest_scopes_over_chain() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        b.on("who", answering("b")).await.unwrap();
        c.on("who", answering("c")).await.unwrap();

        connect(a, b, TransportOptions::default()).await;
        connect(b, c, TransportOptions::default()).await;
        wait_for_handlers(a, "who", 2).await;

        let all = request(a, "who", json!({}), Scope::Global).await.unwrap();
        assert_eq!(sorted(all), vec!["b", "c"]);

        assert_eq!(request(a, "who", json!({}), Scope::Nearest).await.unwrap(), json!("b"));

        let neighbours = request(a, "who", json!({}), Scope::Neighbours).await.unwrap();
        assert_eq!(neighbours, json!(["b"]));

        assert!(request(a, "who", json!({}), Scope::Immediate)
            .await
            .unwrap_err()
            .is_nonexistent_type());
    }

    #[tokio::test]
    async fn test_nearest_follows_link_weights() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        b.on("svc", answering("b")).await.unwrap();
        c.on("svc", answering("c")).await.unwrap();

        connect(a, b, TransportOptions::default().with_weight(10)).await;
        connect(a, c, TransportOptions::default().with_weight(2)).await;
        wait_for_handlers(a, "svc", 2).await;

        assert_eq!(request(a, "svc", json!({}), Scope::Nearest).await.unwrap(), json!("c"));
    }

    #[tokio::test]
    async fn test_local_scope_stops_at_non_local_links() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        b.on("svc", answering("b")).await.unwrap();
        c.on("svc", answering("c")).await.unwrap();

        connect(a, b, TransportOptions::local()).await;
        connect(b, c, TransportOptions::default()).await;
        wait_for_handlers(a, "svc", 2).await;

        let local = request(a, "svc", json!({}), Scope::Local).await.unwrap();
        assert_eq!(local, json!(["b"]));
    }

    #[tokio::test]
    async fn test_ring_reaches_everyone() {
        let nodes = spawn_nodes(4);
        for (i, node) in nodes.iter().enumerate() {
            let tag = format!("n{i}");
            node.on("roll", move |_| futures::future::ready(Ok(json!(tag.clone()))))
                .await
                .unwrap();
        }
        for i in 0..nodes.len() {
            connect(&nodes[i], &nodes[(i + 1) % nodes.len()], TransportOptions::default()).await;
        }
        for node in &nodes {
            wait_for_graph(node, 4, 4).await;
        }
        wait_for_handlers(&nodes[0], "roll", 4).await;

        let all = request(&nodes[0], "roll", json!({}), Scope::Global).await.unwrap();
        assert_eq!(sorted(all), vec!["n0", "n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_events_fan_out_globally() {
        let nodes = spawn_nodes(3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        for node in &nodes {
            let tx = tx.clone();
            let me = node.id().clone();
            node.on("news", move |data| {
                let _ = tx.send((me.clone(), data));
                futures::future::ready(Ok(Value::Null))
            })
            .await
            .unwrap();
        }
        connect(&nodes[0], &nodes[1], TransportOptions::default()).await;
        connect(&nodes[1], &nodes[2], TransportOptions::default()).await;
        wait_for_handlers(&nodes[0], "news", 3).await;

        nodes[0].emit("news", json!({"headline": "hi"})).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (who, data) = tokio::time::timeout(CONVERGE, rx.recv()).await.unwrap().unwrap();
            assert_eq!(data, json!({"headline": "hi"}));
            seen.push(who);
        }
        seen.sort();
        let mut expected: Vec<_> = nodes.iter().map(|n| n.id().clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_packets_over_hop_limit_are_lost() {
        let a = spawn_node();
        let b = spawn_node_with(BusConfig::for_testing().with_max_hops(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.on("tick", move |_| {
            let _ = tx.send(());
            futures::future::ready(Ok(Value::Null))
        })
        .await
        .unwrap();

        connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "tick", 1).await;

        a.emit("tick", json!({})).await.unwrap();
        wait_until("hop-capped packet to be counted lost", || async {
            b.stats().await.map(|s| s.lost_packets > 0).unwrap_or(false)
        })
        .await;
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }
}
