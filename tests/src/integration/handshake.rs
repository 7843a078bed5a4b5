//! # Link Lifecycle
//!
//! Two nodes attach a transport each, agree on one edge id and learn each
//! other's descriptors. Tearing the link down from either side, or
//! severing it underneath, leaves both nodes alone again.

#[cfg(test)]
mod tests {
    use crate::integration::*;
    use meshbus::{TransportOptions, NODE_INFO_EVENT};
    use serde_json::json;

    #[tokio::test]
    async fn test_two_nodes_agree_on_one_edge() {
        let a = spawn_node();
        let b = spawn_node();
        connect(&a, &b, TransportOptions::default()).await;

        wait_for_graph(&a, 2, 1).await;
        wait_for_graph(&b, 2, 1).await;

        let a_view = a.stats().await.unwrap().graph;
        let b_view = b.stats().await.unwrap().graph;
        assert_eq!(a_view.edges.len(), 1);
        assert_eq!(a_view.edges[0].id, b_view.edges[0].id);
        assert!(a_view.edges[0].touches(a.id()));
        assert!(a_view.edges[0].touches(b.id()));
        assert!(a_view.nodes.iter().all(|n| n.handles(NODE_INFO_EVENT)));

        let mut ids = a.list_all_ids().await.unwrap();
        ids.sort();
        let mut expected = vec![a.id().clone(), b.id().clone()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_both_alone() {
        let a = spawn_node();
        let b = spawn_node();
        let link = connect(&a, &b, TransportOptions::default()).await;
        wait_for_graph(&a, 2, 1).await;
        wait_for_graph(&b, 2, 1).await;

        assert!(a.disconnect(link.left, "bye").await.unwrap());
        assert!(!a.disconnect(link.left, "again").await.unwrap());

        wait_for_graph(&a, 1, 0).await;
        wait_for_graph(&b, 1, 0).await;
    }

    #[tokio::test]
    async fn test_severed_link_leaves_both_alone() {
        let a = spawn_node();
        let b = spawn_node();
        let link = connect(&a, &b, TransportOptions::default()).await;
        wait_for_graph(&a, 2, 1).await;

        link.control.disconnect();
        assert!(link.control.is_disconnected());

        wait_for_graph(&a, 1, 0).await;
        wait_for_graph(&b, 1, 0).await;
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let a = spawn_node();
        let b = spawn_node();
        b.on("ping", |_| async { Ok(json!("pong")) }).await.unwrap();

        let first = connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "ping", 1).await;
        first.control.disconnect();
        wait_for_graph(&a, 1, 0).await;
        assert!(a.request("ping", json!({})).await.unwrap_err().is_nonexistent_type());

        connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "ping", 1).await;
        wait_for_graph(&a, 2, 1).await;
        assert_eq!(request(&a, "ping", json!({}), meshbus::Scope::Nearest).await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_handlers_registered_after_connect_propagate() {
        let a = spawn_node();
        let b = spawn_node();
        connect(&a, &b, TransportOptions::default()).await;
        wait_for_graph(&a, 2, 1).await;

        let id = b.on("late", |_| async { Ok(json!(1)) }).await.unwrap();
        wait_for_handlers(&a, "late", 1).await;

        b.remove_listener(id).await.unwrap();
        wait_for_handlers(&a, "late", 0).await;
    }
}
