//! # TCP Transport
//!
//! Nodes linked over loopback sockets behave like in-memory ones.

#[cfg(test)]
mod tests {
    use crate::integration::*;
    use meshbus::{Scope, TcpTransport, TransportOptions};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn tcp_link(a: &meshbus::BusHandle, b: &meshbus::BusHandle) -> meshbus::TransportId {
        tcp_link_with(a, b, TransportOptions::default()).await
    }

    async fn tcp_link_with(
        a: &meshbus::BusHandle,
        b: &meshbus::BusHandle,
        options: TransportOptions,
    ) -> meshbus::TransportId {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let outgoing = TcpTransport::connect(addr, options).await.unwrap();
        let incoming = TcpTransport::from_stream(accept.await.unwrap(), options);

        let tid = a.add_transport(outgoing).await.unwrap();
        b.add_transport(incoming).await.unwrap();
        tid
    }

    #[tokio::test]
    async fn test_request_over_tcp() {
        let a = spawn_node();
        let b = spawn_node();
        b.on("upper", |data| async move {
            Ok(json!(data["text"].as_str().unwrap_or_default().to_uppercase()))
        })
        .await
        .unwrap();

        tcp_link(&a, &b).await;
        wait_for_graph(&a, 2, 1).await;
        wait_for_handlers(&a, "upper", 1).await;

        let value = request(&a, "upper", json!({"text": "mesh"}), Scope::Nearest).await.unwrap();
        assert_eq!(value, json!("MESH"));
    }

    #[tokio::test]
    async fn test_tcp_disconnect_propagates() {
        let a = spawn_node();
        let b = spawn_node();
        let tid = tcp_link(&a, &b).await;
        wait_for_graph(&b, 2, 1).await;

        assert!(a.disconnect(tid, "closing").await.unwrap());
        wait_for_graph(&a, 1, 0).await;
        wait_for_graph(&b, 1, 0).await;
    }

    #[tokio::test]
    async fn test_oversized_frame_keeps_link_up() {
        let a = spawn_node();
        let b = spawn_node();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        b.on("bulk", move |data| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(data);
                Ok(json!(null))
            }
        })
        .await
        .unwrap();
        b.on("upper", |data| async move {
            Ok(json!(data["text"].as_str().unwrap_or_default().to_uppercase()))
        })
        .await
        .unwrap();

        tcp_link_with(&a, &b, TransportOptions::default().with_max_frame_size(16 * 1024)).await;
        wait_for_graph(&a, 2, 1).await;
        wait_for_handlers(&a, "upper", 1).await;

        a.emit("bulk", json!("x".repeat(64 * 1024))).await.unwrap();
        a.emit("bulk", json!("small")).await.unwrap();

        let value = request(&a, "upper", json!({"text": "still here"}), Scope::Nearest).await.unwrap();
        assert_eq!(value, json!("STILL HERE"));
        let delivered = tokio::time::timeout(CONVERGE, rx.recv()).await.unwrap().unwrap();
        assert_eq!(delivered, json!("small"));
        assert_eq!(a.graph_stats().await.unwrap(), meshbus::GraphStats { nodes: 2, edges: 1 });
    }
}
