//! # Request Aggregation
//!
//! Requests settle once every targeted node that is still part of the graph
//! has answered. Nodes that leave mid-flight are simply no longer waited
//! for; a nearest request whose target leaves is re-issued.

#[cfg(test)]
mod tests {
    use crate::integration::*;
    use meshbus::{BusError, Scope, TransportOptions};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_remote_failure_rejects() {
        let a = spawn_node();
        let b = spawn_node();
        b.on("explode", |_| async { Err(json!({"reason": "kaput"})) }).await.unwrap();
        connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "explode", 1).await;

        let err = request(&a, "explode", json!({}), Scope::Nearest).await.unwrap_err();
        assert_eq!(err, BusError::RequestFailed(json!({"reason": "kaput"})));
        assert_eq!(a.stats().await.unwrap().unanswered, 0);
    }

    #[tokio::test]
    async fn test_data_reaches_remote_handler() {
        let a = spawn_node();
        let b = spawn_node();
        b.on("sum", |data: Value| async move {
            let total: i64 = data["values"]
                .as_array()
                .map(|vs| vs.iter().filter_map(Value::as_i64).sum())
                .unwrap_or(0);
            Ok(json!(total))
        })
        .await
        .unwrap();
        connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "sum", 1).await;

        let total = request(&a, "sum", json!({"values": [1, 2, 3]}), Scope::Nearest).await.unwrap();
        assert_eq!(total, json!(6));
    }

    #[tokio::test]
    async fn test_departed_node_is_not_waited_for() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        b.on("poll", |_| async { Ok(json!("b")) }).await.unwrap();
        c.on("poll", |_| futures::future::pending::<Result<Value, Value>>()).await.unwrap();

        connect(a, b, TransportOptions::default()).await;
        let bc = connect(b, c, TransportOptions::default()).await;
        wait_for_handlers(a, "poll", 2).await;

        let requester = a.clone();
        let pending = tokio::spawn(async move { requester.request_global("poll", json!({})).await });
        wait_until("request to be outstanding", || async {
            a.stats().await.map(|s| s.unanswered == 1).unwrap_or(false)
        })
        .await;

        bc.control.disconnect();
        let result = tokio::time::timeout(CONVERGE, pending).await.unwrap().unwrap().unwrap();
        assert_eq!(result, json!(["b"]));
    }

    #[tokio::test]
    async fn test_nearest_reissued_when_target_leaves() {
        let nodes = spawn_nodes(3);
        let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);
        b.on("job", |_| futures::future::pending::<Result<Value, Value>>()).await.unwrap();
        c.on("job", |_| async { Ok(json!("c")) }).await.unwrap();

        let ab = connect(a, b, TransportOptions::default()).await;
        connect(a, c, TransportOptions::default().with_weight(5)).await;
        wait_for_handlers(a, "job", 2).await;

        let requester = a.clone();
        let pending = tokio::spawn(async move { requester.request_nearest("job", json!({})).await });
        wait_until("request to be outstanding", || async {
            a.stats().await.map(|s| s.unanswered == 1).unwrap_or(false)
        })
        .await;

        ab.control.disconnect();
        let result = tokio::time::timeout(CONVERGE, pending).await.unwrap().unwrap().unwrap();
        assert_eq!(result, json!("c"));
    }

    #[tokio::test]
    async fn test_shutdown_of_requester_fails_caller() {
        let a = spawn_node();
        let b = spawn_node();
        b.on("hang", |_| futures::future::pending::<Result<Value, Value>>()).await.unwrap();
        connect(&a, &b, TransportOptions::default()).await;
        wait_for_handlers(&a, "hang", 1).await;

        let requester = a.clone();
        let pending = tokio::spawn(async move { requester.request("hang", json!({})).await });
        wait_until("request to be outstanding", || async {
            a.stats().await.map(|s| s.unanswered == 1).unwrap_or(false)
        })
        .await;

        a.shutdown();
        let err = tokio::time::timeout(CONVERGE, pending).await.unwrap().unwrap().unwrap_err();
        assert_eq!(err, BusError::NodeStopped);
    }
}
