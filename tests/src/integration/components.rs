//! # Components Across Nodes
//!
//! A component plugged into one node serves requests from the whole mesh
//! and disappears from it again when unplugged.

#[cfg(test)]
mod tests {
    use crate::integration::*;
    use meshbus::{Component, HandlerTable, Scope, TransportOptions, SENDER_COMPONENT_FIELD};
    use serde_json::json;

    #[tokio::test]
    async fn test_remote_component_sees_caller_name() {
        let a = spawn_node();
        let b = spawn_node();
        connect(&a, &b, TransportOptions::default()).await;

        let server = Component::new(
            "server",
            HandlerTable::new().on("whoami", |data| async move { Ok(data[SENDER_COMPONENT_FIELD].clone()) }),
        );
        server.plug(&b).await.unwrap();

        let client = Component::new("client", HandlerTable::new());
        client.plug(&a).await.unwrap();
        wait_for_handlers(&a, "whoami", 1).await;

        let caller = client.request("whoami", json!({})).await.unwrap();
        assert_eq!(caller, json!("client"));

        server.unplug().await.unwrap();
        wait_for_handlers(&a, "whoami", 0).await;
        assert!(client.request("whoami", json!({})).await.unwrap_err().is_nonexistent_type());
    }

    #[tokio::test]
    async fn test_component_global_request_over_mesh() {
        let nodes = spawn_nodes(3);
        connect(&nodes[0], &nodes[1], TransportOptions::default()).await;
        connect(&nodes[1], &nodes[2], TransportOptions::default()).await;

        let mut plugged = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let name = format!("shard-{i}");
            let tag = name.clone();
            let component = Component::new(
                &name,
                HandlerTable::new().on("shard", move |_| {
                    let tag = tag.clone();
                    async move { Ok(json!(tag)) }
                }),
            );
            component.plug(node).await.unwrap();
            plugged.push(component);
        }
        wait_for_handlers(&nodes[0], "shard", 3).await;

        let all = plugged[0].request_scoped("shard", json!({}), Scope::Global).await.unwrap();
        assert_eq!(sorted(all), vec!["shard-0", "shard-1", "shard-2"]);
    }
}
