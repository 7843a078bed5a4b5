//! Listener table and packet filters.

use crate::packet::Packet;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Event listener or request handler. `Err` carries the rejection payload.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, Value>> + Send + Sync>;

/// Packet transform. Returning `None` is a programming error and stops the node.
pub type PacketFilter = Arc<dyn Fn(Packet) -> Option<Packet> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Value>> + Send + 'static,
{
    Arc::new(move |data| Box::pin(f(data)))
}

/// Identifies one registration made with `on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Name-keyed listeners, kept in registration order.
#[derive(Default)]
pub(crate) struct ListenerTable {
    next_id: u64,
    by_name: BTreeMap<String, Vec<(ListenerId, Handler)>>,
}

impl ListenerTable {
    pub(crate) fn add(&mut self, name: &str, handler: Handler) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.by_name
            .entry(name.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a registration. Returns its name and whether it was the last one.
    pub(crate) fn remove(&mut self, id: ListenerId) -> Option<(String, bool)> {
        let name = self
            .by_name
            .iter()
            .find(|(_, entries)| entries.iter().any(|(lid, _)| *lid == id))
            .map(|(name, _)| name.clone())?;

        let now_empty = match self.by_name.get_mut(&name) {
            Some(entries) => {
                entries.retain(|(lid, _)| *lid != id);
                entries.is_empty()
            }
            None => return None,
        };
        if now_empty {
            self.by_name.remove(&name);
        }
        Some((name, now_empty))
    }

    pub(crate) fn handlers(&self, name: &str) -> Vec<Handler> {
        self.by_name
            .get(name)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}
