//! # Components
//!
//! A [`Component`] groups a set of handlers under a name so they can be
//! plugged into a bus and pulled out again as a unit.
//!
//! ```text
//! HandlerTable ──plug()──▶ BusHandle::on_handler (one per entry)
//!              ◀─unplug()── waits for in-flight requests, then remove_listener
//! ```
//!
//! Requests and events sent through a component carry its name in the
//! `senderComponentName` field of object payloads.

use crate::error::{BusError, BusResult};
use crate::node::{handler, BusHandle, Handler, ListenerId};
use crate::scope::Scope;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Payload field stamped with the sending component's name.
pub const SENDER_COMPONENT_FIELD: &str = "senderComponentName";

/// Named handlers, registered in insertion order.
#[derive(Clone, Default)]
pub struct HandlerTable {
    entries: Vec<(String, Handler)>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`HandlerTable::insert`] for async closures.
    #[must_use]
    pub fn on<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.insert(name, handler(f));
        self
    }

    pub fn insert(&mut self, name: &str, handler: Handler) {
        self.entries.push((name.to_string(), handler));
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable").field("names", &self.names()).finish()
    }
}

// =============================================================================
// IN-FLIGHT TRACKING
// =============================================================================

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

// =============================================================================
// COMPONENT
// =============================================================================

struct Plugged {
    bus: BusHandle,
    listeners: Vec<ListenerId>,
}

/// A named [`HandlerTable`] that can be attached to one bus at a time.
pub struct Component {
    name: String,
    table: HandlerTable,
    plugged: Mutex<Option<Plugged>>,
    in_flight: Arc<InFlight>,
}

impl Component {
    #[must_use]
    pub fn new(name: &str, table: HandlerTable) -> Self {
        Self {
            name: name.to_string(),
            table,
            plugged: Mutex::new(None),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_plugged(&self) -> bool {
        self.plugged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Requests issued through this component that have not settled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    fn bus(&self) -> BusResult<BusHandle> {
        self.plugged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|p| p.bus.clone())
            .ok_or(BusError::NotPlugged)
    }

    /// Register every handler of the table with `bus`. Plugging an already
    /// plugged component unplugs it first.
    pub async fn plug(&self, bus: &BusHandle) -> BusResult<()> {
        if self.is_plugged() {
            self.unplug().await?;
        }

        let mut listeners = Vec::with_capacity(self.table.len());
        for (name, handler) in &self.table.entries {
            match bus.on_handler(name, Arc::clone(handler)).await {
                Ok(id) => listeners.push(id),
                Err(e) => {
                    for id in listeners {
                        let _ = bus.remove_listener(id).await;
                    }
                    return Err(e);
                }
            }
        }

        info!(component = %self.name, node = %bus.id(), handlers = listeners.len(), "Plugged component");
        *self.plugged.lock().unwrap_or_else(PoisonError::into_inner) = Some(Plugged {
            bus: bus.clone(),
            listeners,
        });
        Ok(())
    }

    /// Wait for outstanding requests, then remove every registration.
    /// New requests fail with [`BusError::NotPlugged`] as soon as this starts.
    pub async fn unplug(&self) -> BusResult<()> {
        let Some(plugged) = self
            .plugged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(BusError::NotPlugged);
        };

        debug!(component = %self.name, in_flight = self.in_flight(), "Unplugging component");
        self.in_flight.wait_idle().await;

        for id in plugged.listeners {
            plugged.bus.remove_listener(id).await?;
        }
        info!(component = %self.name, node = %plugged.bus.id(), "Unplugged component");
        Ok(())
    }

    fn imprint(&self, data: Value) -> Value {
        match data {
            Value::Object(mut map) => {
                map.insert(SENDER_COMPONENT_FIELD.to_string(), Value::String(self.name.clone()));
                Value::Object(map)
            }
            other => other,
        }
    }

    pub async fn request_scoped(&self, name: &str, data: Value, scope: Scope) -> BusResult<Value> {
        let bus = self.bus()?;
        let _guard = self.in_flight.enter();
        bus.request_scoped(name, self.imprint(data), scope).await
    }

    pub async fn request(&self, name: &str, data: Value) -> BusResult<Value> {
        self.request_scoped(name, data, Scope::Nearest).await
    }

    pub async fn emit_scoped(&self, name: &str, data: Value, scope: Scope) -> BusResult<()> {
        let bus = self.bus()?;
        bus.emit_scoped(name, self.imprint(data), scope).await
    }

    pub async fn emit(&self, name: &str, data: Value) -> BusResult<()> {
        self.emit_scoped(name, data, Scope::Global).await
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("plugged", &self.is_plugged())
            .finish()
    }
}
