//! In-process transport: two ends joined by unbounded channels.
//!
//! Used to link nodes inside one process and throughout the test suite.

use super::{Frame, FrameSink, FrameStream, Transport, TransportOptions};
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Severs an in-memory link from the outside.
#[derive(Debug, Clone)]
pub struct LinkControl {
    closed: Arc<watch::Sender<bool>>,
}

impl LinkControl {
    /// Cut both directions. Both streams end, both sinks start failing.
    pub fn disconnect(&self) {
        self.closed.send_replace(true);
    }

    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        *self.closed.borrow()
    }
}

struct MemorySink {
    tx: mpsc::UnboundedSender<Frame>,
    closed: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        Ok(())
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    closed: watch::Receiver<bool>,
    // Keeps the watch channel open even after every `LinkControl` is dropped.
    _keepalive: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        if *self.closed.borrow() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.wait_for(|closed| *closed) => None,
            frame = self.rx.recv() => frame.map(Ok),
        }
    }
}

/// Two connected transports and a control for cutting the link.
pub fn pair(options: TransportOptions) -> (Transport, Transport, LinkControl) {
    let (closed_tx, closed_rx) = watch::channel(false);
    let closed = Arc::new(closed_tx);
    let (a_to_b, b_from_a) = mpsc::unbounded_channel();
    let (b_to_a, a_from_b) = mpsc::unbounded_channel();

    let end = |tx, rx| {
        Transport::new(
            options,
            Box::new(MemorySink {
                tx,
                closed: Arc::clone(&closed),
            }),
            Box::new(MemoryStream {
                rx,
                closed: closed_rx.clone(),
                _keepalive: Arc::clone(&closed),
            }),
        )
    };

    let a = end(a_to_b, a_from_b);
    let b = end(b_to_a, b_from_a);
    (a, b, LinkControl { closed })
}
