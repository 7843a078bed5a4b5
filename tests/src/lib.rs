//! # Meshbus Test Suite
//!
//! Multi-node scenarios wired over in-memory and TCP transports.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── mod.rs         # Node/link fixtures and convergence waits
//!     ├── handshake.rs   # Link establishment and teardown
//!     ├── routing.rs     # Multi-hop topologies, scopes, hop cap
//!     ├── requests.rs    # Aggregation under membership changes
//!     ├── components.rs  # Plug/unplug across nodes
//!     └── tcp.rs         # Real sockets
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p meshbus-tests
//! cargo test -p meshbus-tests integration::routing
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

pub mod integration;
