//! # Meshbus Telemetry
//!
//! Logging bootstrap for processes that run meshbus nodes. The library crate
//! only emits `tracing` events; installing a subscriber is left to the
//! binary, through [`init_logging`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshbus_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config).ok();
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MESHBUS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `MESHBUS_JSON_LOGS` | `false` | JSON formatted output |
//! | `MESHBUS_SERVICE_NAME` | `meshbus` | Service name attached to the startup log |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::Filter("bad[".to_string());
        assert_eq!(err.to_string(), "Invalid log filter: bad[");
    }
}
