//! Logging setup for Strata services.
//!
//! Services call [`init_logging`] once, before resolving configuration, so
//! that layer loading and validation records reach the operator.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_telemetry::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env("receiver")?;
//! init_logging(&config)?;
//!
//! tracing::info!(service = "receiver", "starting");
//! ```

#![warn(missing_docs)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
