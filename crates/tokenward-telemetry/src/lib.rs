//! Structured logging bootstrap for tokenward services
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a fmt layer that
//! writes either human-readable lines or JSON objects.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tokenward_telemetry::TelemetryConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _guard = TelemetryConfig::builder()
//!         .service_name("token-gateway")
//!         .json_logs(true)
//!         .build()
//!         .init()?;
//!
//!     // Token validation code here...
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod init;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::{TelemetryError, TelemetryResult};
pub use init::TelemetryGuard;
