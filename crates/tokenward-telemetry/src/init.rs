//! Subscriber installation
//!
//! Provides the [`TelemetryGuard`] for managing the logging lifecycle.

use crate::{TelemetryConfig, TelemetryError};
use tracing::info;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Guard returned once the global subscriber is installed
///
/// Keep it alive in `main()`; dropping it logs the shutdown event.
///
/// ```rust,no_run
/// use tokenward_telemetry::TelemetryConfig;
///
/// # fn main() -> Result<(), tokenward_telemetry::TelemetryError> {
/// let _telemetry = TelemetryConfig::default().init()?;
/// tracing::info!("ready");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TelemetryGuard {
    config: TelemetryConfig,
}

impl TelemetryGuard {
    /// Install the global subscriber described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfiguration`] when the log level
    /// filter does not parse, and [`TelemetryError::TracingError`] when a
    /// global subscriber is already installed.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let env_filter = EnvFilter::try_from_default_env().or_else(|_| parse_filter(&config.log_level))?;

        install(&config, env_filter)?;

        info!(
            service_name = %config.service_name,
            service_version = %config.service_version,
            json_logs = config.json_logs,
            stderr_output = config.stderr_output,
            "telemetry initialized"
        );

        Ok(Self { config })
    }

    /// Get the service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        info!(service_name = %self.config.service_name, "telemetry shutting down");
    }
}

fn parse_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(log_level)
        .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))
}

/// Each writer/format combination yields a distinct layer type, so every
/// branch installs its own subscriber.
fn install(config: &TelemetryConfig, env_filter: EnvFilter) -> Result<(), TelemetryError> {
    let registry = Registry::default().with(env_filter);

    let result = match (config.json_logs, config.stderr_output) {
        (true, true) => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init(),
        (true, false) => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init(),
        (false, true) => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        (false, false) => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|e| TelemetryError::TracingError(e.to_string()))
}
