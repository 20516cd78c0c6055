//! Installing a [`tracing`] subscriber for simulation runs
//!
//! Node events are reported through [`crate::observer::TracingObserver`],
//! which logs blocks at `info` and gossip at `debug`. Logs are written to
//! standard error so that results tables printed to standard output stay
//! machine-readable. `RUST_LOG` overrides the level given here.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Output format of log lines.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

#[derive(Debug, thiserror::Error)]
#[error("a global tracing subscriber is already installed")]
pub struct LoggingError(#[from] tracing_subscriber::util::TryInitError);

/// Installs the global subscriber. `level` is an [`EnvFilter`] directive
/// such as `"info"` or `"warn,propagation_sim=debug"`.
pub fn init_logging(
    format: LogFormat,
    level: &str,
) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{init_logging, LogFormat};

    #[test]
    fn second_init_fails() {
        // Other tests in this binary never install a subscriber.
        assert!(init_logging(LogFormat::Human, "warn").is_ok());
        assert!(init_logging(LogFormat::Json, "warn").is_err());
    }

    #[test]
    fn format_names() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
