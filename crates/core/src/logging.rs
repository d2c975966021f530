//! # Structured Logging
//!
//! `tracing` subscriber setup shared by the migrator binaries. Logs go to
//! stderr so stdout carries only command output.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{CoreError, CoreResult};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Environment filter (supports directives like "pgshift_migrate=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Configuration for the command-line tool
    pub fn cli(level: &str, json_format: bool) -> Self {
        Self {
            level: level.to_string(),
            json_format,
            ..Self::default()
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Filter directives used when `RUST_LOG` is not set.
    ///
    /// sqlx logs every statement at `info`; it is held to `warn` unless the
    /// caller chose their own directives.
    pub fn directives(&self) -> String {
        match &self.env_filter {
            Some(filter) => filter.clone(),
            None => format!("{},sqlx=warn", self.level),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the config.
pub fn init_logging(config: LoggingConfig) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .map_err(|e| CoreError::logging(format!("invalid log filter: {}", e)))?;

    let fmt_layer = Layer::new().with_writer(io::stderr);

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
    };
    result.map_err(|e| CoreError::logging(e.to_string()))?;

    tracing::debug!(
        target: "pgshift::logging",
        "logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config() {
        let config = LoggingConfig::cli("debug", true);
        assert!(config.json_format);
        assert_eq!(config.directives(), "debug,sqlx=warn");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = LoggingConfig::default().with_env_filter("pgshift_migrate=trace");
        assert_eq!(config.directives(), "pgshift_migrate=trace");
    }

    #[test]
    fn test_second_init_fails_without_panicking() {
        let _ = init_logging(LoggingConfig::default());
        assert!(matches!(
            init_logging(LoggingConfig::default()),
            Err(CoreError::Logging { .. })
        ));
    }
}
