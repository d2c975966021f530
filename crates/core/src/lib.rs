//! # pgshift-core
//!
//! Configuration loading and logging setup shared by the pgshift tools.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfigTrait, ConfigSource, MigratorConfig};
pub use config::validation::ConfigError;
pub use errors::{CoreError, CoreResult};
pub use logging::{init_logging, LoggingConfig};
