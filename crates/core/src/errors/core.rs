use crate::config::ConfigError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while bootstrapping a migrator run
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Logging initialization failed: {message}")]
    Logging { message: String },
}

impl CoreError {
    /// Create a new logging error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}
