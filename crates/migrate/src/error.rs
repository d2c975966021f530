//! Error types for the migration system
//!
//! Every failure carries the migration name and the operation that was being
//! performed. Nothing in this crate recovers from an error locally; errors are
//! surfaced to the caller as-is.

use thiserror::Error;

use crate::migrations::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The database could not be reached or the ledger table could not be prepared
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transactional insert/delete of a ledger record (or its commit) failed
    #[error("Ledger write failed while trying to {operation} '{name}': {message}")]
    LedgerWrite {
        name: String,
        operation: &'static str,
        message: String,
    },

    /// Reading the ledger failed
    #[error("Query error: {0}")]
    Query(String),

    /// The migration's own forward/backward change failed
    #[error("Failed to run {direction} action of migration '{name}': {message}")]
    ActionExecution {
        name: String,
        direction: MigrationDirection,
        message: String,
    },

    /// Rollback was requested but the ledger is empty
    #[error("No migrations to rollback")]
    NoMigrationsApplied,

    /// The ledger references a migration that is absent from the source directory
    #[error("Migration '{0}' is recorded as applied but its file was not found")]
    MigrationNotFound(String),

    /// The version prefix of a migration name is not an integer
    #[error("Malformed migration name '{0}': expected <number>_<slug>.<type>")]
    MalformedName(String),

    /// Ledger insert violated the uniqueness constraint
    #[error("Migration '{0}' is already recorded in the ledger")]
    DuplicateMigration(String),

    /// The action succeeded but the ledger could not be updated. Schema and
    /// ledger now disagree and need operator inspection.
    #[error("Migration '{name}' ran {direction} but the ledger was not updated; schema and ledger are inconsistent: {source}")]
    InconsistentState {
        name: String,
        direction: MigrationDirection,
        #[source]
        source: Box<MigrateError>,
    },

    /// A migration file could not be read or parsed
    #[error("Failed to parse migration file {file}: {message}")]
    Parse { file: String, message: String },

    /// Invalid migration configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Filesystem error outside of migration parsing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    pub(crate) fn action(
        name: impl Into<String>,
        direction: MigrationDirection,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::ActionExecution {
            name: name.into(),
            direction,
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Name of the migration this error is about, when there is one
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            Self::LedgerWrite { name, .. }
            | Self::ActionExecution { name, .. }
            | Self::InconsistentState { name, .. } => Some(name),
            Self::MigrationNotFound(name)
            | Self::MalformedName(name)
            | Self::DuplicateMigration(name) => Some(name),
            Self::Parse { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Whether the schema and the ledger may now disagree
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Self::InconsistentState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_names_migration() {
        let err = MigrateError::action("0005_x.sql", MigrationDirection::Up, "syntax error");
        assert_eq!(err.migration_name(), Some("0005_x.sql"));
        assert!(err.to_string().contains("up action of migration '0005_x.sql'"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_inconsistent_state_keeps_source() {
        let err = MigrateError::InconsistentState {
            name: "0002_b.sql".to_string(),
            direction: MigrationDirection::Down,
            source: Box::new(MigrateError::LedgerWrite {
                name: "0002_b.sql".to_string(),
                operation: "revoke",
                message: "connection reset".to_string(),
            }),
        };

        assert!(err.is_inconsistent());
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("connection reset"));
    }
}
