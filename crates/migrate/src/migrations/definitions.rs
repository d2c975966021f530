//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! Migration, Action, MigrationRecord and the result types returned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MigrateError, MigrateResult};

/// Kind of migration file, selecting the suffix and how actions are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    /// Raw SQL with `-- +migrate Up` / `-- +migrate Down` sections
    Sql,
    /// Rust callbacks registered in a [`NativeRegistry`](super::native::NativeRegistry)
    Native,
}

impl MigrationKind {
    /// File suffix (without the dot) of migrations of this kind
    pub fn suffix(&self) -> &'static str {
        match self {
            MigrationKind::Sql => "sql",
            MigrationKind::Native => "rs",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

impl FromStr for MigrationKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sql" => Ok(MigrationKind::Sql),
            "rs" | "rust" | "native" => Ok(MigrationKind::Native),
            _ => Err(MigrateError::Configuration(format!(
                "invalid migration type '{}', expected sql or rs",
                s
            ))),
        }
    }
}

/// Key of a native callback in the registry. Native migrations are keyed by
/// their file stem, e.g. `0003_backfill_emails`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeHandle(pub String);

impl NativeHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deferred schema change, dispatched by the engine at apply time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// SQL text; an empty body is a no-op
    Sql(String),
    /// Registered native callback
    Native(NativeHandle),
}

impl Action {
    /// Whether running this action would do nothing
    pub fn is_empty(&self) -> bool {
        matches!(self, Action::Sql(sql) if sql.trim().is_empty())
    }
}

/// Represents a database migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// File name, e.g. `0004_add_users.sql`. Unique key in the ledger.
    pub name: String,
    /// Numeric prefix of the name
    pub version: u32,
    pub kind: MigrationKind,
    /// Forward change
    pub up: Action,
    /// Backward change
    pub down: Action,
}

impl Migration {
    pub fn new(name: impl Into<String>, kind: MigrationKind, up: Action, down: Action) -> MigrateResult<Self> {
        let name = name.into();
        let version = parse_version(&name)?;
        Ok(Self {
            name,
            version,
            kind,
            up,
            down,
        })
    }

    /// Shorthand for a SQL migration
    pub fn sql(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> MigrateResult<Self> {
        Self::new(
            name,
            MigrationKind::Sql,
            Action::Sql(up.into()),
            Action::Sql(down.into()),
        )
    }

    /// Shorthand for a native migration keyed by the name's file stem
    pub fn native(name: impl Into<String>) -> MigrateResult<Self> {
        let name = name.into();
        let handle = NativeHandle::new(file_stem(&name));
        Self::new(
            name,
            MigrationKind::Native,
            Action::Native(handle.clone()),
            Action::Native(handle),
        )
    }

    /// Action for the given direction
    pub fn action(&self, direction: MigrationDirection) -> &Action {
        match direction {
            MigrationDirection::Up => &self.up,
            MigrationDirection::Down => &self.down,
        }
    }
}

/// Applied migration as persisted in the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration name
    pub name: String,
    /// When the migration was applied, assigned by the database at insert time
    pub applied_at: DateTime<Utc>,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationDirection {
    /// Apply the migration (run UP action)
    Up,
    /// Rollback the migration (run DOWN action)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// Present in the source directory, absent from the ledger
    Pending,
    /// Recorded in the ledger
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
    },
}

impl MigrationState {
    pub fn is_applied(&self) -> bool {
        matches!(self, MigrationState::Applied { .. })
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Names of migrations that were applied, in order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back the latest migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackResult {
    /// Name of the migration that was rolled back
    pub rolled_back_migration: String,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of a redo (rollback followed by up)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedoResult {
    pub rolled_back: RollbackResult,
    pub reapplied: MigrationRunResult,
}

/// Difference between the source directory and the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// In the source directory but not in the ledger, in file order
    pub pending: Vec<String>,
    /// In the ledger but missing from the source directory, in application order
    pub orphaned: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty() && self.orphaned.is_empty()
    }
}

/// Parse the numeric version prefix of a migration name (`0004_add_users.sql` -> 4)
pub fn parse_version(name: &str) -> MigrateResult<u32> {
    let (prefix, _) = name
        .split_once('_')
        .ok_or_else(|| MigrateError::MalformedName(name.to_string()))?;

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MigrateError::MalformedName(name.to_string()));
    }

    prefix
        .parse()
        .map_err(|_| MigrateError::MalformedName(name.to_string()))
}

/// Build a migration file name: `<4-digit sequence>_<slug>.<suffix>`
pub fn format_migration_name(sequence: u32, slug: &str, kind: MigrationKind) -> String {
    let slug = slug.trim().replace(' ', "_").to_lowercase();
    format!("{:04}_{}.{}", sequence, slug, kind.suffix())
}

/// File name without its last extension
pub(crate) fn file_stem(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("0004_add_users.sql").unwrap(), 4);
        assert_eq!(parse_version("0120_a_b_c.rs").unwrap(), 120);
        assert_eq!(parse_version("7_x.sql").unwrap(), 7);
    }

    #[test]
    fn test_parse_version_rejects_malformed_names() {
        for name in ["add_users.sql", "0004-add.sql", "_x.sql", "12a_x.sql", "-1_x.sql"] {
            match parse_version(name) {
                Err(MigrateError::MalformedName(n)) => assert_eq!(n, name),
                other => panic!("expected MalformedName for {}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_format_migration_name() {
        assert_eq!(format_migration_name(4, "add_users", MigrationKind::Sql), "0004_add_users.sql");
        assert_eq!(format_migration_name(12, "Backfill Emails", MigrationKind::Native), "0012_backfill_emails.rs");
        assert_eq!(format_migration_name(12345, "big", MigrationKind::Sql), "12345_big.sql");
    }

    #[test]
    fn test_migration_kind_from_str() {
        assert_eq!("sql".parse::<MigrationKind>().unwrap(), MigrationKind::Sql);
        assert_eq!("RS".parse::<MigrationKind>().unwrap(), MigrationKind::Native);
        assert_eq!("rust".parse::<MigrationKind>().unwrap(), MigrationKind::Native);
        assert!("go".parse::<MigrationKind>().is_err());
    }

    #[test]
    fn test_native_migration_uses_file_stem_as_handle() {
        let migration = Migration::native("0003_backfill.rs").unwrap();
        assert_eq!(migration.version, 3);
        assert_eq!(migration.up, Action::Native(NativeHandle::new("0003_backfill")));
        assert_eq!(migration.action(MigrationDirection::Down), &migration.down);
    }

    #[test]
    fn test_empty_sql_action() {
        assert!(Action::Sql("  \n".to_string()).is_empty());
        assert!(!Action::Sql("SELECT 1".to_string()).is_empty());
        assert!(!Action::Native(NativeHandle::new("x")).is_empty());
    }
}
