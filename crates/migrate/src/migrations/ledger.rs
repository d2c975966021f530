//! Ledger Store abstraction
//!
//! The ledger is the durable record of which migrations have been applied and
//! when. Implementations also own the advisory lock that serializes ledger
//! writes across processes, and execute migration scripts against the same
//! database handle.

use async_trait::async_trait;

use super::definitions::MigrationRecord;
use crate::error::MigrateResult;

/// Runs migration bodies against the target database
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute a (possibly multi-statement) SQL script
    async fn execute_script(&self, sql: &str) -> MigrateResult<()>;
}

/// Durable bookkeeping of applied migrations
#[async_trait]
pub trait LedgerStore: ScriptExecutor {
    /// Record `name` as applied.
    ///
    /// Runs in one transaction holding the advisory lock. Fails with
    /// `DuplicateMigration` when the name is already recorded and with
    /// `LedgerWrite` on any other failure; nothing is left behind on failure.
    async fn apply_record(&self, name: &str) -> MigrateResult<()>;

    /// Delete the record for `name`. Deleting a missing record is not an error.
    async fn revoke_record(&self, name: &str) -> MigrateResult<()>;

    /// Applied migration names ordered by `applied_at` ascending
    async fn list_applied(&self) -> MigrateResult<Vec<String>> {
        Ok(self
            .list_records()
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    /// Applied records ordered by `applied_at` ascending
    async fn list_records(&self) -> MigrateResult<Vec<MigrationRecord>>;

    /// Name of the record with the greatest `applied_at`, if any
    async fn latest_applied(&self) -> MigrateResult<Option<String>>;

    /// Whether `name` is recorded
    async fn is_applied(&self, name: &str) -> MigrateResult<bool>;

    /// Take the migration lock for the rest of the session.
    ///
    /// Used when the lock must cover action execution as well as the ledger
    /// write. Blocks until the lock is available.
    async fn lock_migrations(&self) -> MigrateResult<()>;

    /// Release a lock taken with [`lock_migrations`](Self::lock_migrations)
    async fn unlock_migrations(&self) -> MigrateResult<()>;
}
