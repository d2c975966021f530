//! Native migrations written in Rust
//!
//! A native migration file only names the migration; its behaviour lives in a
//! [`NativeMigration`] registered under the file stem.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::definitions::{MigrationDirection, NativeHandle};
use super::ledger::ScriptExecutor;
use crate::error::{MigrateError, MigrateResult};

/// Forward and backward change implemented in Rust
#[async_trait]
pub trait NativeMigration: Send + Sync {
    async fn up(&self, db: &dyn ScriptExecutor) -> MigrateResult<()>;

    async fn down(&self, db: &dyn ScriptExecutor) -> MigrateResult<()>;
}

/// Registered native migrations keyed by file stem
#[derive(Clone, Default)]
pub struct NativeRegistry {
    migrations: HashMap<String, Arc<dyn NativeMigration>>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.migrations.keys().collect();
        keys.sort();
        f.debug_struct("NativeRegistry").field("keys", &keys).finish()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `migration` under `key` (the file stem, e.g. `0003_backfill`).
    /// A later registration with the same key replaces the earlier one.
    pub fn register<M>(&mut self, key: impl Into<String>, migration: M) -> &mut Self
    where
        M: NativeMigration + 'static,
    {
        self.migrations.insert(key.into(), Arc::new(migration));
        self
    }

    pub fn resolve(&self, handle: &NativeHandle) -> Option<Arc<dyn NativeMigration>> {
        self.migrations.get(handle.key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Run the registered callback for `handle` in `direction`
    pub(crate) async fn run(
        &self,
        migration_name: &str,
        handle: &NativeHandle,
        direction: MigrationDirection,
        db: &dyn ScriptExecutor,
    ) -> MigrateResult<()> {
        let migration = self.resolve(handle).ok_or_else(|| {
            MigrateError::action(
                migration_name,
                direction,
                format!("no native migration registered for '{}'", handle),
            )
        })?;

        match direction {
            MigrationDirection::Up => migration.up(db).await,
            MigrationDirection::Down => migration.down(db).await,
        }
    }
}
