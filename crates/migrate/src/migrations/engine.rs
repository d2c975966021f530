//! Migration Engine - Applies and reverts migrations
//!
//! The engine is the only component that knows both the full migration list
//! (from the [`MigrationSource`]) and the applied subset (from the
//! [`LedgerStore`]). Each migration's action runs first; the ledger write
//! follows in its own locked transaction.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::definitions::{
    parse_version, Action, DriftReport, Migration, MigrationDirection, MigrationRunResult,
    MigrationState, RedoResult, RollbackResult,
};
use super::ledger::LedgerStore;
use super::native::NativeRegistry;
use super::source::MigrationSource;
use crate::error::{MigrateError, MigrateResult};

/// How much of an operation the advisory lock covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// Only the ledger insert/delete and its commit. Two processes may both
    /// run the same pending action before one of them loses the ledger race.
    #[default]
    LedgerWrite,
    /// The whole operation: pending computation, actions and ledger writes
    Migration,
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockScope::LedgerWrite => write!(f, "ledger-write"),
            LockScope::Migration => write!(f, "migration"),
        }
    }
}

impl FromStr for LockScope {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ledger-write" | "ledger" => Ok(LockScope::LedgerWrite),
            "migration" | "full" => Ok(LockScope::Migration),
            _ => Err(MigrateError::Configuration(format!(
                "invalid lock scope '{}', expected ledger-write or migration",
                s
            ))),
        }
    }
}

/// Orchestrates apply/rollback against a ledger store
pub struct MigrationEngine<S> {
    source: MigrationSource,
    store: Arc<S>,
    registry: NativeRegistry,
    lock_scope: LockScope,
}

impl<S: LedgerStore + 'static> MigrationEngine<S> {
    pub fn new(source: MigrationSource, store: Arc<S>) -> Self {
        Self {
            source,
            store,
            registry: NativeRegistry::new(),
            lock_scope: LockScope::default(),
        }
    }

    /// Native callbacks used by `rs` migrations
    pub fn with_registry(mut self, registry: NativeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_lock_scope(mut self, lock_scope: LockScope) -> Self {
        self.lock_scope = lock_scope;
        self
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn lock_scope(&self) -> LockScope {
        self.lock_scope
    }

    /// Apply every pending migration in file order.
    ///
    /// Stops at the first failure; migrations applied earlier in the same call
    /// stay applied.
    pub async fn up(&self) -> MigrateResult<MigrationRunResult> {
        self.locked(self.apply_pending()).await
    }

    /// Revert the most recently applied migration (by `applied_at`)
    pub async fn down(&self) -> MigrateResult<RollbackResult> {
        self.locked(self.revert_latest()).await
    }

    /// [`down`](Self::down) followed by [`up`](Self::up). Not atomic: if the
    /// second half fails the database stays one migration behind.
    pub async fn redo(&self) -> MigrateResult<RedoResult> {
        self.locked(async {
            let rolled_back = self.revert_latest().await?;
            let reapplied = self.apply_pending().await?;
            Ok(RedoResult {
                rolled_back,
                reapplied,
            })
        })
        .await
    }

    /// Applied migration names in application order
    pub async fn status(&self) -> MigrateResult<Vec<String>> {
        self.store.list_applied().await
    }

    /// Human-readable status, one `Applied: <name>` line per migration
    pub async fn status_report(&self) -> MigrateResult<String> {
        let applied = self.status().await?;
        Ok(applied
            .iter()
            .map(|name| format!("Applied: {}", name))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Version prefix of the latest applied migration, 0 if none
    pub async fn db_version(&self) -> MigrateResult<u32> {
        match self.store.latest_applied().await? {
            Some(name) => parse_version(&name),
            None => Ok(0),
        }
    }

    /// Every source migration with its ledger state, in file order
    pub async fn migration_states(&self) -> MigrateResult<Vec<(Migration, MigrationState)>> {
        let migrations = self.source.load_migrations()?;
        let applied: HashMap<String, _> = self
            .store
            .list_records()
            .await?
            .into_iter()
            .map(|record| (record.name, record.applied_at))
            .collect();

        Ok(migrations
            .into_iter()
            .map(|migration| {
                let state = match applied.get(&migration.name) {
                    Some(applied_at) => MigrationState::Applied {
                        applied_at: *applied_at,
                    },
                    None => MigrationState::Pending,
                };
                (migration, state)
            })
            .collect())
    }

    /// Compare source and ledger without changing either
    pub async fn audit(&self) -> MigrateResult<DriftReport> {
        let migrations = self.source.load_migrations()?;
        let applied = self.store.list_applied().await?;

        let known: HashSet<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        let recorded: HashSet<&str> = applied.iter().map(String::as_str).collect();

        Ok(DriftReport {
            pending: migrations
                .iter()
                .filter(|m| !recorded.contains(m.name.as_str()))
                .map(|m| m.name.clone())
                .collect(),
            orphaned: applied
                .iter()
                .filter(|name| !known.contains(name.as_str()))
                .cloned()
                .collect(),
        })
    }

    async fn apply_pending(&self) -> MigrateResult<MigrationRunResult> {
        let start_time = Instant::now();

        let migrations = self.source.load_migrations()?;
        let applied: HashSet<String> = self.store.list_applied().await?.into_iter().collect();

        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| !applied.contains(&m.name))
            .collect();
        debug!(
            total = migrations.len(),
            pending = pending.len(),
            "computed pending migrations"
        );

        let mut result = MigrationRunResult {
            skipped_count: migrations.len() - pending.len(),
            ..Default::default()
        };

        for migration in pending {
            // Processes on the narrower scope can still record while we hold the lock
            if self.lock_scope == LockScope::Migration && self.store.is_applied(&migration.name).await? {
                debug!(migration = %migration.name, "recorded by another process, skipping");
                result.skipped_count += 1;
                continue;
            }

            self.execute_action(migration, MigrationDirection::Up).await?;
            self.record(migration, MigrationDirection::Up).await?;

            info!(migration = %migration.name, version = migration.version, "applied migration");
            result.applied_migrations.push(migration.name.clone());
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        Ok(result)
    }

    async fn revert_latest(&self) -> MigrateResult<RollbackResult> {
        let start_time = Instant::now();

        let latest = self
            .store
            .latest_applied()
            .await?
            .ok_or(MigrateError::NoMigrationsApplied)?;

        let migration = self
            .source
            .load_migrations()?
            .into_iter()
            .find(|m| m.name == latest)
            .ok_or_else(|| MigrateError::MigrationNotFound(latest.clone()))?;

        self.execute_action(&migration, MigrationDirection::Down).await?;
        self.record(&migration, MigrationDirection::Down).await?;

        info!(migration = %migration.name, version = migration.version, "rolled back migration");
        Ok(RollbackResult {
            rolled_back_migration: migration.name,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    async fn execute_action(&self, migration: &Migration, direction: MigrationDirection) -> MigrateResult<()> {
        debug!(migration = %migration.name, %direction, "running migration action");

        let outcome = match migration.action(direction) {
            Action::Sql(sql) => self.store.execute_script(sql).await,
            Action::Native(handle) => {
                let store: &S = &self.store;
                self.registry.run(&migration.name, handle, direction, store).await
            }
        };

        outcome.map_err(|e| match e {
            e @ MigrateError::ActionExecution { .. } => e,
            other => MigrateError::action(&migration.name, direction, other),
        })
    }

    /// Ledger write after a successful action; a failure here means the
    /// schema changed but the ledger did not follow
    async fn record(&self, migration: &Migration, direction: MigrationDirection) -> MigrateResult<()> {
        let written = match direction {
            MigrationDirection::Up => self.store.apply_record(&migration.name).await,
            MigrationDirection::Down => self.store.revoke_record(&migration.name).await,
        };

        written.map_err(|e| {
            warn!(
                migration = %migration.name,
                %direction,
                error = %e,
                "action succeeded but ledger write failed; manual intervention required"
            );
            MigrateError::InconsistentState {
                name: migration.name.clone(),
                direction,
                source: Box::new(e),
            }
        })
    }

    async fn locked<T, F>(&self, operation: F) -> MigrateResult<T>
    where
        F: Future<Output = MigrateResult<T>>,
    {
        if self.lock_scope != LockScope::Migration {
            return operation.await;
        }

        self.store.lock_migrations().await?;
        let result = operation.await;

        match self.store.unlock_migrations().await {
            Ok(()) => result,
            Err(unlock_err) if result.is_ok() => Err(unlock_err),
            Err(unlock_err) => {
                warn!(error = %unlock_err, "failed to release migration lock");
                result
            }
        }
    }
}

impl<S> fmt::Debug for MigrationEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("source", &self.source)
            .field("registry", &self.registry)
            .field("lock_scope", &self.lock_scope)
            .finish_non_exhaustive()
    }
}
