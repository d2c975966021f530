//! In-memory Ledger Store
//!
//! Keeps the ledger and the executed scripts in process memory. Useful for
//! exercising the engine without a database; failures can be injected to
//! simulate broken actions and ledger writes.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::definitions::MigrationRecord;
use super::ledger::{LedgerStore, ScriptExecutor};
use crate::error::{MigrateError, MigrateResult};

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<MigrationRecord>,
    executed: Vec<String>,
    last_applied_at: Option<DateTime<Utc>>,
    failing_marker: Option<String>,
    failing_writes: usize,
    lock_depth: usize,
    lock_history: Vec<bool>,
}

/// Ledger store kept in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the ledger, as if `names` had been applied in that order
    pub fn with_applied<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ledger = Self::new();
        {
            let mut state = ledger.state();
            for name in names {
                let applied_at = next_timestamp(&mut state);
                state.records.push(MigrationRecord {
                    name: name.into(),
                    applied_at,
                });
            }
        }
        ledger
    }

    /// Make every script containing `marker` fail
    pub fn fail_scripts_containing(&self, marker: impl Into<String>) {
        self.state().failing_marker = Some(marker.into());
    }

    /// Make the next `count` ledger writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.state().failing_writes = count;
    }

    /// Scripts executed so far, in order
    pub fn executed_scripts(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Snapshot of the ledger ordered by `applied_at`
    pub fn records(&self) -> Vec<MigrationRecord> {
        self.state().records.clone()
    }

    /// Whether the session migration lock is currently held
    pub fn is_locked(&self) -> bool {
        self.state().lock_depth > 0
    }

    /// Lock state observed at each ledger write and script (true = held)
    pub fn lock_history(&self) -> Vec<bool> {
        self.state().lock_history.clone()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-operation
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_write(state: &mut MemoryState, name: &str, operation: &'static str) -> MigrateResult<()> {
        let held = state.lock_depth > 0;
        state.lock_history.push(held);
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(MigrateError::LedgerWrite {
                name: name.to_string(),
                operation,
                message: "injected ledger failure".to_string(),
            });
        }
        Ok(())
    }
}

/// `applied_at` strictly increases, even within one clock tick
fn next_timestamp(state: &mut MemoryState) -> DateTime<Utc> {
    let now = Utc::now();
    let applied_at = match state.last_applied_at {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    };
    state.last_applied_at = Some(applied_at);
    applied_at
}

#[async_trait]
impl ScriptExecutor for MemoryLedger {
    async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        let mut state = self.state();
        let held = state.lock_depth > 0;
        state.lock_history.push(held);

        if let Some(marker) = &state.failing_marker {
            if sql.contains(marker.as_str()) {
                return Err(MigrateError::Query(format!(
                    "script rejected: contains '{}'",
                    marker
                )));
            }
        }

        if !sql.trim().is_empty() {
            state.executed.push(sql.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn apply_record(&self, name: &str) -> MigrateResult<()> {
        let mut state = self.state();
        Self::check_write(&mut state, name, "apply")?;

        if state.records.iter().any(|record| record.name == name) {
            return Err(MigrateError::DuplicateMigration(name.to_string()));
        }

        let applied_at = next_timestamp(&mut state);
        state.records.push(MigrationRecord {
            name: name.to_string(),
            applied_at,
        });
        Ok(())
    }

    async fn revoke_record(&self, name: &str) -> MigrateResult<()> {
        let mut state = self.state();
        Self::check_write(&mut state, name, "revoke")?;
        state.records.retain(|record| record.name != name);
        Ok(())
    }

    async fn list_records(&self) -> MigrateResult<Vec<MigrationRecord>> {
        Ok(self.state().records.clone())
    }

    async fn latest_applied(&self) -> MigrateResult<Option<String>> {
        Ok(self
            .state()
            .records
            .iter()
            .max_by_key(|record| record.applied_at)
            .map(|record| record.name.clone()))
    }

    async fn is_applied(&self, name: &str) -> MigrateResult<bool> {
        Ok(self.state().records.iter().any(|record| record.name == name))
    }

    async fn lock_migrations(&self) -> MigrateResult<()> {
        self.state().lock_depth += 1;
        Ok(())
    }

    async fn unlock_migrations(&self) -> MigrateResult<()> {
        let mut state = self.state();
        state.lock_depth = state.lock_depth.saturating_sub(1);
        Ok(())
    }
}
