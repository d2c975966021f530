//! PostgreSQL Ledger Store
//!
//! Keeps the ledger in a table of the target database and serializes ledger
//! writes with a PostgreSQL advisory lock. A single connection is opened per
//! run and used sequentially by every operation, including migration scripts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, Executor, PgConnection, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::definitions::MigrationRecord;
use super::ledger::{LedgerStore, ScriptExecutor};
use crate::error::{MigrateError, MigrateResult};

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Ledger table and lock settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Table name for tracking migrations, optionally schema-qualified
    pub table: String,
    /// Advisory lock key reserved for this migration subsystem
    pub lock_key: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: "migrations".to_string(),
            lock_key: 1,
        }
    }
}

impl LedgerConfig {
    /// The table name is interpolated into SQL, so only plain identifiers are accepted
    pub fn validate(&self) -> MigrateResult<()> {
        let mut parts = self.table.split('.');
        let valid = match (parts.next(), parts.next(), parts.next()) {
            (Some(table), None, None) => is_identifier(table),
            (Some(schema), Some(table), None) => is_identifier(schema) && is_identifier(table),
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(MigrateError::Configuration(format!(
                "invalid ledger table name '{}'",
                self.table
            )))
        }
    }

    /// SQL to create the migrations tracking table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
            )",
            self.table
        )
    }

    fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (name) VALUES ($1)", self.table)
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.table)
    }

    // Tables created by older tools use TIMESTAMP, hence the cast
    fn list_sql(&self) -> String {
        format!(
            "SELECT name, applied_at::timestamptz AS applied_at FROM {} ORDER BY applied_at ASC, id ASC",
            self.table
        )
    }

    fn latest_sql(&self) -> String {
        format!(
            "SELECT name FROM {} ORDER BY applied_at DESC, id DESC LIMIT 1",
            self.table
        )
    }

    fn exists_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1)",
            self.table
        )
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn write_error(name: &str, operation: &'static str, step: &str, err: sqlx::Error) -> MigrateError {
    MigrateError::LedgerWrite {
        name: name.to_string(),
        operation,
        message: format!("{}: {}", step, err),
    }
}

/// Ledger store backed by a PostgreSQL table
pub struct PostgresLedger {
    conn: Mutex<PgConnection>,
    config: LedgerConfig,
}

impl std::fmt::Debug for PostgresLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostgresLedger {
    /// Connect, verify reachability and make sure the ledger table exists
    pub async fn connect(database_url: &str, config: LedgerConfig) -> MigrateResult<Self> {
        config.validate()?;

        let conn = PgConnection::connect(database_url)
            .await
            .map_err(|e| MigrateError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::from_connection(conn, config).await
    }

    /// Wrap an already open connection
    pub async fn from_connection(conn: PgConnection, config: LedgerConfig) -> MigrateResult<Self> {
        config.validate()?;

        let ledger = Self {
            conn: Mutex::new(conn),
            config,
        };
        ledger.initialize().await?;
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    async fn initialize(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;

        conn.ping()
            .await
            .map_err(|e| MigrateError::Connection(format!("Failed to ping database: {}", e)))?;

        sqlx::query(&self.config.create_table_sql())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::Connection(format!("Failed to create migrations table: {}", e))
            })?;

        debug!(table = %self.config.table, "ledger table ready");
        Ok(())
    }

    /// Close the underlying connection
    pub async fn close(self) -> MigrateResult<()> {
        self.conn
            .into_inner()
            .close()
            .await
            .map_err(|e| MigrateError::Connection(format!("Failed to close connection: {}", e)))
    }

    /// Run one ledger statement for `name` inside a locked transaction
    async fn locked_write(&self, name: &str, operation: &'static str, sql: &str) -> MigrateResult<u64> {
        let mut conn = self.conn.lock().await;

        let mut transaction = conn
            .begin()
            .await
            .map_err(|e| write_error(name, operation, "failed to begin transaction", e))?;

        // Released automatically at commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(self.config.lock_key)
            .execute(&mut *transaction)
            .await
            .map_err(|e| write_error(name, operation, "failed to acquire lock", e))?;

        let result = match sqlx::query(sql).bind(name).execute(&mut *transaction).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    warn!(migration = name, error = %rollback_err, "ledger rollback failed");
                }
                if is_unique_violation(&e) {
                    return Err(MigrateError::DuplicateMigration(name.to_string()));
                }
                return Err(write_error(name, operation, "failed to write migration record", e));
            }
        };

        transaction
            .commit()
            .await
            .map_err(|e| write_error(name, operation, "failed to commit transaction", e))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ScriptExecutor for PostgresLedger {
    async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        // Unprepared execution uses the simple query protocol, which accepts
        // several statements and runs them as one implicit transaction
        (&mut *conn)
            .execute(sql)
            .await
            .map_err(|e| MigrateError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn apply_record(&self, name: &str) -> MigrateResult<()> {
        self.locked_write(name, "apply", &self.config.insert_sql()).await?;
        Ok(())
    }

    async fn revoke_record(&self, name: &str) -> MigrateResult<()> {
        let deleted = self.locked_write(name, "revoke", &self.config.delete_sql()).await?;
        if deleted == 0 {
            debug!(migration = name, "no ledger record to revoke");
        }
        Ok(())
    }

    async fn list_records(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(&self.config.list_sql())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| MigrateError::Query(format!("Failed to get applied migrations: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let name: String = row
                    .try_get("name")
                    .map_err(|e| MigrateError::Query(format!("Failed to get migration name: {}", e)))?;
                let applied_at: DateTime<Utc> = row
                    .try_get("applied_at")
                    .map_err(|e| MigrateError::Query(format!("Failed to get applied_at: {}", e)))?;
                Ok(MigrationRecord { name, applied_at })
            })
            .collect()
    }

    async fn latest_applied(&self) -> MigrateResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query(&self.config.latest_sql())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| MigrateError::Query(format!("Failed to get latest migration: {}", e)))?;

        row.map(|row| {
            row.try_get::<String, _>("name")
                .map_err(|e| MigrateError::Query(format!("Failed to get migration name: {}", e)))
        })
        .transpose()
    }

    async fn is_applied(&self, name: &str) -> MigrateResult<bool> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query(&self.config.exists_sql())
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MigrateError::Query(format!("Failed to check migration status: {}", e)))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| MigrateError::Query(format!("Failed to check migration status: {}", e)))
    }

    async fn lock_migrations(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(self.config.lock_key)
            .execute(&mut *conn)
            .await
            .map_err(|e| MigrateError::Query(format!("Failed to acquire migration lock: {}", e)))?;
        debug!(lock_key = self.config.lock_key, "migration lock acquired");
        Ok(())
    }

    async fn unlock_migrations(&self) -> MigrateResult<()> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.config.lock_key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MigrateError::Query(format!("Failed to release migration lock: {}", e)))?;

        let released: bool = row
            .try_get(0)
            .map_err(|e| MigrateError::Query(format!("Failed to release migration lock: {}", e)))?;
        if !released {
            warn!(lock_key = self.config.lock_key, "migration lock was not held");
        }
        Ok(())
    }
}
