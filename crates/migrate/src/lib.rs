//! # pgshift-migrate: Versioned schema migrations for PostgreSQL
//!
//! Migrations are files named `NNNN_slug.sql` (or `.rs` for migrations
//! implemented in Rust). The engine applies pending migrations in file order,
//! reverts the most recently applied one, and records every change in a ledger
//! table guarded by a PostgreSQL advisory lock.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pgshift_migrate::{LedgerConfig, MigrationEngine, MigrationKind, MigrationSource, PostgresLedger};
//!
//! # async fn run() -> pgshift_migrate::MigrateResult<()> {
//! let ledger = PostgresLedger::connect("postgres://localhost/app", LedgerConfig::default()).await?;
//! let engine = MigrationEngine::new(
//!     MigrationSource::new("./migrations", MigrationKind::Sql),
//!     Arc::new(ledger),
//! );
//! let result = engine.up().await?;
//! println!("applied {} migrations", result.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod migrations;

pub use error::*;
pub use migrations::*;

// Native migration files implement `NativeMigration` with this macro
pub use async_trait::async_trait;
