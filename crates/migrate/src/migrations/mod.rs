//! Migration System
//!
//! Loading migration files, recording applied migrations in a ledger table and
//! the engine that applies and reverts them.

pub mod definitions;
pub mod engine;
pub mod ledger;
pub mod memory;
pub mod native;
pub mod postgres;
pub mod source;

pub use definitions::*;
pub use engine::{LockScope, MigrationEngine};
pub use ledger::{LedgerStore, ScriptExecutor};
pub use memory::MemoryLedger;
pub use native::{NativeMigration, NativeRegistry};
pub use postgres::{LedgerConfig, PostgresLedger};
pub use source::{migration_template, parse_sql_sections, MigrationSource};
