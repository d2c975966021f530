use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use pgshift_core::MigratorConfig;
use pgshift_migrate::{
    LedgerConfig, LockScope, MigrationEngine, MigrationKind, MigrationSource, PostgresLedger,
};
use tracing::{info, warn};

fn migration_source(config: &MigratorConfig) -> Result<MigrationSource> {
    let kind: MigrationKind = config.migration_kind.parse()?;
    Ok(MigrationSource::new(&config.migrations_dir, kind))
}

/// Open the ledger and build an engine for the configured directory
async fn connect(config: &MigratorConfig) -> Result<MigrationEngine<PostgresLedger>> {
    let dsn = config.require_dsn()?;
    let source = migration_source(config)?;
    let lock_scope: LockScope = config.lock_scope.parse()?;

    if source.kind() == MigrationKind::Native {
        warn!("native migrations only run from a binary that registers them in a NativeRegistry");
    }

    let ledger_config = LedgerConfig {
        table: config.table.clone(),
        lock_key: config.lock_key,
    };

    info!(
        dsn = %config.redacted_dsn().unwrap_or_default(),
        table = %ledger_config.table,
        %lock_scope,
        "opening migration ledger"
    );
    let ledger = PostgresLedger::connect(dsn, ledger_config)
        .await
        .context("failed to open migration ledger")?;

    Ok(MigrationEngine::new(source, Arc::new(ledger)).with_lock_scope(lock_scope))
}

pub fn create(config: &MigratorConfig, slug: &str) -> Result<()> {
    let path = migration_source(config)?.create_migration(slug)?;
    println!("{}", created_message(&path));
    Ok(())
}

fn created_message(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("Migration '{}' created successfully", name)
}

pub async fn up(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let result = engine.up().await?;

    info!(
        applied = result.applied_count(),
        skipped = result.skipped_count,
        elapsed_ms = result.execution_time_ms as u64,
        "migrations applied"
    );
    println!("All migrations applied successfully");
    Ok(())
}

pub async fn down(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let result = engine.down().await?;

    info!(
        migration = %result.rolled_back_migration,
        elapsed_ms = result.execution_time_ms as u64,
        "migration rolled back"
    );
    println!("Latest migration rolled back successfully");
    Ok(())
}

pub async fn redo(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let result = engine.redo().await?;

    info!(
        rolled_back = %result.rolled_back.rolled_back_migration,
        reapplied = result.reapplied.applied_count(),
        "migration redone"
    );
    println!("Latest migration redone successfully");
    Ok(())
}

pub async fn status(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let report = engine.status_report().await?;

    if report.is_empty() {
        println!("No migrations applied");
    } else {
        println!("{}", report);
    }
    Ok(())
}

pub async fn db_version(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let version = engine.db_version().await?;
    println!("Current DB version: {}", version);
    Ok(())
}

pub async fn audit(config: &MigratorConfig) -> Result<()> {
    let engine = connect(config).await?;
    let report = engine.audit().await?;

    if report.is_clean() {
        println!("No drift detected");
        return Ok(());
    }

    for name in &report.pending {
        println!("Pending: {}", name);
    }
    for name in &report.orphaned {
        println!("Orphaned: {}", name);
    }
    Ok(())
}
