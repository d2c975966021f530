mod commands;
mod config;
mod utils;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::migrate;
use pgshift_core::{init_logging, LoggingConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pgshift", version)]
#[command(about = "Versioned schema migrations for PostgreSQL")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every command; each overrides env and config file
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// PostgreSQL connection URL (env: DB_DSN or DATABASE_URL)
    #[arg(long, global = true)]
    pub dsn: Option<String>,

    /// Directory holding migration files (default: ./migrations)
    #[arg(long, global = true)]
    pub dir: Option<String>,

    /// Migration file type: sql or rs
    #[arg(long = "type", global = true, value_name = "TYPE")]
    pub kind: Option<String>,

    /// Ledger table name
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// YAML configuration file (default: ./pgshift.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Advisory lock coverage: ledger-write or migration
    #[arg(long, global = true)]
    pub lock_scope: Option<String>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Create a new migration file
    Create {
        /// Short description, e.g. add_users_table
        slug: String,
    },

    /// Apply all pending migrations
    Up,

    /// Roll back the latest migration
    Down,

    /// Roll back the latest migration and apply it again
    Redo,

    /// List applied migrations
    Status,

    /// Print the version of the latest applied migration
    #[command(name = "dbversion")]
    DbVersion,

    /// Compare migration files with the ledger
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::resolve(&cli.global)?;
    init_logging(LoggingConfig::cli(&config.log_level, cli.global.log_json))?;
    utils::ensure_directory_exists(&config.migrations_dir)?;

    match cli.command {
        Commands::Create { slug } => migrate::create(&config, &slug)?,
        Commands::Up => migrate::up(&config).await?,
        Commands::Down => migrate::down(&config).await?,
        Commands::Redo => migrate::redo(&config).await?,
        Commands::Status => migrate::status(&config).await?,
        Commands::DbVersion => migrate::db_version(&config).await?,
        Commands::Audit => migrate::audit(&config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["pgshift", "create", "add_users"]).unwrap();
        assert_eq!(cli.command, Commands::Create { slug: "add_users".to_string() });

        let cli = Cli::try_parse_from(["pgshift", "dbversion"]).unwrap();
        assert_eq!(cli.command, Commands::DbVersion);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pgshift",
            "up",
            "--dsn",
            "postgres://localhost/app",
            "--type",
            "rs",
            "--lock-scope",
            "migration",
            "--log-json",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Up);
        assert_eq!(cli.global.dsn.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(cli.global.kind.as_deref(), Some("rs"));
        assert_eq!(cli.global.lock_scope.as_deref(), Some("migration"));
        assert!(cli.global.log_json);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["pgshift", "migrate"]).is_err());
        assert!(Cli::try_parse_from(["pgshift", "create"]).is_err());
    }
}
