use anyhow::{Context, Result};
use pgshift_core::{AppConfigTrait, ConfigSource, MigratorConfig};
use tracing::debug;

use crate::GlobalArgs;

/// Layer command-line flags over file and environment settings
pub fn resolve(args: &GlobalArgs) -> Result<MigratorConfig> {
    let mut config = MigratorConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;

    let flags = [
        ("dsn", "--dsn", &args.dsn),
        ("migrations_dir", "--dir", &args.dir),
        ("migration_kind", "--type", &args.kind),
        ("table", "--table", &args.table),
        ("lock_scope", "--lock-scope", &args.lock_scope),
        ("log_level", "--log-level", &args.log_level),
    ];

    for (field, flag, value) in flags {
        if let Some(value) = value {
            config.apply_override(field, value.as_str(), ConfigSource::CommandLine(flag.to_string()))?;
        }
    }

    config.validate().context("invalid configuration")?;

    for (field, source) in config.config_sources() {
        debug!(field = %field, source = %source, "configuration value");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    const ENV_VARS: &[&str] = &[
        "DB_DSN",
        "DATABASE_URL",
        "PGSHIFT_DIR",
        "PGSHIFT_TYPE",
        "PGSHIFT_TABLE",
        "PGSHIFT_LOCK_KEY",
        "PGSHIFT_LOCK_SCOPE",
        "LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        clear_env();
        std::env::set_var("DB_DSN", "postgres://env/app");
        std::env::set_var("PGSHIFT_TABLE", "env_ledger");

        let args = GlobalArgs {
            dsn: Some("postgres://flag/app".to_string()),
            dir: Some("db/migrations".to_string()),
            ..Default::default()
        };
        let config = resolve(&args).unwrap();
        clear_env();

        assert_eq!(config.dsn.as_deref(), Some("postgres://flag/app"));
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.table, "env_ledger");
        assert!(config.config_sources()["dsn"].is_command_line());
    }

    #[test]
    #[serial]
    fn test_invalid_flag_value_is_rejected() {
        clear_env();
        let args = GlobalArgs {
            kind: Some("python".to_string()),
            ..Default::default()
        };

        let err = resolve(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("migration_kind"));
    }
}
