use crate::config::{
    redact, AppConfigTrait, ConfigError, ConfigSource, ConfigValidator, OneOfValidator,
    PostgresUrlValidator,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "pgshift.yaml";

pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";
pub const DEFAULT_MIGRATION_KIND: &str = "sql";
pub const DEFAULT_TABLE: &str = "migrations";
pub const DEFAULT_LOCK_KEY: i64 = 1;
pub const DEFAULT_LOCK_SCOPE: &str = "ledger-write";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const MIGRATION_KINDS: OneOfValidator =
    OneOfValidator::new("migration_kind", &["sql", "rs", "rust", "native"]);
const LOCK_SCOPES: OneOfValidator =
    OneOfValidator::new("lock_scope", &["ledger-write", "ledger", "migration", "full"]);
const LOG_LEVELS: OneOfValidator =
    OneOfValidator::new("log_level", &["error", "warn", "info", "debug", "trace"]);

/// Environment variables per field, first match wins
const ENV_VARS: &[(&str, &[&str])] = &[
    ("dsn", &["DB_DSN", "DATABASE_URL"]),
    ("migrations_dir", &["PGSHIFT_DIR"]),
    ("migration_kind", &["PGSHIFT_TYPE"]),
    ("table", &["PGSHIFT_TABLE"]),
    ("lock_key", &["PGSHIFT_LOCK_KEY"]),
    ("lock_scope", &["PGSHIFT_LOCK_SCOPE"]),
    ("log_level", &["LOG_LEVEL"]),
];

/// Settings for one migrator run.
///
/// Values are layered: defaults, then the YAML file, then the environment,
/// then command-line flags applied with [`MigratorConfig::apply_override`].
#[derive(Clone, PartialEq)]
pub struct MigratorConfig {
    pub dsn: Option<String>,
    pub migrations_dir: PathBuf,
    pub migration_kind: String,
    pub table: String,
    pub lock_key: i64,
    pub lock_scope: String,
    pub log_level: String,
    sources: HashMap<String, ConfigSource>,
}

/// Shape of `pgshift.yaml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    dsn: Option<String>,
    #[serde(alias = "dir")]
    migrations_dir: Option<String>,
    #[serde(alias = "type")]
    migration_kind: Option<String>,
    table: Option<String>,
    lock_key: Option<i64>,
    lock_scope: Option<String>,
    log_level: Option<String>,
}

impl MigratorConfig {
    pub fn new() -> Self {
        let sources = [
            ("dsn", "none"),
            ("migrations_dir", DEFAULT_MIGRATIONS_DIR),
            ("migration_kind", DEFAULT_MIGRATION_KIND),
            ("table", DEFAULT_TABLE),
            ("lock_key", "1"),
            ("lock_scope", DEFAULT_LOCK_SCOPE),
            ("log_level", DEFAULT_LOG_LEVEL),
        ]
        .into_iter()
        .map(|(field, value)| (field.to_string(), ConfigSource::Default(value.to_string())))
        .collect();

        Self {
            dsn: None,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migration_kind: DEFAULT_MIGRATION_KIND.to_string(),
            table: DEFAULT_TABLE.to_string(),
            lock_key: DEFAULT_LOCK_KEY,
            lock_scope: DEFAULT_LOCK_SCOPE.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            sources,
        }
    }

    /// Defaults overlaid with the YAML file at `path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        config.apply_file(path)?;
        Ok(config)
    }

    /// Defaults, then the config file, then the environment.
    ///
    /// An explicit `path` must exist; without one, [`DEFAULT_CONFIG_FILE`] is
    /// read only if present in the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            }
            Some(path) => config.apply_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    config.apply_file(default_path)?;
                }
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Set `field` from a string value, recording where it came from
    pub fn apply_override(
        &mut self,
        field: &str,
        value: impl Into<String>,
        source: ConfigSource,
    ) -> Result<(), ConfigError> {
        self.assign(field, value.into())?;
        self.sources.insert(field.to_string(), source);
        Ok(())
    }

    /// DSN for commands that talk to the database
    pub fn require_dsn(&self) -> Result<&str, ConfigError> {
        match self.dsn.as_deref() {
            Some(dsn) if !dsn.trim().is_empty() => {
                PostgresUrlValidator.validate(dsn)?;
                Ok(dsn)
            }
            _ => Err(ConfigError::missing_required(
                "dsn",
                "Set DB_DSN (or DATABASE_URL), pass --dsn, or add `dsn` to pgshift.yaml",
            )),
        }
    }

    /// DSN with the password masked, for logs
    pub fn redacted_dsn(&self) -> Option<String> {
        self.dsn.as_deref().map(redact)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: FileConfig = if content.trim().is_empty() {
            FileConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        let values = [
            ("dsn", file.dsn),
            ("migrations_dir", file.migrations_dir),
            ("migration_kind", file.migration_kind),
            ("table", file.table),
            ("lock_key", file.lock_key.map(|key| key.to_string())),
            ("lock_scope", file.lock_scope),
            ("log_level", file.log_level),
        ];

        let origin = path.display().to_string();
        for (field, value) in values {
            if let Some(value) = value {
                self.apply_override(field, value, ConfigSource::File(origin.clone()))?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        for (field, vars) in ENV_VARS {
            let found = vars
                .iter()
                .find_map(|var| env::var(var).ok().filter(|v| !v.is_empty()).map(|v| (*var, v)));

            if let Some((var, value)) = found {
                self.apply_override(field, value, ConfigSource::EnvVar(var.to_string()))?;
            }
        }
        Ok(())
    }

    fn assign(&mut self, field: &str, value: String) -> Result<(), ConfigError> {
        match field {
            "dsn" => self.dsn = Some(value),
            "migrations_dir" => self.migrations_dir = PathBuf::from(value),
            "migration_kind" => self.migration_kind = value.to_lowercase(),
            "table" => self.table = value,
            "lock_key" => {
                self.lock_key = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::invalid_value("lock_key", &value, "a 64-bit integer"))?
            }
            "lock_scope" => self.lock_scope = value.to_lowercase(),
            "log_level" => self.log_level = value.to_lowercase(),
            _ => {
                return Err(ConfigError::invalid_value(
                    "field",
                    field,
                    "one of: dsn, migrations_dir, migration_kind, table, lock_key, lock_scope, log_level",
                ))
            }
        }
        Ok(())
    }
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impl keeps the password out of debug output
impl fmt::Debug for MigratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratorConfig")
            .field("dsn", &self.redacted_dsn())
            .field("migrations_dir", &self.migrations_dir)
            .field("migration_kind", &self.migration_kind)
            .field("table", &self.table)
            .field("lock_key", &self.lock_key)
            .field("lock_scope", &self.lock_scope)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl AppConfigTrait for MigratorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything but the presence of a DSN, which only database
    /// commands need (see [`MigratorConfig::require_dsn`])
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dsn) = self.dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
            PostgresUrlValidator.validate(dsn)?;
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::missing_required(
                "migrations_dir",
                "Use --dir or PGSHIFT_DIR to choose the migrations directory",
            ));
        }

        if self.table.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "table",
                "Use --table or PGSHIFT_TABLE to name the ledger table",
            ));
        }

        MIGRATION_KINDS.validate(self.migration_kind.as_str())?;
        LOCK_SCOPES.validate(self.lock_scope.as_str())?;
        LOG_LEVELS.validate(self.log_level.as_str())?;

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}
