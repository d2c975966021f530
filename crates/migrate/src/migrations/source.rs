//! Migration Source - File system operations for migrations
//!
//! Handles discovering, parsing and authoring migration files. Files are named
//! `<4-digit sequence>_<slug>.<suffix>`; the numeric prefix defines the order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::definitions::{
    file_stem, format_migration_name, parse_version, Action, Migration, MigrationKind, NativeHandle,
};
use crate::error::{MigrateError, MigrateResult};

const SECTION_MARKER: &str = "-- +migrate ";
const UP_MARKER: &str = "-- +migrate Up";
const DOWN_MARKER: &str = "-- +migrate Down";

/// Loads and authors migration files in one directory
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
    kind: MigrationKind,
}

impl MigrationSource {
    pub fn new(dir: impl Into<PathBuf>, kind: MigrationKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn kind(&self) -> MigrationKind {
        self.kind
    }

    /// Load all migrations of this source's kind, ordered by version.
    ///
    /// A missing directory is treated as empty.
    pub fn load_migrations(&self) -> MigrateResult<Vec<Migration>> {
        if !self.dir.exists() {
            debug!(dir = %self.dir.display(), "migrations directory does not exist");
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for file_name in self.list_migration_files()? {
            let path = self.dir.join(&file_name);
            migrations.push(self.parse_migration_file(&path, &file_name)?);
        }

        // Equal prefixes are not expected; name keeps the order deterministic
        migrations.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));
        debug!(count = migrations.len(), dir = %self.dir.display(), "loaded migrations");
        Ok(migrations)
    }

    /// Next free sequence number: highest numeric prefix in the directory + 1
    pub fn next_migration_number(&self) -> MigrateResult<u32> {
        if !self.dir.exists() {
            return Ok(1);
        }

        let mut max = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if let Ok(version) = parse_version(&file_name.to_string_lossy()) {
                max = max.max(version);
            }
        }
        max.checked_add(1).ok_or_else(|| {
            MigrateError::Configuration(format!(
                "no migration number left after {} in {}",
                max,
                self.dir.display()
            ))
        })
    }

    /// Create a new migration file from the template for this source's kind.
    ///
    /// Returns the path of the written file.
    pub fn create_migration(&self, slug: &str) -> MigrateResult<PathBuf> {
        if slug.trim().is_empty() {
            return Err(MigrateError::Configuration(
                "migration name is required".to_string(),
            ));
        }

        fs::create_dir_all(&self.dir)?;

        let file_name = format_migration_name(self.next_migration_number()?, slug, self.kind);
        let path = self.dir.join(&file_name);
        if path.exists() {
            return Err(MigrateError::Configuration(format!(
                "migration file {} already exists",
                path.display()
            )));
        }

        fs::write(&path, migration_template(self.kind))?;
        Ok(path)
    }

    fn list_migration_files(&self) -> MigrateResult<Vec<String>> {
        let suffix = format!(".{}", self.kind.suffix());
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            // Follows symlinks
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(&suffix) {
                files.push(file_name);
            }
        }

        Ok(files)
    }

    fn parse_migration_file(&self, path: &Path, file_name: &str) -> MigrateResult<Migration> {
        let version =
            parse_version(file_name).map_err(|e| MigrateError::parse(file_name, e.to_string()))?;

        let (up, down) = match self.kind {
            MigrationKind::Sql => {
                let content = fs::read_to_string(path).map_err(|e| {
                    MigrateError::parse(file_name, format!("failed to read migration file: {}", e))
                })?;
                let (up, down) = parse_sql_sections(&content);
                (Action::Sql(up), Action::Sql(down))
            }
            MigrationKind::Native => {
                let handle = NativeHandle::new(file_stem(file_name));
                (Action::Native(handle.clone()), Action::Native(handle))
            }
        };

        Ok(Migration {
            name: file_name.to_string(),
            version,
            kind: self.kind,
            up,
            down,
        })
    }
}

/// Split SQL migration content into its Up and Down sections
pub fn parse_sql_sections(content: &str) -> (String, String) {
    (
        extract_section(content, UP_MARKER),
        extract_section(content, DOWN_MARKER),
    )
}

fn extract_section(content: &str, marker: &str) -> String {
    let Some(start) = content.find(marker) else {
        return String::new();
    };
    let body = &content[start + marker.len()..];
    let end = body.find(SECTION_MARKER).unwrap_or(body.len());
    body[..end].trim().to_string()
}

/// Template written by [`MigrationSource::create_migration`]
pub fn migration_template(kind: MigrationKind) -> &'static str {
    match kind {
        MigrationKind::Sql => "-- +migrate Up\n\n-- +migrate Down\n",
        MigrationKind::Native => NATIVE_TEMPLATE,
    }
}

const NATIVE_TEMPLATE: &str = r#"use pgshift_migrate::{async_trait, MigrateResult, NativeMigration, ScriptExecutor};

pub struct Migration;

#[async_trait]
impl NativeMigration for Migration {
    /// Forward change
    async fn up(&self, db: &dyn ScriptExecutor) -> MigrateResult<()> {
        let _ = db;
        Ok(())
    }

    /// Backward change
    async fn down(&self, db: &dyn ScriptExecutor) -> MigrateResult<()> {
        let _ = db;
        Ok(())
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sql_sections() {
        let content = "-- +migrate Up\nCREATE TABLE users (id INT);\n\n-- +migrate Down\nDROP TABLE users;\n";
        let (up, down) = parse_sql_sections(content);
        assert_eq!(up, "CREATE TABLE users (id INT);");
        assert_eq!(down, "DROP TABLE users;");
    }

    #[test]
    fn test_parse_sql_sections_missing_down() {
        let (up, down) = parse_sql_sections("-- +migrate Up\nSELECT 1;");
        assert_eq!(up, "SELECT 1;");
        assert_eq!(down, "");
    }

    #[test]
    fn test_parse_sql_sections_down_before_up() {
        let content = "-- +migrate Down\nDROP TABLE t;\n-- +migrate Up\nCREATE TABLE t ();";
        let (up, down) = parse_sql_sections(content);
        assert_eq!(up, "CREATE TABLE t ();");
        assert_eq!(down, "DROP TABLE t;");
    }

    #[test]
    fn test_load_migrations_orders_by_numeric_prefix() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("0010_ten.sql"), "-- +migrate Up\nSELECT 10;").unwrap();
        fs::write(temp_dir.path().join("0002_two.sql"), "-- +migrate Up\nSELECT 2;").unwrap();
        fs::write(temp_dir.path().join("0001_one.sql"), "-- +migrate Up\nSELECT 1;\n-- +migrate Down\nSELECT -1;").unwrap();
        fs::write(temp_dir.path().join("0003_other.rs"), "").unwrap();
        fs::write(temp_dir.path().join("README.md"), "notes").unwrap();
        fs::create_dir(temp_dir.path().join("0004_dir.sql")).unwrap();

        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Sql);
        let migrations = source.load_migrations().unwrap();

        let names: Vec<_> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["0001_one.sql", "0002_two.sql", "0010_ten.sql"]);
        assert_eq!(migrations[0].up, Action::Sql("SELECT 1;".to_string()));
        assert_eq!(migrations[0].down, Action::Sql("SELECT -1;".to_string()));
        assert_eq!(migrations[2].version, 10);
    }

    #[test]
    fn test_next_migration_number_overflow_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("4294967295_max.sql"), "").unwrap();

        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Sql);
        assert!(matches!(
            source.next_migration_number(),
            Err(MigrateError::Configuration(_))
        ));
        assert!(matches!(
            source.create_migration("next"),
            Err(MigrateError::Configuration(_))
        ));

        let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_migrations_follows_symlinks() {
        let shared = TempDir::new().unwrap();
        let target = shared.path().join("0001_shared.sql");
        fs::write(&target, "-- +migrate Up\nSELECT 1;").unwrap();

        let temp_dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(&target, temp_dir.path().join("0001_shared.sql")).unwrap();

        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Sql);
        let migrations = source.load_migrations().unwrap();

        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].up, Action::Sql("SELECT 1;".to_string()));
    }

    #[test]
    fn test_load_migrations_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let source = MigrationSource::new(temp_dir.path().join("nope"), MigrationKind::Sql);
        assert!(source.load_migrations().unwrap().is_empty());
    }

    #[test]
    fn test_load_migrations_reports_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("add_users.sql"), "").unwrap();

        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Sql);
        match source.load_migrations() {
            Err(MigrateError::Parse { file, .. }) => assert_eq!(file, "add_users.sql"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_native_migrations() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("0001_seed.rs"), "").unwrap();

        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Native);
        let migrations = source.load_migrations().unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].up, Action::Native(NativeHandle::new("0001_seed")));
    }

    #[test]
    fn test_create_migration_numbers_sequentially() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        let source = MigrationSource::new(&dir, MigrationKind::Sql);

        let first = source.create_migration("create_users").unwrap();
        let second = source.create_migration("add email").unwrap();

        assert_eq!(first.file_name().unwrap(), "0001_create_users.sql");
        assert_eq!(second.file_name().unwrap(), "0002_add_email.sql");
        assert_eq!(
            fs::read_to_string(first).unwrap(),
            "-- +migrate Up\n\n-- +migrate Down\n"
        );
        assert_eq!(source.next_migration_number().unwrap(), 3);
    }

    #[test]
    fn test_create_native_migration_template() {
        let temp_dir = TempDir::new().unwrap();
        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Native);
        fs::write(temp_dir.path().join("0007_existing.sql"), "").unwrap();

        let path = source.create_migration("backfill").unwrap();
        assert_eq!(path.file_name().unwrap(), "0008_backfill.rs");

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("async fn up(&self"));
        assert!(content.contains("async fn down(&self"));
    }

    #[test]
    fn test_create_migration_requires_name() {
        let temp_dir = TempDir::new().unwrap();
        let source = MigrationSource::new(temp_dir.path(), MigrationKind::Sql);
        assert!(matches!(
            source.create_migration("  "),
            Err(MigrateError::Configuration(_))
        ));
    }
}
