use std::fs;
use std::io;
use std::path::Path;

/// Create `path` (and parents) unless it is already a directory
pub fn ensure_directory_exists(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(path)?;
    tracing::info!(dir = %path.display(), "created migrations directory");
    Ok(())
}
