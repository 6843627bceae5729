use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Create the local download directory if it does not exist yet.
pub fn ensure_download_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create download directory {}", dir.display()))?;
    debug!(path = %dir.display(), "download directory created.");
    Ok(())
}

/// Remove every entry inside the download directory, keeping the directory itself.
///
/// Returns the number of entries removed. A missing directory counts as clean.
pub fn cleanup_download_dir(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read download directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        }
        .with_context(|| format!("failed to remove {}", path.display()))?;
        removed += 1;
    }

    debug!(path = %dir.display(), removed = removed, "download directory cleaned.");
    Ok(removed)
}
