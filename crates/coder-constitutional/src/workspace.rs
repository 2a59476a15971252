//! Direct workspace IO
//!
//! Used when no action router is attached and by transaction rollback.
//! Directories are created 0755 and files written 0644 on unix.

use crate::error::WriteError;
use std::io::ErrorKind;
use std::path::Path;

/// Write `bytes` to `path`, creating parent directories
///
/// # Errors
/// Returns `WriteError::Io` if any filesystem step fails.
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dirs(parent)
                .await
                .map_err(|e| WriteError::io_error(parent, e))?;
        }
    }

    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| WriteError::io_error(path, e))?;

    set_file_mode(path)
        .await
        .map_err(|e| WriteError::io_error(path, e))
}

/// Remove `path`; a missing file is not an error
///
/// # Errors
/// Returns `WriteError::Io` for anything other than `NotFound`.
pub async fn remove_file(path: &Path) -> Result<(), WriteError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WriteError::io_error(path, e)),
    }
}

/// Read `path`, mapping `NotFound` to `None`
///
/// # Errors
/// Returns `WriteError::Io` for anything other than `NotFound`.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, WriteError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WriteError::io_error(path, e)),
    }
}

#[cfg(unix)]
async fn create_dirs(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true).mode(0o755);
    builder.create(dir).await
}

#[cfg(not(unix))]
async fn create_dirs(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

#[cfg(unix)]
async fn set_file_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn set_file_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
