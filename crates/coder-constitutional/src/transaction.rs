//! Staged file transaction
//!
//! Tracks every file an edit batch is about to touch so the batch can be
//! undone as a unit:
//! - existing files are copied into a temp backup and their permissions kept
//! - missing files are remembered as creates
//!
//! A transaction is single-use. After [`FileTransaction::commit`] or
//! [`FileTransaction::rollback`] every state set is empty and further calls
//! return [`TransactionError::Finished`].

use crate::error::TransactionError;
use crate::workspace;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Multi-file transaction with temp-file backups
#[derive(Debug, Default)]
pub struct FileTransaction {
    /// original path -> backup copy
    backups: BTreeMap<PathBuf, TempPath>,
    /// original path -> original permissions
    modes: BTreeMap<PathBuf, Permissions>,
    /// paths that did not exist at stage time
    creates: BTreeSet<PathBuf>,
    finished: bool,
}

impl FileTransaction {
    /// Create empty transaction
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` before it is mutated
    ///
    /// Idempotent: a path already tracked as backup or create is left alone.
    ///
    /// # Errors
    /// - `TransactionError::Finished` after commit/rollback
    /// - `TransactionError::Stage` if the file cannot be inspected or copied
    pub async fn stage(&mut self, path: &Path) -> Result<(), TransactionError> {
        self.ensure_open()?;
        if self.is_tracked(path) {
            return Ok(());
        }

        match tokio::fs::metadata(path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.creates.insert(path.to_path_buf());
                tracing::debug!(path = %path.display(), "staged create");
                Ok(())
            }
            Err(e) => Err(TransactionError::stage(path, e)),
            Ok(meta) => {
                let backup = tempfile::Builder::new()
                    .prefix("coder-backup-")
                    .tempfile()
                    .map_err(|e| TransactionError::stage(path, e))?
                    .into_temp_path();

                tokio::fs::copy(path, &backup)
                    .await
                    .map_err(|e| TransactionError::stage(path, e))?;

                self.modes.insert(path.to_path_buf(), meta.permissions());
                self.backups.insert(path.to_path_buf(), backup);
                tracing::debug!(path = %path.display(), "staged backup");
                Ok(())
            }
        }
    }

    /// Keep all mutations and delete the backups
    ///
    /// # Errors
    /// - `TransactionError::Finished` if already finished
    /// - `TransactionError::Cleanup` if some backups could not be deleted;
    ///   the transaction is still finished
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.ensure_open()?;
        self.finished = true;

        let mut failures = Vec::new();
        for (original, backup) in std::mem::take(&mut self.backups) {
            if let Err(e) = backup.close() {
                failures.push(format!("{}: {e}", original.display()));
            }
        }
        self.modes.clear();
        self.creates.clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::Cleanup(failures))
        }
    }

    /// Restore originals and remove created files
    ///
    /// Every tracked path is attempted even if an earlier one fails.
    /// Removal of created files is best-effort.
    ///
    /// # Errors
    /// - `TransactionError::Finished` if already finished
    /// - `TransactionError::RollbackIncomplete` listing originals that could
    ///   not be restored
    pub async fn rollback(&mut self) -> Result<(), TransactionError> {
        self.ensure_open()?;
        self.finished = true;

        let backups = std::mem::take(&mut self.backups);
        let mut modes = std::mem::take(&mut self.modes);
        let creates = std::mem::take(&mut self.creates);

        let mut failures = Vec::new();
        for (original, backup) in backups {
            let mode = modes.remove(&original);
            if let Err(msg) = restore(&original, &backup, mode).await {
                failures.push(msg);
            }
            if let Err(e) = backup.close() {
                tracing::warn!(path = %original.display(), error = %e, "backup cleanup failed");
            }
        }

        for path in creates {
            if let Err(e) = workspace::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "could not remove created file");
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::RollbackIncomplete(failures))
        }
    }

    /// Whether `path` is tracked as backup or create
    #[inline]
    #[must_use]
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.backups.contains_key(path) || self.creates.contains(path)
    }

    /// Whether `path` was absent at stage time
    #[inline]
    #[must_use]
    pub fn is_create(&self, path: &Path) -> bool {
        self.creates.contains(path)
    }

    /// Backup location for `path`, if it existed at stage time
    #[inline]
    #[must_use]
    pub fn backup_path(&self, path: &Path) -> Option<&Path> {
        self.backups.get(path).map(|p| &**p)
    }

    /// Number of backed-up files
    #[inline]
    #[must_use]
    pub fn backup_count(&self) -> usize {
        self.backups.len()
    }

    /// Number of recorded permission sets
    #[inline]
    #[must_use]
    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    /// Number of staged creates
    #[inline]
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.len()
    }

    /// True when all three state sets are empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backups.is_empty() && self.modes.is_empty() && self.creates.is_empty()
    }

    /// True after commit or rollback
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        if self.finished {
            Err(TransactionError::Finished)
        } else {
            Ok(())
        }
    }
}

impl Drop for FileTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.is_empty() {
            tracing::warn!(
                backups = self.backups.len(),
                creates = self.creates.len(),
                "file transaction dropped without commit or rollback"
            );
        }
    }
}

async fn restore(original: &Path, backup: &Path, mode: Option<Permissions>) -> Result<(), String> {
    let bytes = tokio::fs::read(backup)
        .await
        .map_err(|e| format!("{}: reading backup: {e}", original.display()))?;

    workspace::write_file(original, &bytes)
        .await
        .map_err(|e| format!("{}: {e}", original.display()))?;

    if let Some(mode) = mode {
        tokio::fs::set_permissions(original, mode)
            .await
            .map_err(|e| format!("{}: restoring mode: {e}", original.display()))?;
    }
    Ok(())
}
