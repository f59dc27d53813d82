//! Keeps the validator's signing state alive across destructive data
//! operations.
//!
//! The signing-state file is copied to a sibling of the data directory before
//! the operation runs and moved back after it succeeds. The file is treated as
//! opaque bytes: it is never parsed, regenerated, or fabricated when absent.

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::constants::layout;
use crate::errors::{OrchestratorError, Result};

pub struct ValidatorStateGuard {
    data_dir: PathBuf,
    rel_path: PathBuf,
    backup_path: PathBuf,
    adopt_existing_backup: bool,
}

/// A backup taken by [`ValidatorStateGuard::preserve`], restorable once
#[derive(Debug)]
pub struct PreservedState {
    backup: Option<PathBuf>,
    target: PathBuf,
}

impl ValidatorStateGuard {
    /// Backup goes next to `data_dir`, so wiping `data_dir` cannot reach it
    pub fn new(data_dir: &Path, rel_path: &Path) -> Self {
        let parent = data_dir.parent().unwrap_or(data_dir);
        Self {
            data_dir: data_dir.to_path_buf(),
            rel_path: rel_path.to_path_buf(),
            backup_path: parent.join(layout::SIGNING_STATE_BACKUP_FILE),
            adopt_existing_backup: false,
        }
    }

    /// Treat a backup left by an earlier failed operation as authoritative,
    /// even if the data directory holds a signing-state file again.
    pub fn adopting_existing_backup(mut self, adopt: bool) -> Self {
        self.adopt_existing_backup = adopt;
        self
    }

    pub fn signing_state_path(&self) -> PathBuf {
        self.data_dir.join(&self.rel_path)
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub async fn preserve(&self) -> Result<PreservedState> {
        let target = self.signing_state_path();
        let live_exists = path_exists(&target).await;
        let backup_exists = path_exists(&self.backup_path).await;

        if backup_exists {
            if live_exists && !self.adopt_existing_backup {
                return Err(OrchestratorError::precondition(
                    "preserve signing state",
                    format!(
                        "a signing-state backup from an earlier operation is still at {} while {} exists; restore or remove the backup first",
                        self.backup_path.display(),
                        target.display()
                    ),
                ));
            }
            warn!(
                "Adopting existing signing-state backup at {}",
                self.backup_path.display()
            );
            return Ok(PreservedState {
                backup: Some(self.backup_path.clone()),
                target,
            });
        }

        if !live_exists {
            info!(
                "No signing state at {} - nothing to preserve",
                target.display()
            );
            return Ok(PreservedState {
                backup: None,
                target,
            });
        }

        tokio::fs::copy(&target, &self.backup_path)
            .await
            .map_err(|e| OrchestratorError::io(&self.backup_path, e))?;
        info!(
            "✓ Signing state backed up from {} to {}",
            target.display(),
            self.backup_path.display()
        );

        Ok(PreservedState {
            backup: Some(self.backup_path.clone()),
            target,
        })
    }

    /// Runs `op` with the signing state held aside.
    ///
    /// On success the backup is moved back into place. On failure the backup is
    /// left where it is and the error is wrapped in `ManualRecoveryRequired`
    /// naming the backup path; no restore is attempted into a half-written
    /// data directory.
    pub async fn with_preserved<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut preserved = self.preserve().await?;

        match op().await {
            Ok(value) => {
                if let Err(e) = preserved.restore().await {
                    return Err(OrchestratorError::ManualRecoveryRequired {
                        backup: self.backup_path.clone(),
                        source: Box::new(e),
                    });
                }
                Ok(value)
            }
            Err(e) => match preserved.backup() {
                Some(backup) => {
                    error!(
                        "Destructive step failed; signing state remains at {}",
                        backup.display()
                    );
                    Err(OrchestratorError::ManualRecoveryRequired {
                        backup: backup.to_path_buf(),
                        source: Box::new(e),
                    })
                }
                None => Err(e),
            },
        }
    }
}

impl PreservedState {
    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// Moves the backup over whatever is at the target path. Returns `false`
    /// when there was nothing to restore, including on a second call.
    pub async fn restore(&mut self) -> Result<bool> {
        let Some(backup) = self.backup.take() else {
            return Ok(false);
        };

        if let Some(parent) = self.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::io(parent, e))?;
        }

        if let Err(rename_err) = tokio::fs::rename(&backup, &self.target).await {
            // rename fails across filesystems
            warn!(
                "Rename of {} failed ({}), falling back to copy",
                backup.display(),
                rename_err
            );
            if let Err(e) = tokio::fs::copy(&backup, &self.target).await {
                self.backup = Some(backup);
                return Err(OrchestratorError::io(&self.target, e));
            }
            tokio::fs::remove_file(&backup)
                .await
                .map_err(|e| OrchestratorError::io(&backup, e))?;
        }

        info!(
            "✓ Signing state restored to {} - signing history preserved",
            self.target.display()
        );
        Ok(true)
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
