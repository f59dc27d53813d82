//! Replaces the chain data of both clients with a published snapshot while
//! keeping the validator's signing state.
//!
//! Order of steps: stop both services, confirm they are down, take the
//! signing-state backup, wipe the data directories, stream each archive into
//! an unpacking pipeline, verify the expected directories exist, restore the
//! signing state, restart both services.

pub mod fetch;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::client::NodeClient;
use crate::constants::{layout, supervision};
use crate::errors::{OrchestratorError, Result};
use crate::guard::ValidatorStateGuard;
use crate::supervisor::{ServiceName, ServiceStatus, ServiceSupervisor};

pub use fetch::{ArchiveFetcher, Compression};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruningMode {
    Pruned,
    Archive,
}

impl std::fmt::Display for PruningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PruningMode::Pruned => write!(f, "pruned"),
            PruningMode::Archive => write!(f, "archive"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub network: String,
    pub pruning_mode: PruningMode,
    pub story_archive_url: String,
    pub geth_archive_url: String,
    /// `None` infers from each archive URL
    pub compression: Option<Compression>,
    pub reset_consensus_state: bool,
}

/// Directories wiped and refilled by an install. Archives unpack under the
/// extract roots and must produce the two data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDirs {
    pub story_data_dir: PathBuf,
    pub geth_chain_data_dir: PathBuf,
    pub story_extract_root: PathBuf,
    pub geth_extract_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub network: String,
    pub pruning_mode: PruningMode,
    pub story_archive_bytes: u64,
    pub geth_archive_bytes: u64,
    /// Whether a signing-state file was carried over from before the install
    pub signing_state_preserved: bool,
    pub services: BTreeMap<ServiceName, ServiceStatus>,
}

pub struct SnapshotInstaller {
    supervisor: Arc<dyn ServiceSupervisor>,
    client: Arc<dyn NodeClient>,
    fetcher: ArchiveFetcher,
    start_grace: Duration,
}

impl SnapshotInstaller {
    pub fn new(
        supervisor: Arc<dyn ServiceSupervisor>,
        client: Arc<dyn NodeClient>,
        fetcher: ArchiveFetcher,
    ) -> Self {
        Self {
            supervisor,
            client,
            fetcher,
            start_grace: supervision::START_GRACE,
        }
    }

    pub fn with_start_grace(mut self, start_grace: Duration) -> Self {
        self.start_grace = start_grace;
        self
    }

    /// Fresh install or resync from a healthy node
    pub async fn install(&self, spec: &SnapshotSpec, dirs: &DataDirs) -> Result<SnapshotReport> {
        self.run(spec, dirs, false).await
    }

    /// Retry after an earlier install failed mid-way: a signing-state backup
    /// left behind by that attempt is taken as the authoritative copy.
    pub async fn reinstall(&self, spec: &SnapshotSpec, dirs: &DataDirs) -> Result<SnapshotReport> {
        self.run(spec, dirs, true).await
    }

    #[instrument(skip(self, spec, dirs), fields(network = %spec.network, mode = %spec.pruning_mode))]
    async fn run(
        &self,
        spec: &SnapshotSpec,
        dirs: &DataDirs,
        adopt_existing_backup: bool,
    ) -> Result<SnapshotReport> {
        info!("Starting snapshot install");

        self.stop_and_confirm().await?;

        let guard = ValidatorStateGuard::new(
            &dirs.story_data_dir,
            Path::new(layout::SIGNING_STATE_FILE),
        )
        .adopting_existing_backup(adopt_existing_backup);

        let signing_state_preserved = tokio::fs::try_exists(guard.signing_state_path())
            .await
            .unwrap_or(false)
            || tokio::fs::try_exists(guard.backup_path()).await.unwrap_or(false);

        let (story_archive_bytes, geth_archive_bytes) = guard
            .with_preserved(|| self.replace_chain_data(spec, dirs))
            .await?;

        let services = self.restart_and_report().await?;

        info!("✓ Snapshot install completed");
        Ok(SnapshotReport {
            network: spec.network.clone(),
            pruning_mode: spec.pruning_mode,
            story_archive_bytes,
            geth_archive_bytes,
            signing_state_preserved,
            services,
        })
    }

    /// Nothing is deleted unless both services are confirmed down
    async fn stop_and_confirm(&self) -> Result<()> {
        info!("Stopping services before touching chain data");

        if let Err(e) = self.supervisor.stop(&ServiceName::BOTH).await {
            warn!("Stop reported an error, checking whether services are down anyway: {}", e);
        }

        for service in ServiceName::BOTH {
            let status = self.supervisor.status(service).await?;
            if status.is_active() {
                error!("{} still {} after stop; aborting before any deletion", service, status);
                return Err(OrchestratorError::supervision(
                    &service.to_string(),
                    "stop",
                    format!("still {} after stop", status),
                ));
            }
        }

        info!("✓ Both services confirmed stopped");
        Ok(())
    }

    async fn replace_chain_data(&self, spec: &SnapshotSpec, dirs: &DataDirs) -> Result<(u64, u64)> {
        if spec.reset_consensus_state {
            self.client.reset_consensus_state().await?;
        }

        remove_dir_if_present(&dirs.story_data_dir).await?;
        remove_dir_if_present(&dirs.geth_chain_data_dir).await?;

        for root in [&dirs.story_extract_root, &dirs.geth_extract_root] {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|e| OrchestratorError::io(root, e))?;
        }

        let story_bytes = self
            .fetcher
            .fetch_and_extract(&spec.story_archive_url, spec.compression, &dirs.story_extract_root)
            .await?;
        let geth_bytes = self
            .fetcher
            .fetch_and_extract(&spec.geth_archive_url, spec.compression, &dirs.geth_extract_root)
            .await?;

        for expected in [&dirs.story_data_dir, &dirs.geth_chain_data_dir] {
            if !tokio::fs::try_exists(expected).await.unwrap_or(false) {
                return Err(OrchestratorError::SnapshotExtractError {
                    target: expected.to_path_buf(),
                    reason: "archive did not produce this directory".to_string(),
                });
            }
        }

        Ok((story_bytes, geth_bytes))
    }

    async fn restart_and_report(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        info!("Restarting services on the new chain data");

        self.supervisor
            .restart(&ServiceName::START_ORDER)
            .await
            .map_err(post_install_error)?;

        if !self.start_grace.is_zero() {
            tokio::time::sleep(self.start_grace).await;
        }

        let mut services = BTreeMap::new();
        for service in ServiceName::START_ORDER {
            let status = self
                .supervisor
                .status(service)
                .await
                .map_err(post_install_error)?;
            info!("{} is {}", service, status);
            services.insert(service, status);
        }

        if let Some((service, status)) = services.iter().find(|(_, status)| !status.is_active()) {
            return Err(OrchestratorError::PostInstallSupervisionError {
                service: service.to_string(),
                reason: format!("{} after restart", status),
            });
        }

        Ok(services)
    }
}

fn post_install_error(e: OrchestratorError) -> OrchestratorError {
    match e {
        OrchestratorError::SupervisionError {
            service, reason, ..
        } => OrchestratorError::PostInstallSupervisionError { service, reason },
        other => OrchestratorError::PostInstallSupervisionError {
            service: "services".to_string(),
            reason: other.to_string(),
        },
    }
}

pub(crate) async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::io(path, e)),
    }
}
