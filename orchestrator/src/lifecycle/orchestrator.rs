use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{DecommissionConfirmation, InstallOptions, NodeState, NodeStatusReport};
use crate::client::{
    ensure_binaries, BinaryVersions, ConsensusRpc, ExecutionRpc, NodeClient, ResourceGate,
    SyncStatus, ValidatorAction, ValidatorOutcome,
};
use crate::config::NodeSettings;
use crate::config_patcher::{self, ApplyReport};
use crate::constants::{layout, operations, supervision};
use crate::errors::{OrchestratorError, Result};
use crate::operation_tracker::OperationTracker;
use crate::snapshot::{
    remove_dir_if_present, ArchiveFetcher, PruningMode, SnapshotInstaller, SnapshotReport, SnapshotSpec,
};
use crate::supervisor::unit::{consensus_unit, execution_unit};
use crate::supervisor::{ServiceName, ServiceStatus, ServiceSupervisor};

/// Drives one node through its lifecycle. Every mutating operation holds the
/// node in the operation tracker for its whole duration; `status` and `logs`
/// never take it.
pub struct NodeOrchestrator {
    settings: NodeSettings,
    supervisor: Arc<dyn ServiceSupervisor>,
    client: Arc<dyn NodeClient>,
    resources: Arc<dyn ResourceGate>,
    installer: SnapshotInstaller,
    execution_rpc: ExecutionRpc,
    versions: RwLock<BinaryVersions>,
    state: RwLock<NodeState>,
    tracker: OperationTracker,
    start_grace: Duration,
}

impl NodeOrchestrator {
    pub fn new(
        settings: NodeSettings,
        supervisor: Arc<dyn ServiceSupervisor>,
        client: Arc<dyn NodeClient>,
        resources: Arc<dyn ResourceGate>,
        fetcher: ArchiveFetcher,
    ) -> Self {
        let installer = SnapshotInstaller::new(supervisor.clone(), client.clone(), fetcher);
        let execution_rpc = ExecutionRpc::local(settings.ports.execution_http);
        let versions = BinaryVersions {
            story: settings.binaries.story_version.clone(),
            geth: settings.binaries.geth_version.clone(),
        };

        Self {
            settings,
            supervisor,
            client,
            resources,
            installer,
            execution_rpc,
            versions: RwLock::new(versions),
            state: RwLock::new(NodeState::Uninitialized),
            tracker: OperationTracker::new(),
            start_grace: supervision::START_GRACE,
        }
    }

    /// Pause between starting services and reading their status
    pub fn with_start_grace(mut self, start_grace: Duration) -> Self {
        self.installer = self.installer.with_start_grace(start_grace);
        self.start_grace = start_grace;
        self
    }

    pub fn with_execution_rpc(mut self, execution_rpc: ExecutionRpc) -> Self {
        self.execution_rpc = execution_rpc;
        self
    }

    pub fn with_state(self, state: NodeState) -> Self {
        Self {
            state: RwLock::new(state),
            ..self
        }
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub async fn state(&self) -> NodeState {
        self.state.read().await.clone()
    }

    async fn set_state(&self, next: NodeState) {
        let mut state = self.state.write().await;
        if *state != next {
            info!("Node {}: {} -> {}", self.settings.moniker, *state, next);
        }
        *state = next;
    }

    /// Claims the node for `operation`, checks the current state permits it,
    /// runs `op`, and releases the node whatever the outcome.
    async fn exclusive<T, F, Fut>(&self, operation: &str, target: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let node = self.settings.moniker.as_str();
        self.tracker.try_start_operation(node, operation).await?;

        let result = match self.state().await.ensure_permits(operation, target) {
            Ok(()) => op().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!("Operation '{}' on {} failed: {}", operation, node, e);
        }
        self.tracker.finish_operation(node).await;
        result
    }

    /// Works out where a node stands from what is on disk and what the
    /// supervisor reports. Used once at startup.
    pub async fn detect_state(&self) -> Result<NodeState> {
        let detected = if !path_exists(&self.settings.consensus_config_path()).await {
            NodeState::Uninitialized
        } else {
            let backup = self.settings.story_home().join(layout::SIGNING_STATE_BACKUP_FILE);
            if path_exists(&backup).await {
                NodeState::Degraded {
                    reason: "signing-state backup left behind by an interrupted operation".to_string(),
                    signing_state_backup: Some(backup),
                }
            } else if self.statuses().await?.values().all(ServiceStatus::is_active) {
                NodeState::Running
            } else {
                NodeState::Configured
            }
        };

        info!("Detected node state: {}", detected);
        self.set_state(detected.clone()).await;
        Ok(detected)
    }

    pub async fn configure(&self) -> Result<Vec<ApplyReport>> {
        self.exclusive(operations::CONFIGURE, "configured", || async {
            let reports = self.configure_inner().await?;
            self.set_state(NodeState::Configured).await;
            Ok(reports)
        })
        .await
    }

    async fn configure_inner(&self) -> Result<Vec<ApplyReport>> {
        self.resources.check().await?;

        let expected = self.versions.read().await.clone();
        let installed = ensure_binaries(self.client.as_ref(), &expected).await?;
        info!("✓ Binaries verified: story {}, geth {}", installed.story, installed.geth);

        if path_exists(&self.settings.consensus_config_path()).await {
            info!("Consensus home already initialized, skipping init");
        } else {
            self.client
                .init(&self.settings.network, &self.settings.moniker)
                .await?;
        }

        let reports = config_patcher::apply_all(&self.settings.node_config()).await?;
        for report in &reports {
            if !report.missing.is_empty() {
                warn!(
                    "Keys not present in {}, left untouched: {}",
                    report.path.display(),
                    report.missing.join(", ")
                );
            }
        }
        info!("✓ Node configuration applied");
        Ok(reports)
    }

    pub async fn start(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        self.exclusive(operations::START, "running", || async {
            self.provision_units().await?;
            let statuses = self.start_and_confirm().await?;
            self.set_state(NodeState::Running).await;
            Ok(statuses)
        })
        .await
    }

    /// write -> reload -> enable, for both units
    async fn provision_units(&self) -> Result<()> {
        self.supervisor
            .write_unit(ServiceName::Execution, &execution_unit(&self.settings))
            .await?;
        self.supervisor
            .write_unit(ServiceName::Consensus, &consensus_unit(&self.settings))
            .await?;
        self.supervisor.reload().await?;
        self.supervisor.enable(&ServiceName::START_ORDER).await?;
        Ok(())
    }

    /// Starts both and requires both to come up. A service that fails is
    /// reported by name; the other one is left running as it is.
    async fn start_and_confirm(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        if let Err(e) = self.supervisor.start(&ServiceName::START_ORDER).await {
            warn!("Start reported an error, checking unit status: {}", e);
        }

        if !self.start_grace.is_zero() {
            tokio::time::sleep(self.start_grace).await;
        }

        let statuses = self.statuses().await?;
        if let Some((service, status)) = statuses.iter().find(|(_, s)| !s.is_active()) {
            return Err(OrchestratorError::PartialStartFailure {
                service: service.to_string(),
                status: status.to_string(),
            });
        }

        info!("✓ Both services active");
        Ok(statuses)
    }

    async fn statuses(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        let mut statuses = BTreeMap::new();
        for service in ServiceName::START_ORDER {
            statuses.insert(service, self.supervisor.status(service).await?);
        }
        Ok(statuses)
    }

    /// Bare machine to running node, optionally bootstrapping chain data from
    /// a snapshot instead of syncing from genesis.
    pub async fn install(&self, options: InstallOptions) -> Result<NodeState> {
        self.exclusive(operations::INSTALL, "running", || async {
            let spec = options.snapshot.map(|mode| self.snapshot_spec(mode)).transpose()?;

            self.configure_inner().await?;
            self.set_state(NodeState::Configured).await;
            self.provision_units().await?;

            match spec {
                None => {
                    self.start_and_confirm().await?;
                }
                Some(spec) => {
                    self.set_state(NodeState::Resyncing).await;
                    if let Err(e) = self.installer.install(&spec, &self.settings.data_dirs()).await {
                        let next = self.state_after_failed_install(&e).await;
                        self.set_state(next).await;
                        return Err(e);
                    }
                }
            }

            self.set_state(NodeState::Running).await;
            Ok(NodeState::Running)
        })
        .await
    }

    fn snapshot_spec(&self, mode: PruningMode) -> Result<SnapshotSpec> {
        self.settings.snapshot_spec(mode).ok_or_else(|| {
            OrchestratorError::precondition(
                "select snapshot",
                format!("no {} archive endpoints configured for {}", mode, self.settings.network),
            )
        })
    }

    /// Replace chain data from a snapshot. From `Degraded` this is the
    /// recovery path and adopts the backup the failed attempt left behind.
    pub async fn resync(&self, mode: PruningMode) -> Result<SnapshotReport> {
        self.exclusive(operations::RESYNC, "resyncing", || async {
            let spec = self.snapshot_spec(mode)?;
            let adopt_backup = matches!(
                self.state().await,
                NodeState::Degraded {
                    signing_state_backup: Some(_),
                    ..
                }
            );

            self.set_state(NodeState::Resyncing).await;
            let dirs = self.settings.data_dirs();
            let result = if adopt_backup {
                self.installer.reinstall(&spec, &dirs).await
            } else {
                self.installer.install(&spec, &dirs).await
            };

            match result {
                Ok(report) => {
                    self.set_state(NodeState::Running).await;
                    Ok(report)
                }
                Err(e) => {
                    let next = self.state_after_failed_install(&e).await;
                    self.set_state(next).await;
                    Err(e)
                }
            }
        })
        .await
    }

    /// Once chain data has been touched, or a signing-state backup is
    /// outstanding, nothing is restarted automatically. A failure before
    /// that point gets one attempt to bring the services back.
    async fn state_after_failed_install(&self, e: &OrchestratorError) -> NodeState {
        let backup = e.signing_state_backup().cloned();

        if backup.is_some()
            || e.is_data_fault()
            || matches!(e, OrchestratorError::PostInstallSupervisionError { .. })
        {
            return NodeState::Degraded {
                reason: e.to_string(),
                signing_state_backup: backup,
            };
        }

        warn!("Install aborted before chain data was touched, restarting services");
        if let Err(restart_err) = self.supervisor.start(&ServiceName::START_ORDER).await {
            warn!("Restart after aborted install failed: {}", restart_err);
        }
        match self.statuses().await {
            Ok(statuses) if statuses.values().all(ServiceStatus::is_active) => NodeState::Running,
            _ => NodeState::Degraded {
                reason: format!("{}; services could not be restarted", e),
                signing_state_backup: None,
            },
        }
    }

    /// Swap in new binary versions: verify, stop, regenerate units, start
    pub async fn upgrade(&self, versions: BinaryVersions) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        self.exclusive(operations::UPGRADE, "running", || async {
            ensure_binaries(self.client.as_ref(), &versions).await?;

            self.supervisor.stop(&ServiceName::BOTH).await?;
            self.set_state(NodeState::Configured).await;
            *self.versions.write().await = versions.clone();

            self.provision_units().await?;
            let statuses = self.start_and_confirm().await?;
            info!("✓ Upgraded to story {}, geth {}", versions.story, versions.geth);
            self.set_state(NodeState::Running).await;
            Ok(statuses)
        })
        .await
    }

    /// Routine restart; failures are reported and the call can be retried
    pub async fn restart_services(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        self.exclusive(operations::RESTART, "running", || async {
            self.supervisor.restart(&ServiceName::START_ORDER).await?;
            if !self.start_grace.is_zero() {
                tokio::time::sleep(self.start_grace).await;
            }
            let statuses = self.statuses().await?;
            if let Some((service, status)) = statuses.iter().find(|(_, s)| !s.is_active()) {
                return Err(OrchestratorError::PartialStartFailure {
                    service: service.to_string(),
                    status: status.to_string(),
                });
            }
            Ok(statuses)
        })
        .await
    }

    pub async fn stop_services(&self) -> Result<BTreeMap<ServiceName, ServiceStatus>> {
        self.exclusive(operations::STOP, "configured", || async {
            self.supervisor.stop(&ServiceName::BOTH).await?;
            let statuses = self.statuses().await?;
            if let Some((service, status)) = statuses.iter().find(|(_, s)| s.is_active()) {
                return Err(OrchestratorError::supervision(
                    &service.to_string(),
                    "stop",
                    format!("still {} after stop", status),
                ));
            }
            self.set_state(NodeState::Configured).await;
            Ok(statuses)
        })
        .await
    }

    /// Tears the node down for good: units, chain data, keys and binaries.
    /// Requires the operator to type the moniker back and acknowledge that
    /// the validator keys are deleted with it.
    pub async fn decommission(&self, confirmation: DecommissionConfirmation) -> Result<()> {
        self.exclusive(operations::DECOMMISSION, "decommissioned", || async {
            if confirmation.moniker != self.settings.moniker {
                return Err(OrchestratorError::ConfirmationRejected {
                    reason: format!(
                        "typed moniker '{}' does not match '{}'",
                        confirmation.moniker, self.settings.moniker
                    ),
                });
            }
            if !confirmation.acknowledge_key_loss {
                return Err(OrchestratorError::ConfirmationRejected {
                    reason: "validator key loss was not acknowledged".to_string(),
                });
            }

            warn!("Decommissioning node {}", self.settings.moniker);

            // teardown is best effort up to the point where data is deleted
            if let Err(e) = self.supervisor.stop(&ServiceName::BOTH).await {
                warn!("Stop during decommission: {}", e);
            }
            if let Err(e) = self.supervisor.disable(&ServiceName::BOTH).await {
                warn!("Disable during decommission: {}", e);
            }
            for service in ServiceName::BOTH {
                if let Err(e) = self.supervisor.remove_unit(service).await {
                    warn!("Removing unit during decommission: {}", e);
                }
            }
            if let Err(e) = self.supervisor.reload().await {
                warn!("Reload during decommission: {}", e);
            }

            for service in ServiceName::BOTH {
                let status = self.supervisor.status(service).await?;
                if status.is_active() {
                    return Err(OrchestratorError::supervision(
                        &service.to_string(),
                        "stop",
                        format!("still {}; refusing to delete its data", status),
                    ));
                }
            }

            remove_dir_if_present(&self.settings.home).await?;
            remove_file_if_present(&self.settings.binaries.story).await?;
            remove_file_if_present(&self.settings.binaries.geth).await?;

            info!("✓ Node {} decommissioned", self.settings.moniker);
            self.set_state(NodeState::Decommissioned).await;
            Ok(())
        })
        .await
    }

    /// Validator-key operations. The node must be running and caught up;
    /// sync status is read before any client command runs.
    pub async fn validator(&self, action: ValidatorAction) -> Result<ValidatorOutcome> {
        self.exclusive(operations::VALIDATOR, "running", || async {
            let sync = self.sync_status().await?;
            if sync.catching_up {
                return Err(OrchestratorError::NodeNotSynced {
                    latest_block_height: sync.latest_block_height,
                });
            }

            let key_file = if action.sends_transaction() {
                self.settings.private_key_path()
            } else {
                self.settings.story_home().join(layout::VALIDATOR_KEY_FILE)
            };
            if !path_exists(&key_file).await {
                return Err(OrchestratorError::precondition(
                    "validator key",
                    format!("{} not found", key_file.display()),
                ));
            }

            self.client.validator(&action).await
        })
        .await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        ConsensusRpc::from_config(&self.settings.consensus_config_path())
            .await?
            .sync_status()
            .await
    }

    /// Balance in wei as seen by the local execution client
    pub async fn balance(&self, address: &str) -> Result<u128> {
        self.execution_rpc.balance(address).await
    }

    /// Read-only snapshot of the node. Parts that cannot be read right now
    /// (RPC down while stopped, say) are left empty rather than failing.
    pub async fn status(&self) -> NodeStatusReport {
        let mut services = BTreeMap::new();
        for service in ServiceName::START_ORDER {
            match self.supervisor.status(service).await {
                Ok(status) => {
                    services.insert(service, status);
                }
                Err(e) => warn!("Status of {} unavailable: {}", service, e),
            }
        }

        let consensus_rpc = ConsensusRpc::from_config(&self.settings.consensus_config_path()).await;
        let (sync, peers) = match &consensus_rpc {
            Ok(rpc) => (
                rpc.sync_status().await.map_err(|e| debug!("{}", e)).ok(),
                rpc.peers().await.map_err(|e| debug!("{}", e)).ok(),
            ),
            Err(e) => {
                debug!("Consensus RPC unavailable: {}", e);
                (None, None)
            }
        };

        let execution_block_height = self
            .execution_rpc
            .block_number()
            .await
            .map_err(|e| debug!("{}", e))
            .ok();

        NodeStatusReport {
            moniker: self.settings.moniker.clone(),
            network: self.settings.network.clone(),
            state: self.state().await,
            services,
            sync,
            peers,
            execution_block_height,
            active_operation: self.tracker.get_active_operation(&self.settings.moniker).await,
        }
    }

    pub async fn logs(&self, service: ServiceName, lines: usize) -> Result<String> {
        self.supervisor.logs(service, lines).await
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_file_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::io(path, e)),
    }
}
