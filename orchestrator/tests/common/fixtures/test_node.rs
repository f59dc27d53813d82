//! A node laid out under a temp directory, wired to fakes and mock servers

use orchestrator::client::{ExecutionRpc, NodeClient, ResourceGate};
use orchestrator::config::loader::parse_settings;
use orchestrator::constants::layout;
use orchestrator::snapshot::{ArchiveFetcher, DataDirs, SnapshotInstaller, SnapshotSpec};
use orchestrator::supervisor::ServiceSupervisor;
use orchestrator::{NodeOrchestrator, NodeSettings, NodeState, PruningMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::fake_client::{FakeClient, PassingGate};
use super::fake_supervisor::FakeSupervisor;
use super::mock_archive::{MockArchiveServer, GETH_ARCHIVE, STORY_ARCHIVE};
use super::mock_rpc::MockRpcServer;
use super::test_data::*;

pub struct TestNode {
    pub home: TempDir,
    pub settings: NodeSettings,
    pub supervisor: Arc<FakeSupervisor>,
    pub client: Arc<FakeClient>,
    pub archives: MockArchiveServer,
    pub rpc: MockRpcServer,
}

impl TestNode {
    pub async fn new(supervisor: FakeSupervisor) -> Self {
        let home = TempDir::new().unwrap();
        let archives = MockArchiveServer::start().await;
        let rpc = MockRpcServer::start().await;
        let settings = node_settings(&home, &archives, rpc.port());
        let client = FakeClient::new(settings.story_home(), rpc.port());

        Self {
            home,
            settings,
            supervisor: Arc::new(supervisor),
            client: Arc::new(client),
            archives,
            rpc,
        }
    }

    pub fn orchestrator(&self, state: NodeState) -> NodeOrchestrator {
        let supervisor: Arc<dyn ServiceSupervisor> = self.supervisor.clone();
        let client: Arc<dyn NodeClient> = self.client.clone();
        let gate: Arc<dyn ResourceGate> = Arc::new(PassingGate);

        NodeOrchestrator::new(
            self.settings.clone(),
            supervisor,
            client,
            gate,
            ArchiveFetcher::new().unwrap(),
        )
        .with_start_grace(Duration::ZERO)
        .with_execution_rpc(ExecutionRpc::new(&self.rpc.base_url))
        .with_state(state)
    }

    pub fn installer(&self) -> SnapshotInstaller {
        let supervisor: Arc<dyn ServiceSupervisor> = self.supervisor.clone();
        let client: Arc<dyn NodeClient> = self.client.clone();
        SnapshotInstaller::new(supervisor, client, ArchiveFetcher::new().unwrap())
            .with_start_grace(Duration::ZERO)
    }

    pub fn spec(&self) -> SnapshotSpec {
        self.settings.snapshot_spec(PruningMode::Pruned).unwrap()
    }

    pub fn dirs(&self) -> DataDirs {
        self.settings.data_dirs()
    }

    pub fn signing_state_path(&self) -> PathBuf {
        self.settings.story_data_dir().join(layout::SIGNING_STATE_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.settings.story_home().join(layout::SIGNING_STATE_BACKUP_FILE)
    }

    /// Config files as `story init` leaves them
    pub fn write_consensus_config(&self) {
        let config_dir = self.settings.story_home().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), consensus_config_toml(self.rpc.port())).unwrap();
        std::fs::write(config_dir.join("story.toml"), STORY_TOML).unwrap();
    }

    /// An already-synced node: old chain data and, optionally, signing state
    pub fn seed_chain_data(&self, with_signing_state: bool) {
        let story_data = self.settings.story_data_dir();
        let chaindata = self.settings.geth_chain_data_dir();
        std::fs::create_dir_all(story_data.join("blockstore.db")).unwrap();
        std::fs::create_dir_all(&chaindata).unwrap();
        std::fs::write(story_data.join("blockstore.db/000001.log"), "old-blocks").unwrap();
        std::fs::write(chaindata.join("000001.ldb"), "old-chain").unwrap();
        if with_signing_state {
            std::fs::write(self.signing_state_path(), LOCAL_SIGNING_STATE).unwrap();
        }
    }

    pub fn write_private_key(&self) {
        let path = self.settings.private_key_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "PRIVATE_KEY=0x0123456789abcdef\n").unwrap();
    }
}

fn node_settings(home: &TempDir, archives: &MockArchiveServer, rpc_port: u16) -> NodeSettings {
    let root = home.path().display().to_string();
    let toml = format!(
        r#"
network = "{network}"
moniker = "{moniker}"
home = "{root}/.story"

[binaries]
story = "{root}/bin/story"
geth = "{root}/bin/geth"
story_version = "{story_version}"
geth_version = "{geth_version}"

[services]
unit_dir = "{root}/units"

[ports]
consensus_rpc = {rpc_port}

[peers]
seeds = ["b7e1f4a0@seed.aeneid.example:26656"]

[snapshots.pruned]
story_url = "{story_url}"
geth_url = "{geth_url}"
"#,
        network = NETWORK,
        moniker = MONIKER,
        root = root,
        story_version = STORY_VERSION,
        geth_version = GETH_VERSION,
        rpc_port = rpc_port,
        story_url = archives.url(STORY_ARCHIVE),
        geth_url = archives.url(GETH_ARCHIVE),
    );
    parse_settings(&toml).unwrap()
}
