pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config_patcher::{ConfigEdit, NodeConfig};
use crate::constants::{layout, ports, supervision};
use crate::snapshot::{Compression, DataDirs, PruningMode, SnapshotSpec};

/// Everything the orchestrator needs to know about one node. Threaded
/// explicitly through every component instead of living in globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub network: String,
    pub moniker: String,
    /// Root holding `story/` and `geth/`, e.g. `/home/story/.story`
    pub home: PathBuf,
    /// System user the services run as
    #[serde(default = "default_user")]
    pub user: String,
    pub binaries: BinarySettings,
    #[serde(default)]
    pub services: ServiceSettings,
    #[serde(default)]
    pub ports: PortSettings,
    #[serde(default)]
    pub peers: PeerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub snapshots: SnapshotSettings,
    #[serde(default)]
    pub resources: ResourceSettings,
    /// Operator-supplied edits on top of the generated ones
    #[serde(default)]
    pub extra_edits: Vec<ExtraEdit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinarySettings {
    pub story: PathBuf,
    pub geth: PathBuf,
    pub story_version: String,
    pub geth_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_consensus_unit")]
    pub consensus: String,
    #[serde(default = "default_execution_unit")]
    pub execution: String,
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,
    #[serde(default)]
    pub use_sudo: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            consensus: default_consensus_unit(),
            execution: default_execution_unit(),
            unit_dir: default_unit_dir(),
            use_sudo: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub consensus_rpc: u16,
    pub consensus_p2p: u16,
    pub consensus_prometheus: u16,
    pub consensus_api: u16,
    pub execution_http: u16,
    pub execution_ws: u16,
    pub execution_auth: u16,
    pub execution_p2p: u16,
    pub execution_metrics: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            consensus_rpc: ports::CONSENSUS_RPC,
            consensus_p2p: ports::CONSENSUS_P2P,
            consensus_prometheus: ports::CONSENSUS_PROMETHEUS,
            consensus_api: ports::CONSENSUS_API,
            execution_http: ports::EXECUTION_HTTP,
            execution_ws: ports::EXECUTION_WS,
            execution_auth: ports::EXECUTION_AUTH,
            execution_p2p: ports::EXECUTION_P2P,
            execution_metrics: ports::EXECUTION_METRICS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    pub seeds: Vec<String>,
    pub persistent_peers: Vec<String>,
    pub external_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub prometheus: bool,
    pub execution_metrics: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            prometheus: true,
            execution_metrics: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePair {
    pub story_url: String,
    pub geth_url: String,
    /// Overrides the suffix-based guess for both archives
    pub compression: Option<Compression>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub pruned: Option<ArchivePair>,
    pub archive: Option<ArchivePair>,
    /// Run the consensus client's state reset before extraction
    pub reset_consensus_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub min_cpus: usize,
    pub min_memory_gb: u64,
    pub min_disk_gb: u64,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            min_cpus: 4,
            min_memory_gb: 16,
            min_disk_gb: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraEdit {
    /// Relative to the consensus home, e.g. `config/config.toml`
    pub file: PathBuf,
    pub section: Option<String>,
    pub key: String,
    /// Raw right-hand side, quotes included for strings
    pub value: String,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_consensus_unit() -> String {
    "story".to_string()
}

fn default_execution_unit() -> String {
    "story-geth".to_string()
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from(supervision::DEFAULT_UNIT_DIR)
}

impl NodeSettings {
    pub fn story_home(&self) -> PathBuf {
        self.home.join("story")
    }

    pub fn geth_home(&self) -> PathBuf {
        self.home.join("geth")
    }

    pub fn story_data_dir(&self) -> PathBuf {
        self.story_home().join("data")
    }

    pub fn geth_network_dir(&self) -> PathBuf {
        self.geth_home().join(&self.network)
    }

    pub fn geth_chain_data_dir(&self) -> PathBuf {
        self.geth_network_dir().join("geth").join("chaindata")
    }

    pub fn consensus_config_path(&self) -> PathBuf {
        self.story_home().join(layout::CONSENSUS_CONFIG_FILE)
    }

    pub fn consensus_app_config_path(&self) -> PathBuf {
        self.story_home().join(layout::CONSENSUS_APP_CONFIG_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.story_home().join(layout::PRIVATE_KEY_FILE)
    }

    pub fn data_dirs(&self) -> DataDirs {
        DataDirs {
            story_data_dir: self.story_data_dir(),
            geth_chain_data_dir: self.geth_chain_data_dir(),
            story_extract_root: self.story_home(),
            geth_extract_root: self.geth_network_dir(),
        }
    }

    pub fn archive_pair(&self, mode: PruningMode) -> Option<&ArchivePair> {
        match mode {
            PruningMode::Pruned => self.snapshots.pruned.as_ref(),
            PruningMode::Archive => self.snapshots.archive.as_ref(),
        }
    }

    pub fn snapshot_spec(&self, mode: PruningMode) -> Option<SnapshotSpec> {
        self.archive_pair(mode).map(|pair| SnapshotSpec {
            network: self.network.clone(),
            pruning_mode: mode,
            story_archive_url: pair.story_url.clone(),
            geth_archive_url: pair.geth_url.clone(),
            compression: pair.compression,
            reset_consensus_state: self.snapshots.reset_consensus_state,
        })
    }

    /// The declared config values: moniker, peers, ports, telemetry, and the
    /// engine endpoint that ties story to geth's auth port.
    pub fn node_config(&self) -> NodeConfig {
        let mut config = NodeConfig::new();
        let config_toml = self.consensus_config_path();
        let story_toml = self.consensus_app_config_path();

        config.push(&config_toml, ConfigEdit::global("moniker", quoted(&self.moniker)));
        config.push(
            &config_toml,
            ConfigEdit::scoped("p2p", "laddr", quoted(&format!("tcp://0.0.0.0:{}", self.ports.consensus_p2p))),
        );
        if !self.peers.seeds.is_empty() {
            config.push(&config_toml, ConfigEdit::scoped("p2p", "seeds", quoted(&self.peers.seeds.join(","))));
        }
        if !self.peers.persistent_peers.is_empty() {
            config.push(
                &config_toml,
                ConfigEdit::scoped("p2p", "persistent_peers", quoted(&self.peers.persistent_peers.join(","))),
            );
        }
        if let Some(external) = &self.peers.external_address {
            config.push(&config_toml, ConfigEdit::scoped("p2p", "external_address", quoted(external)));
        }
        config.push(
            &config_toml,
            ConfigEdit::scoped("rpc", "laddr", quoted(&format!("tcp://127.0.0.1:{}", self.ports.consensus_rpc))),
        );
        config.push(
            &config_toml,
            ConfigEdit::scoped("instrumentation", "prometheus", self.telemetry.prometheus.to_string()),
        );
        config.push(
            &config_toml,
            ConfigEdit::scoped(
                "instrumentation",
                "prometheus_listen_addr",
                quoted(&format!(":{}", self.ports.consensus_prometheus)),
            ),
        );

        config.push(
            &story_toml,
            ConfigEdit::global("api-address", quoted(&format!("127.0.0.1:{}", self.ports.consensus_api))),
        );
        config.push(
            &story_toml,
            ConfigEdit::global(
                "engine-endpoint",
                quoted(&format!("http://localhost:{}", self.ports.execution_auth)),
            ),
        );

        for extra in &self.extra_edits {
            let path = self.story_home().join(&extra.file);
            let edit = match &extra.section {
                Some(section) => ConfigEdit::scoped(section, &extra.key, extra.value.clone()),
                None => ConfigEdit::global(&extra.key, extra.value.clone()),
            };
            config.push(&path, edit);
        }

        config
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}
