//! Stand-in for the `story`/`geth` binaries
//!
//! Counts every invocation; `init` lays down the config files the real
//! client would generate.

use async_trait::async_trait;
use orchestrator::client::resources::HostResources;
use orchestrator::client::{BinaryVersions, NodeClient, ResourceGate, ValidatorAction, ValidatorKey, ValidatorOutcome};
use orchestrator::errors::Result;
use std::path::PathBuf;
use std::sync::Mutex;

use super::test_data::{consensus_config_toml, GETH_VERSION, STORY_TOML, STORY_VERSION};

pub struct FakeClient {
    story_home: PathBuf,
    rpc_port: u16,
    versions: BinaryVersions,
    calls: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(story_home: PathBuf, rpc_port: u16) -> Self {
        Self {
            story_home,
            rpc_port,
            versions: BinaryVersions {
                story: format!("v{}", STORY_VERSION),
                geth: format!("{}-stable", GETH_VERSION),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_versions(mut self, story: &str, geth: &str) -> Self {
        self.versions = BinaryVersions {
            story: story.to_string(),
            geth: geth.to_string(),
        };
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl NodeClient for FakeClient {
    async fn binary_versions(&self) -> Result<BinaryVersions> {
        self.record("version");
        Ok(self.versions.clone())
    }

    async fn init(&self, _network: &str, _moniker: &str) -> Result<()> {
        self.record("init");
        let config_dir = self.story_home.join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), consensus_config_toml(self.rpc_port)).unwrap();
        std::fs::write(config_dir.join("story.toml"), STORY_TOML).unwrap();
        Ok(())
    }

    async fn reset_consensus_state(&self) -> Result<()> {
        self.record("reset");
        Ok(())
    }

    async fn validator(&self, action: &ValidatorAction) -> Result<ValidatorOutcome> {
        self.record(&format!("validator {}", action.name()));
        let output = "Compressed Public Key (hex): 02a1b2c3\nEVM Address: 0xAbC0000000000000000000000000000000000001\n".to_string();
        Ok(ValidatorOutcome {
            action: action.name().to_string(),
            key: matches!(action, ValidatorAction::Export).then(|| ValidatorKey::parse(&output)),
            output,
        })
    }
}

pub struct PassingGate;

#[async_trait]
impl ResourceGate for PassingGate {
    async fn check(&self) -> Result<HostResources> {
        Ok(HostResources {
            cpus: 8,
            memory_gb: 32,
            free_disk_gb: 1000,
        })
    }
}
