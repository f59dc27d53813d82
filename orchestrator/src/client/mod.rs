//! The two client binaries and their local RPC endpoints, as seen by the
//! orchestrator. Everything here is an opaque command invocation or an HTTP
//! call; no chain logic lives in this crate.

pub mod commands;
pub mod resources;
pub mod rpc;
pub mod story;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{OrchestratorError, Result};

pub use resources::{HostResourceGate, HostResources, ResourceGate};
pub use rpc::{ConsensusRpc, ExecutionRpc, PeerInfo, SyncStatus};
pub use story::StoryCli;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryVersions {
    pub story: String,
    pub geth: String,
}

/// Validator-key operations, all run through `story validator <subcommand>`.
/// Amounts are passed through verbatim in the client's own unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ValidatorAction {
    Export,
    Create {
        stake: String,
        moniker: Option<String>,
    },
    Stake {
        validator_pubkey: String,
        stake: String,
    },
    Unstake {
        validator_pubkey: String,
        unstake: String,
    },
    AddOperator {
        operator: String,
    },
    RemoveOperator {
        operator: String,
    },
    SetWithdrawalAddress {
        address: String,
    },
}

impl ValidatorAction {
    pub fn name(&self) -> &'static str {
        match self {
            ValidatorAction::Export => "export",
            ValidatorAction::Create { .. } => "create",
            ValidatorAction::Stake { .. } => "stake",
            ValidatorAction::Unstake { .. } => "unstake",
            ValidatorAction::AddOperator { .. } => "add-operator",
            ValidatorAction::RemoveOperator { .. } => "remove-operator",
            ValidatorAction::SetWithdrawalAddress { .. } => "set-withdrawal-address",
        }
    }

    /// Arguments after `story validator`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            ValidatorAction::Export => {}
            ValidatorAction::Create { stake, moniker } => {
                args.extend(["--stake".to_string(), stake.clone()]);
                if let Some(moniker) = moniker {
                    args.extend(["--moniker".to_string(), moniker.clone()]);
                }
            }
            ValidatorAction::Stake {
                validator_pubkey,
                stake,
            } => {
                args.extend([
                    "--validator-pubkey".to_string(),
                    validator_pubkey.clone(),
                    "--stake".to_string(),
                    stake.clone(),
                ]);
            }
            ValidatorAction::Unstake {
                validator_pubkey,
                unstake,
            } => {
                args.extend([
                    "--validator-pubkey".to_string(),
                    validator_pubkey.clone(),
                    "--unstake".to_string(),
                    unstake.clone(),
                ]);
            }
            ValidatorAction::AddOperator { operator }
            | ValidatorAction::RemoveOperator { operator } => {
                args.extend(["--operator".to_string(), operator.clone()]);
            }
            ValidatorAction::SetWithdrawalAddress { address } => {
                args.extend(["--withdrawal-address".to_string(), address.clone()]);
            }
        }
        args
    }

    /// Everything but export sends a transaction signed with the private key
    pub fn sends_transaction(&self) -> bool {
        !matches!(self, ValidatorAction::Export)
    }
}

/// Fields printed by `story validator export`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorKey {
    pub compressed_pubkey_hex: Option<String>,
    pub compressed_pubkey_base64: Option<String>,
    pub uncompressed_pubkey_hex: Option<String>,
    pub evm_address: Option<String>,
    pub validator_address: Option<String>,
    pub delegator_address: Option<String>,
}

impl ValidatorKey {
    pub fn parse(output: &str) -> Self {
        Self {
            compressed_pubkey_hex: extract_field(output, "Compressed Public Key (hex)"),
            compressed_pubkey_base64: extract_field(output, "Compressed Public Key (base64)"),
            uncompressed_pubkey_hex: extract_field(output, "Uncompressed Public Key (hex)"),
            evm_address: extract_field(output, "EVM Address"),
            validator_address: extract_field(output, "Validator Address"),
            delegator_address: extract_field(output, "Delegator Address"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    pub action: String,
    pub output: String,
    pub key: Option<ValidatorKey>,
}

/// Value of the first `Label: value` line, if any
pub fn extract_field(output: &str, label: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(label)?;
        let value = rest.trim_start().strip_prefix(':')?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Version token out of `story version` / `geth version` output:
/// the value on the first line mentioning "Version", without a leading `v`
/// or a `-stable` style suffix.
pub fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.trim_start().starts_with("Version"))
        .and_then(|line| {
            line.trim_start()
                .trim_start_matches("Version")
                .trim_start_matches(':')
                .split_whitespace()
                .next()
        })
        .map(normalize_version)
}

fn normalize_version(version: &str) -> String {
    let version = version.trim().trim_start_matches('v');
    version
        .split_once('-')
        .map(|(base, _)| base)
        .unwrap_or(version)
        .to_string()
}

pub fn version_matches(actual: &str, expected: &str) -> bool {
    normalize_version(actual) == normalize_version(expected)
}

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Installed versions of both binaries; a missing binary is an error
    async fn binary_versions(&self) -> Result<BinaryVersions>;

    /// Generates the consensus home (config, keys, genesis)
    async fn init(&self, network: &str, moniker: &str) -> Result<()>;

    async fn reset_consensus_state(&self) -> Result<()>;

    async fn validator(&self, action: &ValidatorAction) -> Result<ValidatorOutcome>;
}

/// Both binaries are installed and at the expected versions
pub async fn ensure_binaries(client: &dyn NodeClient, expected: &BinaryVersions) -> Result<BinaryVersions> {
    let actual = client
        .binary_versions()
        .await
        .map_err(|e| OrchestratorError::precondition("verify binaries", e.to_string()))?;

    for (name, have, want) in [
        ("story", &actual.story, &expected.story),
        ("geth", &actual.geth, &expected.geth),
    ] {
        if !version_matches(have, want) {
            return Err(OrchestratorError::precondition(
                "verify binaries",
                format!("{} is at {} but {} is required", name, have, want),
            ));
        }
    }

    Ok(actual)
}
