//! Local RPC of both clients: CometBFT-style `GET /status` and `/net_info`
//! on the consensus side, Ethereum JSON-RPC on the execution side.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::config_patcher::{read_value, unquote};
use crate::constants::http;
use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub catching_up: bool,
    pub latest_block_height: Option<u64>,
    pub network: String,
    pub moniker: String,
    pub node_id: String,
    pub validator_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub node_id: String,
    pub moniker: String,
    pub remote_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub count: usize,
    pub peers: Vec<Peer>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    node_info: NodeInfo,
    sync_info: SyncInfo,
    #[serde(default)]
    validator_info: Option<ValidatorInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    id: String,
    #[serde(default)]
    network: String,
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    latest_block_height: String,
    catching_up: bool,
}

#[derive(Debug, Deserialize)]
struct ValidatorInfo {
    address: String,
}

#[derive(Debug, Deserialize)]
struct NetInfoResult {
    #[serde(default)]
    peers: Vec<NetPeer>,
}

#[derive(Debug, Deserialize)]
struct NetPeer {
    node_info: NodeInfo,
    #[serde(default)]
    remote_ip: String,
}

#[derive(Clone)]
pub struct ConsensusRpc {
    client: Client,
    base_url: String,
}

impl ConsensusRpc {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Endpoint taken from `[rpc] laddr` of the consensus config.toml
    pub async fn from_config(config_toml: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(config_toml).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OrchestratorError::ConfigNotFound {
                    path: config_toml.to_path_buf(),
                }
            } else {
                OrchestratorError::io(config_toml, e)
            }
        })?;

        let laddr = read_value(&content, Some("rpc"), "laddr").ok_or_else(|| {
            OrchestratorError::ConfigApplyError {
                path: config_toml.to_path_buf(),
                reason: "no laddr in [rpc]".to_string(),
            }
        })?;

        Ok(Self::new(&laddr_to_url(unquote(&laddr))))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let response = timeout(http::RPC_TIMEOUT, self.client.get(&url).send())
            .await
            .map_err(|_| rpc_error(&url, "request timeout"))?
            .map_err(|e| rpc_error(&url, e))?;

        if !response.status().is_success() {
            return Err(rpc_error(&url, format!("HTTP {}", response.status())));
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| rpc_error(&url, format!("failed to parse response: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(rpc_error(&url, format!("RPC error {}: {}", error.code, error.message)));
        }
        envelope
            .result
            .ok_or_else(|| rpc_error(&url, "response has no result"))
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let status: StatusResult = self.get("status").await?;
        Ok(SyncStatus {
            catching_up: status.sync_info.catching_up,
            latest_block_height: status.sync_info.latest_block_height.parse().ok(),
            network: status.node_info.network,
            moniker: status.node_info.moniker,
            node_id: status.node_info.id,
            validator_address: status.validator_info.map(|v| v.address),
        })
    }

    pub async fn peers(&self) -> Result<PeerInfo> {
        let net_info: NetInfoResult = self.get("net_info").await?;
        let peers: Vec<Peer> = net_info
            .peers
            .into_iter()
            .map(|p| Peer {
                node_id: p.node_info.id,
                moniker: p.node_info.moniker,
                remote_ip: p.remote_ip,
            })
            .collect();
        Ok(PeerInfo {
            count: peers.len(),
            peers,
        })
    }
}

#[derive(Clone)]
pub struct ExecutionRpc {
    client: Client,
    url: String,
}

impl ExecutionRpc {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }

    pub fn local(http_port: u16) -> Self {
        Self::new(&format!("http://127.0.0.1:{}", http_port))
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": Uuid::new_v4().to_string()
        });

        let response = timeout(
            http::RPC_TIMEOUT,
            self.client.post(&self.url).json(&request_body).send(),
        )
        .await
        .map_err(|_| rpc_error(&self.url, format!("{} timeout", method)))?
        .map_err(|e| rpc_error(&self.url, e))?;

        if !response.status().is_success() {
            return Err(rpc_error(&self.url, format!("HTTP {}", response.status())));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| rpc_error(&self.url, format!("failed to parse {} response: {}", method, e)))?;

        if let Some(error) = json.get("error") {
            return Err(rpc_error(&self.url, format!("{} failed: {}", method, error)));
        }
        json.get("result")
            .cloned()
            .ok_or_else(|| rpc_error(&self.url, format!("{} returned no result", method)))
    }

    pub async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&result).ok_or_else(|| rpc_error(&self.url, format!("bad block number {}", result)))
    }

    /// Balance in wei at the latest block
    pub async fn balance(&self, address: &str) -> Result<u128> {
        let result = self
            .call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        parse_quantity(&result).ok_or_else(|| rpc_error(&self.url, format!("bad balance {}", result)))
    }
}

fn rpc_error(endpoint: &str, reason: impl ToString) -> OrchestratorError {
    OrchestratorError::Rpc {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}

/// `0x`-prefixed hex quantity
fn parse_quantity<T: TryFrom<u128>>(value: &serde_json::Value) -> Option<T> {
    let hex = value.as_str()?.strip_prefix("0x")?;
    let parsed = u128::from_str_radix(hex, 16).ok()?;
    T::try_from(parsed).ok()
}

/// `tcp://0.0.0.0:26657` -> `http://127.0.0.1:26657`
pub fn laddr_to_url(laddr: &str) -> String {
    let addr = laddr
        .strip_prefix("tcp://")
        .or_else(|| laddr.strip_prefix("http://"))
        .unwrap_or(laddr);
    let addr = match addr.strip_prefix("0.0.0.0:") {
        Some(port) => format!("127.0.0.1:{}", port),
        None => addr.to_string(),
    };
    format!("http://{}", addr)
}
