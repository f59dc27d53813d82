//! Mock consensus and execution RPC endpoints

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct MockRpcServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockRpcServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    async fn mock_status(&self, network: &str, latest_block: u64, catching_up: bool) {
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {
                    "node_info": {
                        "id": "3f2a9d1c",
                        "network": network,
                        "moniker": "lisbon-validator"
                    },
                    "sync_info": {
                        "latest_block_height": latest_block.to_string(),
                        "catching_up": catching_up
                    },
                    "validator_info": {
                        "address": "A1B2C3D4",
                        "voting_power": "1024"
                    }
                }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_synced(&self, network: &str, latest_block: u64) {
        self.mock_status(network, latest_block, false).await;
    }

    pub async fn mock_catching_up(&self, network: &str, latest_block: u64) {
        self.mock_status(network, latest_block, true).await;
    }

    pub async fn mock_net_info(&self, peers: usize) {
        let peers: Vec<_> = (0..peers)
            .map(|i| {
                json!({
                    "node_info": { "id": format!("peer{}", i), "moniker": format!("peer-{}", i) },
                    "remote_ip": format!("10.0.0.{}", i + 1)
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/net_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": { "listening": true, "n_peers": peers.len().to_string(), "peers": peers }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_block_number(&self, height: u64) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": format!("0x{:x}", height)
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_balance(&self, wei: u128) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_getBalance" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": format!("0x{:x}", wei)
            })))
            .mount(&self.server)
            .await;
    }
}
