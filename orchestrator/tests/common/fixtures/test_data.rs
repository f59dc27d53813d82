//! Common test data

pub const NETWORK: &str = "aeneid";
pub const MONIKER: &str = "lisbon-validator";
pub const STORY_VERSION: &str = "1.1.0";
pub const GETH_VERSION: &str = "1.0.2";

/// Signing state held by the node before an operation
pub const LOCAL_SIGNING_STATE: &str =
    "{\n  \"height\": \"4820113\",\n  \"round\": 0,\n  \"step\": 3,\n  \"signature\": \"q1w2e3\"\n}\n";

/// Signing state shipped inside a snapshot archive
pub const ARCHIVE_SIGNING_STATE: &str = "{\n  \"height\": \"0\",\n  \"round\": 0,\n  \"step\": 0\n}\n";

/// What `story init` leaves in config/config.toml, trimmed to the parts the
/// orchestrator touches
pub fn consensus_config_toml(rpc_port: u16) -> String {
    format!(
        r#"# This is a TOML config file.
proxy_app = "tcp://127.0.0.1:26658"
moniker = "default-moniker"

[rpc]
laddr = "tcp://127.0.0.1:{}"
cors_allowed_origins = []

[p2p]
laddr = "tcp://0.0.0.0:26656"
external_address = ""
seeds = ""
persistent_peers = ""

[mempool]
size = 5000

[instrumentation]
prometheus = false
prometheus_listen_addr = ":26660"
"#,
        rpc_port
    )
}

pub const STORY_TOML: &str = r#"version = "1.1.0"
network = "aeneid"
engine-endpoint = "http://localhost:8551"
engine-jwt-file = "/root/.story/geth/aeneid/geth/jwtsecret"
api-enable = true
api-address = "127.0.0.1:1317"
"#;
