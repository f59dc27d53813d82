//! Central place for file names, timeouts and defaults shared across the
//! lifecycle modules.

use std::time::Duration;

/// Paths inside a client home directory
pub mod layout {
    /// Signing state, relative to the consensus data directory
    pub const SIGNING_STATE_FILE: &str = "priv_validator_state.json";

    /// Sibling of the consensus data directory, so wiping data cannot touch it
    pub const SIGNING_STATE_BACKUP_FILE: &str = "priv_validator_state_backup.json";

    pub const CONSENSUS_CONFIG_FILE: &str = "config/config.toml";
    pub const CONSENSUS_APP_CONFIG_FILE: &str = "config/story.toml";
    pub const PRIVATE_KEY_FILE: &str = "config/private_key.txt";
    pub const VALIDATOR_KEY_FILE: &str = "config/priv_validator_key.json";
}

/// Service supervision
pub mod supervision {
    use super::Duration;

    /// Pause after start before the first status check
    pub const START_GRACE: Duration = Duration::from_secs(5);

    pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";
    pub const DEFAULT_RESTART_SEC: u64 = 3;
    pub const DEFAULT_LIMIT_NOFILE: u64 = 65535;
}

/// RPC and HTTP client timeouts
pub mod http {
    use super::Duration;

    pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

    /// Archive downloads only bound the connect phase; bodies run as long as needed
    pub const ARCHIVE_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Default listen ports of a story + geth pair
pub mod ports {
    pub const CONSENSUS_RPC: u16 = 26657;
    pub const CONSENSUS_P2P: u16 = 26656;
    pub const CONSENSUS_PROMETHEUS: u16 = 26660;
    pub const CONSENSUS_API: u16 = 1317;
    pub const EXECUTION_HTTP: u16 = 8545;
    pub const EXECUTION_WS: u16 = 8546;
    pub const EXECUTION_AUTH: u16 = 8551;
    pub const EXECUTION_P2P: u16 = 30303;
    pub const EXECUTION_METRICS: u16 = 6060;
}

/// Operation names used with the operation tracker
pub mod operations {
    pub const INSTALL: &str = "install";
    pub const CONFIGURE: &str = "configure";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const RESTART: &str = "restart";
    pub const RESYNC: &str = "resync";
    pub const UPGRADE: &str = "upgrade";
    pub const DECOMMISSION: &str = "decommission";
    pub const VALIDATOR: &str = "validator";
}
