//! Lifecycle orchestration for a Story validator node: the `story` consensus
//! client paired with its `geth` execution client, both under systemd.

pub mod client;
pub mod config;
pub mod config_patcher;
pub mod constants;
pub mod errors;
pub mod guard;
pub mod lifecycle;
pub mod operation_tracker;
pub mod snapshot;
pub mod supervisor;

pub use config::NodeSettings;
pub use errors::{OrchestratorError, Result};
pub use lifecycle::{DecommissionConfirmation, InstallOptions, NodeOrchestrator, NodeState, NodeStatusReport};
pub use snapshot::{PruningMode, SnapshotInstaller, SnapshotReport, SnapshotSpec};
pub use supervisor::{ServiceName, ServiceStatus, ServiceSupervisor};
