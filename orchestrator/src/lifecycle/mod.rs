//! Node lifecycle state machine.
//!
//! ```text
//! Uninitialized -> Configured -> Running <-> Resyncing
//!                                   |            |
//!                                   +- Degraded -+
//! any state -> Decommissioned (terminal)
//! ```

pub mod orchestrator;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::client::{PeerInfo, SyncStatus};
use crate::constants::operations;
use crate::errors::{OrchestratorError, Result};
use crate::operation_tracker::ActiveOperation;
use crate::snapshot::PruningMode;
use crate::supervisor::{ServiceName, ServiceStatus};

pub use orchestrator::NodeOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Uninitialized,
    Configured,
    Running,
    Resyncing,
    /// Services stopped or chain data partial; operator action required
    Degraded {
        reason: String,
        signing_state_backup: Option<PathBuf>,
    },
    Decommissioned,
}

impl NodeState {
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Uninitialized => "uninitialized",
            NodeState::Configured => "configured",
            NodeState::Running => "running",
            NodeState::Resyncing => "resyncing",
            NodeState::Degraded { .. } => "degraded",
            NodeState::Decommissioned => "decommissioned",
        }
    }

    /// Whether `operation` may start from this state
    pub fn permits(&self, operation: &str) -> bool {
        use NodeState::*;
        match operation {
            operations::CONFIGURE | operations::INSTALL => matches!(self, Uninitialized | Configured),
            operations::START => matches!(self, Configured),
            operations::RESYNC => matches!(self, Running | Degraded { .. }),
            operations::UPGRADE => matches!(self, Running | Configured),
            operations::RESTART | operations::STOP | operations::VALIDATOR => matches!(self, Running),
            operations::DECOMMISSION => !matches!(self, Decommissioned),
            _ => false,
        }
    }

    pub fn ensure_permits(&self, operation: &str, target: &str) -> Result<()> {
        if self.permits(operation) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: self.name().to_string(),
                to: target.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Degraded { reason, .. } => write!(f, "degraded ({})", reason),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Bootstrap chain data from a snapshot instead of syncing from genesis
    pub snapshot: Option<PruningMode>,
}

/// Typed back by the operator before a node is torn down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecommissionConfirmation {
    pub moniker: String,
    pub acknowledge_key_loss: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub moniker: String,
    pub network: String,
    pub state: NodeState,
    pub services: BTreeMap<ServiceName, ServiceStatus>,
    pub sync: Option<SyncStatus>,
    pub peers: Option<PeerInfo>,
    pub execution_block_height: Option<u64>,
    pub active_operation: Option<ActiveOperation>,
}
