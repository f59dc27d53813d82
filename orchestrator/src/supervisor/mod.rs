pub mod systemctl;
pub mod unit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::Result;

pub use systemctl::Systemctl;
pub use unit::UnitSpec;

/// The two supervised processes of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Consensus,
    Execution,
}

impl ServiceName {
    /// Stop order: consensus first so it never runs against a stopped engine
    pub const BOTH: [ServiceName; 2] = [ServiceName::Consensus, ServiceName::Execution];

    /// Start order: the engine must be up before consensus connects to it
    pub const START_ORDER: [ServiceName; 2] = [ServiceName::Execution, ServiceName::Consensus];
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceName::Consensus => write!(f, "consensus-service"),
            ServiceName::Execution => write!(f, "execution-service"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    Failed,
    Inactive,
}

impl ServiceStatus {
    /// Maps `systemctl is-active` output. Transitional states count as
    /// active since the process may still hold its data directory.
    pub fn from_is_active(output: &str) -> Self {
        match output.trim() {
            "active" | "activating" | "reloading" | "deactivating" | "refreshing" => {
                ServiceStatus::Active
            }
            "failed" => ServiceStatus::Failed,
            _ => ServiceStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceStatus::Active)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Active => write!(f, "active"),
            ServiceStatus::Failed => write!(f, "failed"),
            ServiceStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// Process-manager primitives keyed by service name.
///
/// Calls taking several services ask every one of them before returning,
/// even when an earlier one fails; the first failure is what gets returned.
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    async fn start(&self, services: &[ServiceName]) -> Result<()>;
    async fn stop(&self, services: &[ServiceName]) -> Result<()>;
    async fn restart(&self, services: &[ServiceName]) -> Result<()>;
    async fn enable(&self, services: &[ServiceName]) -> Result<()>;
    async fn disable(&self, services: &[ServiceName]) -> Result<()>;
    async fn status(&self, service: ServiceName) -> Result<ServiceStatus>;

    /// Fully overwrites the unit definition. Must be followed by `reload`.
    async fn write_unit(&self, service: ServiceName, unit: &UnitSpec) -> Result<()>;
    async fn remove_unit(&self, service: ServiceName) -> Result<()>;
    async fn reload(&self) -> Result<()>;

    async fn logs(&self, service: ServiceName, lines: usize) -> Result<String>;
}
