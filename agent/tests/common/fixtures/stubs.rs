//! In-memory stand-ins for systemd, the client binaries and the host probe

use async_trait::async_trait;
use orchestrator::client::{
    BinaryVersions, HostResources, NodeClient, ResourceGate, ValidatorAction, ValidatorOutcome,
};
use orchestrator::supervisor::{ServiceName, ServiceStatus, ServiceSupervisor, UnitSpec};
use orchestrator::Result;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub struct StubSupervisor {
    statuses: Mutex<BTreeMap<ServiceName, ServiceStatus>>,
}

impl StubSupervisor {
    pub fn with_status(status: ServiceStatus) -> Self {
        Self {
            statuses: Mutex::new(ServiceName::BOTH.iter().map(|s| (*s, status)).collect()),
        }
    }

    pub fn status_of(&self, service: ServiceName) -> ServiceStatus {
        self.statuses.lock().unwrap()[&service]
    }

    fn set(&self, services: &[ServiceName], status: ServiceStatus) {
        let mut statuses = self.statuses.lock().unwrap();
        for service in services {
            statuses.insert(*service, status);
        }
    }
}

#[async_trait]
impl ServiceSupervisor for StubSupervisor {
    async fn start(&self, services: &[ServiceName]) -> Result<()> {
        self.set(services, ServiceStatus::Active);
        Ok(())
    }

    async fn stop(&self, services: &[ServiceName]) -> Result<()> {
        self.set(services, ServiceStatus::Inactive);
        Ok(())
    }

    async fn restart(&self, services: &[ServiceName]) -> Result<()> {
        self.set(services, ServiceStatus::Active);
        Ok(())
    }

    async fn enable(&self, _services: &[ServiceName]) -> Result<()> {
        Ok(())
    }

    async fn disable(&self, _services: &[ServiceName]) -> Result<()> {
        Ok(())
    }

    async fn status(&self, service: ServiceName) -> Result<ServiceStatus> {
        Ok(self.status_of(service))
    }

    async fn write_unit(&self, _service: ServiceName, _unit: &UnitSpec) -> Result<()> {
        Ok(())
    }

    async fn remove_unit(&self, _service: ServiceName) -> Result<()> {
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }

    async fn logs(&self, service: ServiceName, lines: usize) -> Result<String> {
        Ok(format!("last {} lines of {}", lines, service))
    }
}

pub struct StubClient {
    pub versions: BinaryVersions,
}

#[async_trait]
impl NodeClient for StubClient {
    async fn binary_versions(&self) -> Result<BinaryVersions> {
        Ok(self.versions.clone())
    }

    async fn init(&self, _network: &str, _moniker: &str) -> Result<()> {
        Ok(())
    }

    async fn reset_consensus_state(&self) -> Result<()> {
        Ok(())
    }

    async fn validator(&self, action: &ValidatorAction) -> Result<ValidatorOutcome> {
        Ok(ValidatorOutcome {
            action: action.name().to_string(),
            output: String::new(),
            key: None,
        })
    }
}

pub struct StubGate;

#[async_trait]
impl ResourceGate for StubGate {
    async fn check(&self) -> Result<HostResources> {
        Ok(HostResources {
            cpus: 8,
            memory_gb: 32,
            free_disk_gb: 500,
        })
    }
}
