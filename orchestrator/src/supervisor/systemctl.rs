use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use super::{ServiceName, ServiceStatus, ServiceSupervisor, UnitSpec};
use crate::config::ServiceSettings;
use crate::errors::{OrchestratorError, Result};

/// `systemctl`/`journalctl` backed supervisor
pub struct Systemctl {
    consensus_unit: String,
    execution_unit: String,
    unit_dir: PathBuf,
    use_sudo: bool,
}

impl Systemctl {
    pub fn new(services: &ServiceSettings) -> Self {
        Self {
            consensus_unit: services.consensus.clone(),
            execution_unit: services.execution.clone(),
            unit_dir: services.unit_dir.clone(),
            use_sudo: services.use_sudo,
        }
    }

    pub fn unit_name(&self, service: ServiceName) -> &str {
        match service {
            ServiceName::Consensus => &self.consensus_unit,
            ServiceName::Execution => &self.execution_unit,
        }
    }

    pub fn unit_path(&self, service: ServiceName) -> PathBuf {
        self.unit_dir
            .join(format!("{}.service", self.unit_name(service)))
    }

    fn systemctl(&self) -> AsyncCommand {
        if self.use_sudo {
            let mut command = AsyncCommand::new("sudo");
            command.arg("systemctl");
            command
        } else {
            AsyncCommand::new("systemctl")
        }
    }

    async fn run_verb(&self, verb: &str, unit: &str) -> Result<()> {
        debug!("systemctl {} {}", verb, unit);

        let output = self
            .systemctl()
            .arg(verb)
            .arg(unit)
            .output()
            .await
            .map_err(|e| OrchestratorError::supervision(unit, verb, e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::supervision(unit, verb, error.trim().to_string()));
        }

        Ok(())
    }

    async fn run_on_all(&self, verb: &str, services: &[ServiceName]) -> Result<()> {
        let mut first_error = None;

        for service in services {
            let unit = self.unit_name(*service);
            match self.run_verb(verb, unit).await {
                Ok(()) => info!("Service {} {} ok", unit, verb),
                Err(e) => {
                    warn!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceSupervisor for Systemctl {
    async fn start(&self, services: &[ServiceName]) -> Result<()> {
        self.run_on_all("start", services).await
    }

    async fn stop(&self, services: &[ServiceName]) -> Result<()> {
        self.run_on_all("stop", services).await
    }

    async fn restart(&self, services: &[ServiceName]) -> Result<()> {
        self.run_on_all("restart", services).await
    }

    async fn enable(&self, services: &[ServiceName]) -> Result<()> {
        self.run_on_all("enable", services).await
    }

    async fn disable(&self, services: &[ServiceName]) -> Result<()> {
        self.run_on_all("disable", services).await
    }

    async fn status(&self, service: ServiceName) -> Result<ServiceStatus> {
        let unit = self.unit_name(service);
        debug!("Checking service status: {}", unit);

        // is-active exits non-zero for anything but active; stdout is what matters
        let output = AsyncCommand::new("systemctl")
            .arg("is-active")
            .arg(unit)
            .output()
            .await
            .map_err(|e| OrchestratorError::supervision(unit, "is-active", e.to_string()))?;

        let status = String::from_utf8_lossy(&output.stdout);
        Ok(ServiceStatus::from_is_active(&status))
    }

    async fn write_unit(&self, service: ServiceName, unit: &UnitSpec) -> Result<()> {
        let path = self.unit_path(service);
        let staging = path.with_extension("service.tmp");
        let name = self.unit_name(service);

        tokio::fs::write(&staging, unit.render())
            .await
            .map_err(|e| OrchestratorError::supervision(name, "write unit", format!("{}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| OrchestratorError::supervision(name, "write unit", format!("{}: {}", path.display(), e)))?;

        info!("✓ Unit definition written: {}", path.display());
        Ok(())
    }

    async fn remove_unit(&self, service: ServiceName) -> Result<()> {
        let path = self.unit_path(service);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Unit definition removed: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestratorError::supervision(
                self.unit_name(service),
                "remove unit",
                format!("{}: {}", path.display(), e),
            )),
        }
    }

    async fn reload(&self) -> Result<()> {
        info!("Reloading unit definitions");

        let output = self
            .systemctl()
            .arg("daemon-reload")
            .output()
            .await
            .map_err(|e| OrchestratorError::supervision("systemd", "daemon-reload", e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::supervision(
                "systemd",
                "daemon-reload",
                error.trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn logs(&self, service: ServiceName, lines: usize) -> Result<String> {
        let unit = self.unit_name(service);

        let output = AsyncCommand::new("journalctl")
            .arg("-u")
            .arg(unit)
            .arg("-n")
            .arg(lines.to_string())
            .arg("--no-pager")
            .output()
            .await
            .map_err(|e| OrchestratorError::supervision(unit, "read logs", e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::supervision(unit, "read logs", error.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
