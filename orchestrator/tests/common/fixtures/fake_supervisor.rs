//! In-memory process manager
//!
//! Records every call in order so tests can assert on sequencing, and keeps
//! a status per service that start/stop/restart move around.

use async_trait::async_trait;
use orchestrator::errors::{OrchestratorError, Result};
use orchestrator::supervisor::{ServiceName, ServiceStatus, ServiceSupervisor, UnitSpec};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub struct FakeSupervisor {
    events: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<ServiceName, ServiceStatus>>,
    units: Mutex<HashMap<ServiceName, String>>,
    failing_start: HashSet<ServiceName>,
    stuck_on_stop: bool,
}

impl FakeSupervisor {
    /// Both services inactive
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::from([
                (ServiceName::Consensus, ServiceStatus::Inactive),
                (ServiceName::Execution, ServiceStatus::Inactive),
            ])),
            units: Mutex::new(HashMap::new()),
            failing_start: HashSet::new(),
            stuck_on_stop: false,
        }
    }

    /// Both services active
    pub fn running() -> Self {
        let supervisor = Self::new();
        for service in ServiceName::BOTH {
            supervisor.set_status(service, ServiceStatus::Active);
        }
        supervisor
    }

    /// `stop` succeeds but the services stay active
    pub fn stuck_on_stop(mut self) -> Self {
        self.stuck_on_stop = true;
        self
    }

    pub fn failing_start(mut self, service: ServiceName) -> Self {
        self.failing_start.insert(service);
        self
    }

    pub fn set_status(&self, service: ServiceName, status: ServiceStatus) {
        self.statuses.lock().unwrap().insert(service, status);
    }

    pub fn status_of(&self, service: ServiceName) -> ServiceStatus {
        self.statuses.lock().unwrap()[&service]
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Events recorded since the `n`th one
    pub fn events_since(&self, n: usize) -> Vec<String> {
        self.events.lock().unwrap().iter().skip(n).cloned().collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(verb))
            .count()
    }

    pub fn unit(&self, service: ServiceName) -> Option<String> {
        self.units.lock().unwrap().get(&service).cloned()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn bring_up(&self, verb: &str, services: &[ServiceName]) -> Result<()> {
        let mut first_error = None;
        for service in services {
            self.record(format!("{} {:?}", verb, service));
            if self.failing_start.contains(service) {
                self.set_status(*service, ServiceStatus::Failed);
                first_error.get_or_insert(OrchestratorError::supervision(
                    &service.to_string(),
                    verb,
                    "exited with status 1",
                ));
            } else {
                self.set_status(*service, ServiceStatus::Active);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceSupervisor for FakeSupervisor {
    async fn start(&self, services: &[ServiceName]) -> Result<()> {
        self.bring_up("start", services)
    }

    async fn stop(&self, services: &[ServiceName]) -> Result<()> {
        for service in services {
            self.record(format!("stop {:?}", service));
            if !self.stuck_on_stop {
                self.set_status(*service, ServiceStatus::Inactive);
            }
        }
        Ok(())
    }

    async fn restart(&self, services: &[ServiceName]) -> Result<()> {
        self.bring_up("restart", services)
    }

    async fn enable(&self, services: &[ServiceName]) -> Result<()> {
        for service in services {
            self.record(format!("enable {:?}", service));
        }
        Ok(())
    }

    async fn disable(&self, services: &[ServiceName]) -> Result<()> {
        for service in services {
            self.record(format!("disable {:?}", service));
        }
        Ok(())
    }

    async fn status(&self, service: ServiceName) -> Result<ServiceStatus> {
        Ok(self.status_of(service))
    }

    async fn write_unit(&self, service: ServiceName, unit: &UnitSpec) -> Result<()> {
        self.record(format!("write_unit {:?}", service));
        self.units.lock().unwrap().insert(service, unit.render());
        Ok(())
    }

    async fn remove_unit(&self, service: ServiceName) -> Result<()> {
        self.record(format!("remove_unit {:?}", service));
        self.units.lock().unwrap().remove(&service);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload".to_string());
        Ok(())
    }

    async fn logs(&self, service: ServiceName, lines: usize) -> Result<String> {
        Ok(format!("{} last {} lines\n", service, lines))
    }
}
