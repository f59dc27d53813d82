use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{info, warn};

use crate::config::ResourceSettings;
use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct HostResources {
    pub cpus: usize,
    pub memory_gb: u64,
    pub free_disk_gb: u64,
}

/// Checked before a node is configured on a host
#[async_trait]
pub trait ResourceGate: Send + Sync {
    async fn check(&self) -> Result<HostResources>;
}

pub struct HostResourceGate {
    minimum: ResourceSettings,
    disk_path: PathBuf,
}

impl HostResourceGate {
    pub fn new(minimum: ResourceSettings, disk_path: PathBuf) -> Self {
        Self { minimum, disk_path }
    }

    fn cpus() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    async fn memory_gb() -> Result<u64> {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo")
            .await
            .map_err(|e| OrchestratorError::io("/proc/meminfo", e))?;
        parse_meminfo_total_kb(&meminfo)
            .map(|kb| kb / 1024 / 1024)
            .ok_or_else(|| OrchestratorError::precondition("resource gate", "no MemTotal in /proc/meminfo"))
    }

    /// `df` on the nearest existing ancestor, since the node home may not exist yet
    async fn free_disk_gb(&self) -> Result<u64> {
        let probe = nearest_existing(&self.disk_path);
        let output = AsyncCommand::new("df")
            .arg("-Pk")
            .arg(&probe)
            .output()
            .await
            .map_err(|e| OrchestratorError::precondition("resource gate", format!("df failed: {}", e)))?;

        if !output.status.success() {
            return Err(OrchestratorError::precondition(
                "resource gate",
                format!("df {} failed: {}", probe.display(), String::from_utf8_lossy(&output.stderr).trim()),
            ));
        }

        parse_df_available_kb(&String::from_utf8_lossy(&output.stdout))
            .map(|kb| kb / 1024 / 1024)
            .ok_or_else(|| OrchestratorError::precondition("resource gate", "unreadable df output"))
    }
}

#[async_trait]
impl ResourceGate for HostResourceGate {
    async fn check(&self) -> Result<HostResources> {
        let resources = HostResources {
            cpus: Self::cpus(),
            memory_gb: Self::memory_gb().await?,
            free_disk_gb: self.free_disk_gb().await?,
        };
        info!(
            "Host resources: {} CPUs, {} GB memory, {} GB free disk",
            resources.cpus, resources.memory_gb, resources.free_disk_gb
        );

        let mut shortfalls = Vec::new();
        if resources.cpus < self.minimum.min_cpus {
            shortfalls.push(format!("{} CPUs (need {})", resources.cpus, self.minimum.min_cpus));
        }
        if resources.memory_gb < self.minimum.min_memory_gb {
            shortfalls.push(format!("{} GB memory (need {})", resources.memory_gb, self.minimum.min_memory_gb));
        }
        if resources.free_disk_gb < self.minimum.min_disk_gb {
            shortfalls.push(format!("{} GB free disk (need {})", resources.free_disk_gb, self.minimum.min_disk_gb));
        }

        if !shortfalls.is_empty() {
            warn!("Resource gate failed: {}", shortfalls.join(", "));
            return Err(OrchestratorError::precondition("resource gate", shortfalls.join(", ")));
        }
        Ok(resources)
    }
}

fn nearest_existing(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"))
        .to_path_buf()
}

fn parse_meminfo_total_kb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

/// Fourth column of the second line of `df -P`
fn parse_df_available_kb(output: &str) -> Option<u64> {
    output.lines().nth(1)?.split_whitespace().nth(3)?.parse().ok()
}
