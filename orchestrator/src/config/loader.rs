use anyhow::{anyhow, Result};
use std::path::Path;
use tokio::fs;
use tracing::info;

use super::NodeSettings;

pub async fn load_settings(path: &Path) -> Result<NodeSettings> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read node config {}: {}", path.display(), e))?;

    let settings = parse_settings(&content)
        .map_err(|e| anyhow!("Failed to parse node config {}: {}", path.display(), e))?;

    info!(
        "Loaded node config for '{}' on network {} (home: {})",
        settings.moniker,
        settings.network,
        settings.home.display()
    );

    Ok(settings)
}

pub fn parse_settings(content: &str) -> Result<NodeSettings> {
    let settings: NodeSettings = toml::from_str(content)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &NodeSettings) -> Result<()> {
    if settings.moniker.trim().is_empty() {
        return Err(anyhow!("Invalid value for 'moniker': must not be empty"));
    }
    if settings.moniker.contains('"') {
        return Err(anyhow!("Invalid value for 'moniker': must not contain quotes"));
    }
    if settings.network.trim().is_empty() {
        return Err(anyhow!("Missing required field: network"));
    }
    if !settings.home.is_absolute() {
        return Err(anyhow!(
            "Invalid value for 'home': {} is not an absolute path",
            settings.home.display()
        ));
    }
    if settings.services.consensus == settings.services.execution {
        return Err(anyhow!(
            "Invalid value for 'services': consensus and execution share unit name '{}'",
            settings.services.consensus
        ));
    }
    Ok(())
}
