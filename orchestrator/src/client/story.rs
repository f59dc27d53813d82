use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::commands::execute_command;
use super::{parse_version, BinaryVersions, NodeClient, ValidatorAction, ValidatorKey, ValidatorOutcome};
use crate::config::NodeSettings;
use crate::errors::{OrchestratorError, Result};

/// `story` and `geth` command-line invocations
pub struct StoryCli {
    story: PathBuf,
    geth: PathBuf,
    story_home: PathBuf,
    private_key_path: PathBuf,
}

impl StoryCli {
    pub fn new(settings: &NodeSettings) -> Self {
        Self {
            story: settings.binaries.story.clone(),
            geth: settings.binaries.geth.clone(),
            story_home: settings.story_home(),
            private_key_path: settings.private_key_path(),
        }
    }

    async fn run_story(&self, args: Vec<String>, envs: &[(String, String)]) -> Result<String> {
        let command = format!("story {}", args.first().map(String::as_str).unwrap_or_default());
        execute_command(&self.story, &args, envs, Some(&self.story_home))
            .await
            .map_err(|e| OrchestratorError::ClientCommand {
                command,
                reason: e.to_string(),
            })
    }

    /// `PRIVATE_KEY=...` as written by the key setup, or a bare hex key
    async fn private_key_env(&self) -> Result<(String, String)> {
        let content = tokio::fs::read_to_string(&self.private_key_path)
            .await
            .map_err(|e| OrchestratorError::io(&self.private_key_path, e))?;
        let raw = content.trim();
        let key = raw.strip_prefix("PRIVATE_KEY=").unwrap_or(raw).trim();
        if key.is_empty() {
            return Err(OrchestratorError::precondition(
                "read private key",
                format!("{} is empty", self.private_key_path.display()),
            ));
        }
        Ok(("PRIVATE_KEY".to_string(), key.to_string()))
    }
}

#[async_trait]
impl NodeClient for StoryCli {
    async fn binary_versions(&self) -> Result<BinaryVersions> {
        // checked before the home exists, so no working directory here either
        let story_out = execute_command(&self.story, &["version".to_string()], &[], None)
            .await
            .map_err(|e| OrchestratorError::ClientCommand {
                command: "story version".to_string(),
                reason: e.to_string(),
            })?;
        let geth_out = execute_command(&self.geth, &["version".to_string()], &[], None)
            .await
            .map_err(|e| OrchestratorError::ClientCommand {
                command: "geth version".to_string(),
                reason: e.to_string(),
            })?;

        let story = parse_version(&story_out).ok_or_else(|| OrchestratorError::ClientCommand {
            command: "story version".to_string(),
            reason: "no version in output".to_string(),
        })?;
        let geth = parse_version(&geth_out).ok_or_else(|| OrchestratorError::ClientCommand {
            command: "geth version".to_string(),
            reason: "no version in output".to_string(),
        })?;

        Ok(BinaryVersions { story, geth })
    }

    async fn init(&self, network: &str, moniker: &str) -> Result<()> {
        info!("Initializing consensus home {} for {}", self.story_home.display(), network);
        let args = vec![
            "init".to_string(),
            "--network".to_string(),
            network.to_string(),
            "--moniker".to_string(),
            moniker.to_string(),
            "--home".to_string(),
            self.story_home.display().to_string(),
        ];
        // init runs before the home exists, so no working directory
        execute_command(&self.story, &args, &[], None)
            .await
            .map_err(|e| OrchestratorError::ClientCommand {
                command: "story init".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn reset_consensus_state(&self) -> Result<()> {
        info!("Resetting consensus state under {}", self.story_home.display());
        self.run_story(
            vec![
                "comet".to_string(),
                "unsafe-reset-all".to_string(),
                "--home".to_string(),
                self.story_home.display().to_string(),
            ],
            &[],
        )
        .await?;
        Ok(())
    }

    async fn validator(&self, action: &ValidatorAction) -> Result<ValidatorOutcome> {
        let mut args = vec!["validator".to_string()];
        args.extend(action.args());

        let envs = if action.sends_transaction() {
            vec![self.private_key_env().await?]
        } else {
            Vec::new()
        };

        info!("Running validator {}", action.name());
        let output = execute_command(&self.story, &args, &envs, Some(&self.story_home))
            .await
            .map_err(|e| OrchestratorError::ClientCommand {
                command: format!("story validator {}", action.name()),
                reason: e.to_string(),
            })?;

        let key = matches!(action, ValidatorAction::Export).then(|| ValidatorKey::parse(&output));
        Ok(ValidatorOutcome {
            action: action.name().to_string(),
            output,
            key,
        })
    }
}
