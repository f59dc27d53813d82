use anyhow::{anyhow, Result};
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Runs a client binary directly (no shell) and returns its stdout.
/// `envs` are passed to the child only and never logged.
pub async fn execute_command(
    program: &Path,
    args: &[String],
    envs: &[(String, String)],
    current_dir: Option<&Path>,
) -> Result<String> {
    debug!("Executing command: {} {}", program.display(), args.join(" "));

    let mut command = AsyncCommand::new(program);
    command.args(args).kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }
    if let Some(dir) = current_dir {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| anyhow!("Failed to spawn {}: {}", program.display(), e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if output.status.success() {
        // some clients print their report on stderr
        if stdout.trim().is_empty() {
            Ok(stderr)
        } else {
            Ok(stdout)
        }
    } else {
        let error_msg = if !stderr.trim().is_empty() { stderr } else { stdout };
        Err(anyhow!("Command failed ({}): {}", output.status, error_msg.trim()))
    }
}
