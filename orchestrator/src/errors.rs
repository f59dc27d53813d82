//! Error types for the node lifecycle orchestrator
//!
//! Every fatal variant carries the step and the filesystem or service entities
//! involved, since recovery from a failed lifecycle operation is manual.

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug)]
pub enum OrchestratorError {
    /// Resource gate, missing binaries, missing key file
    PreconditionFailed { step: String, reason: String },

    /// Config file the patcher was pointed at does not exist
    ConfigNotFound { path: PathBuf },

    /// Config file exists but could not be read or rewritten
    ConfigApplyError { path: PathBuf, reason: String },

    /// Non-zero exit from the process manager
    SupervisionError {
        service: String,
        operation: String,
        reason: String,
    },

    /// One of the two services did not come up; the other is left as it is
    PartialStartFailure { service: String, status: String },

    SnapshotFetchError { url: String, reason: String },

    SnapshotExtractError { target: PathBuf, reason: String },

    /// Chain data is installed but the services could not be restarted
    PostInstallSupervisionError { service: String, reason: String },

    /// A destructive step failed while the signing state was held aside
    ManualRecoveryRequired {
        backup: PathBuf,
        source: Box<OrchestratorError>,
    },

    /// Validator operation rejected while the node is catching up
    NodeNotSynced { latest_block_height: Option<u64> },

    InvalidTransition {
        from: String,
        to: String,
        operation: String,
    },

    /// Another lifecycle operation holds the node
    NodeBusy { node: String, operation: String },

    ClientCommand { command: String, reason: String },

    Rpc { endpoint: String, reason: String },

    Io { path: PathBuf, reason: String },

    ConfirmationRejected { reason: String },

    Other(String),
}

impl OrchestratorError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        OrchestratorError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn supervision(service: &str, operation: &str, reason: impl Into<String>) -> Self {
        OrchestratorError::SupervisionError {
            service: service.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub fn precondition(step: &str, reason: impl Into<String>) -> Self {
        OrchestratorError::PreconditionFailed {
            step: step.to_string(),
            reason: reason.into(),
        }
    }

    /// The error underneath any `ManualRecoveryRequired` wrapping
    pub fn root(&self) -> &OrchestratorError {
        match self {
            OrchestratorError::ManualRecoveryRequired { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn signing_state_backup(&self) -> Option<&PathBuf> {
        match self {
            OrchestratorError::ManualRecoveryRequired { backup, .. } => Some(backup),
            _ => None,
        }
    }

    /// Failures that leave chain data partially replaced
    pub fn is_data_fault(&self) -> bool {
        matches!(
            self.root(),
            OrchestratorError::SnapshotFetchError { .. }
                | OrchestratorError::SnapshotExtractError { .. }
                | OrchestratorError::Io { .. }
        )
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::PreconditionFailed { step, reason } => {
                write!(f, "Precondition failed at '{}': {}", step, reason)
            }
            OrchestratorError::ConfigNotFound { path } => {
                write!(f, "Config file not found: {}", path.display())
            }
            OrchestratorError::ConfigApplyError { path, reason } => {
                write!(f, "Failed to apply config edits to {}: {}", path.display(), reason)
            }
            OrchestratorError::SupervisionError {
                service,
                operation,
                reason,
            } => {
                write!(f, "Service '{}' failed to {}: {}", service, operation, reason)
            }
            OrchestratorError::PartialStartFailure { service, status } => {
                write!(
                    f,
                    "Service '{}' did not start (status: {}); the other service was left untouched",
                    service, status
                )
            }
            OrchestratorError::SnapshotFetchError { url, reason } => {
                write!(f, "Failed to fetch snapshot archive {}: {}", url, reason)
            }
            OrchestratorError::SnapshotExtractError { target, reason } => {
                write!(
                    f,
                    "Failed to extract snapshot into {}: {} (directory may be partially populated)",
                    target.display(),
                    reason
                )
            }
            OrchestratorError::PostInstallSupervisionError { service, reason } => {
                write!(
                    f,
                    "Snapshot installed but service '{}' could not be restarted: {}",
                    service, reason
                )
            }
            OrchestratorError::ManualRecoveryRequired { backup, source } => {
                write!(
                    f,
                    "{}; restore signing-state backup located at {}",
                    source,
                    backup.display()
                )
            }
            OrchestratorError::NodeNotSynced {
                latest_block_height,
            } => match latest_block_height {
                Some(height) => write!(f, "Node is still catching up (at height {})", height),
                None => write!(f, "Node is still catching up"),
            },
            OrchestratorError::InvalidTransition {
                from,
                to,
                operation,
            } => {
                write!(f, "Cannot {} while node is {} (would move to {})", operation, from, to)
            }
            OrchestratorError::NodeBusy { node, operation } => {
                write!(f, "Node '{}' is busy with: {}", node, operation)
            }
            OrchestratorError::ClientCommand { command, reason } => {
                write!(f, "Client command '{}' failed: {}", command, reason)
            }
            OrchestratorError::Rpc { endpoint, reason } => {
                write!(f, "RPC query to {} failed: {}", endpoint, reason)
            }
            OrchestratorError::Io { path, reason } => {
                write!(f, "I/O error on {}: {}", path.display(), reason)
            }
            OrchestratorError::ConfirmationRejected { reason } => {
                write!(f, "Confirmation rejected: {}", reason)
            }
            OrchestratorError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Other(err.to_string())
    }
}
