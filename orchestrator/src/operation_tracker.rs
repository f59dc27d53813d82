//! One lifecycle operation per node at a time.
//!
//! Every mutating orchestrator call claims the node here first and releases
//! it when done, whatever the outcome. A second caller gets `NodeBusy`
//! instead of interleaving with a snapshot install or a teardown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOperation {
    pub operation_type: String,
    pub node: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct OperationTracker {
    active_operations: Arc<RwLock<HashMap<String, ActiveOperation>>>, // node -> operation
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self), fields(node = %node, operation = %operation_type))]
    pub async fn try_start_operation(&self, node: &str, operation_type: &str) -> Result<()> {
        let mut active = self.active_operations.write().await;

        if let Some(current) = active.get(node) {
            let duration = Utc::now().signed_duration_since(current.started_at);
            let duration_str = if duration.num_hours() > 0 {
                format!("{}h {}m", duration.num_hours(), duration.num_minutes() % 60)
            } else {
                format!("{}m", duration.num_minutes())
            };

            return Err(OrchestratorError::NodeBusy {
                node: node.to_string(),
                operation: format!("{} (started {} ago)", current.operation_type, duration_str),
            });
        }

        active.insert(
            node.to_string(),
            ActiveOperation {
                operation_type: operation_type.to_string(),
                node: node.to_string(),
                started_at: Utc::now(),
            },
        );
        info!("Started operation '{}' on {}", operation_type, node);
        Ok(())
    }

    #[instrument(skip(self), fields(node = %node))]
    pub async fn finish_operation(&self, node: &str) {
        let mut active = self.active_operations.write().await;
        if let Some(op) = active.remove(node) {
            let duration = Utc::now().signed_duration_since(op.started_at);
            info!(
                "Finished operation '{}' on {} (took {}m)",
                op.operation_type,
                node,
                duration.num_minutes()
            );
        }
    }

    pub async fn is_busy(&self, node: &str) -> bool {
        self.active_operations.read().await.contains_key(node)
    }

    pub async fn get_active_operation(&self, node: &str) -> Option<ActiveOperation> {
        self.active_operations.read().await.get(node).cloned()
    }
}
