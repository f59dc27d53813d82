//! Node agent: exposes one node's lifecycle orchestrator over authenticated HTTP.

pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use orchestrator::NodeOrchestrator;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::services::JobManager;

pub const DEFAULT_LOG_LINES: usize = 200;

pub struct AppState {
    pub api_key: String,
    pub orchestrator: Arc<NodeOrchestrator>,
    pub job_manager: JobManager,
}

impl AppState {
    pub fn new(api_key: String, orchestrator: Arc<NodeOrchestrator>) -> Self {
        Self {
            api_key,
            orchestrator,
            job_manager: JobManager::new(),
        }
    }

    fn node_name(&self) -> &str {
        &self.orchestrator.settings().moniker
    }

    /// What the node is busy with, from either a queued job or the orchestrator itself
    pub async fn busy_with(&self) -> Option<String> {
        if let Some(job) = self.job_manager.running_job_for(self.node_name()).await {
            return Some(job.operation_type);
        }
        self.orchestrator
            .tracker()
            .get_active_operation(self.node_name())
            .await
            .map(|active| active.operation_type)
    }

    /// Runs `operation` as a background job and returns its id straight away.
    /// Refuses when the node already has something in flight.
    pub async fn execute_async_operation<F, Fut>(
        &self,
        operation_type: &str,
        operation: F,
    ) -> Result<String, String>
    where
        F: FnOnce(Arc<NodeOrchestrator>) -> Fut + Send + 'static,
        Fut: Future<Output = orchestrator::Result<serde_json::Value>> + Send + 'static,
    {
        if let Some(current) = self.busy_with().await {
            return Err(format!(
                "Node '{}' is busy with: {}",
                self.node_name(),
                current
            ));
        }

        let job_id = self
            .job_manager
            .create_job(operation_type, self.node_name())
            .await;

        let job_manager = self.job_manager.clone();
        let orchestrator = self.orchestrator.clone();
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            match operation(orchestrator).await {
                Ok(result) => job_manager.complete_job(&spawned_id, result).await,
                Err(e) => job_manager.fail_job(&spawned_id, e.to_string()).await,
            }
        });

        info!("Started {} as job {}", operation_type, job_id);
        Ok(job_id)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/node/install", post(handlers::install_async))
        .route("/node/configure", post(handlers::configure_async))
        .route("/node/start", post(handlers::start_async))
        .route("/node/resync", post(handlers::resync_async))
        .route("/node/upgrade", post(handlers::upgrade_async))
        .route("/node/decommission", post(handlers::decommission_async))
        .route("/node/restart", post(handlers::restart_services))
        .route("/node/stop", post(handlers::stop_services))
        .route("/node/status", get(handlers::get_node_status))
        .route("/node/logs/{service}", get(handlers::get_service_logs))
        .route("/node/balance/{address}", get(handlers::get_balance))
        .route("/validator", post(handlers::run_validator_action))
        .route("/jobs/{job_id}", get(handlers::get_job_status))
        .route("/operations/busy", get(handlers::get_busy_status))
        .route("/operations/cleanup", post(handlers::cleanup_jobs))
        .with_state(state)
}
