//! HTTP request handlers for the agent server

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use chrono::Utc;
use orchestrator::client::{BinaryVersions, ValidatorAction, ValidatorOutcome};
use orchestrator::constants::operations;
use orchestrator::errors::OrchestratorError;
use orchestrator::supervisor::{ServiceName, ServiceStatus};
use orchestrator::{DecommissionConfirmation, InstallOptions, NodeStatusReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::middleware::ApiKeyAuth;
use crate::types::*;
use crate::{AppState, DEFAULT_LOG_LINES};

type Statuses = BTreeMap<ServiceName, ServiceStatus>;

fn to_json<T: Serialize>(value: &T) -> orchestrator::Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| OrchestratorError::Other(e.to_string()))
}

fn job_response(started: Result<String, String>) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    match started {
        Ok(job_id) => Ok(ResponseJson(ApiResponse::success_with_job(
            job_id,
            JobStatus::Running,
        ))),
        Err(err) => Ok(ResponseJson(ApiResponse::error(err))),
    }
}

fn data_response<T>(result: orchestrator::Result<T>) -> Result<ResponseJson<ApiResponse<T>>, StatusCode> {
    match result {
        Ok(data) => Ok(ResponseJson(ApiResponse::success_with_data(data))),
        Err(e) => Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    }
}

// === Long lifecycle operations, run as background jobs ===

pub async fn install_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(options): Json<InstallOptions>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::INSTALL, move |node| async move {
                let reached = node.install(options).await?;
                to_json(&reached)
            })
            .await,
    )
}

pub async fn configure_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::CONFIGURE, |node| async move {
                let reports = node.configure().await?;
                to_json(&reports)
            })
            .await,
    )
}

pub async fn start_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::START, |node| async move {
                let services = node.start().await?;
                to_json(&services)
            })
            .await,
    )
}

pub async fn resync_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResyncRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::RESYNC, move |node| async move {
                let report = node.resync(request.mode).await?;
                to_json(&report)
            })
            .await,
    )
}

pub async fn upgrade_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(versions): Json<BinaryVersions>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::UPGRADE, move |node| async move {
                let services = node.upgrade(versions).await?;
                to_json(&services)
            })
            .await,
    )
}

pub async fn decommission_async(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(confirmation): Json<DecommissionConfirmation>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    job_response(
        state
            .execute_async_operation(operations::DECOMMISSION, move |node| async move {
                node.decommission(confirmation).await?;
                Ok(serde_json::json!({ "operation": operations::DECOMMISSION }))
            })
            .await,
    )
}

// === Service handlers ===

pub async fn restart_services(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<Statuses>>, StatusCode> {
    data_response(state.orchestrator.restart_services().await)
}

pub async fn stop_services(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<Statuses>>, StatusCode> {
    data_response(state.orchestrator.stop_services().await)
}

pub async fn get_service_logs(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(service): Path<ServiceName>,
    Query(query): Query<LogsQuery>,
) -> Result<ResponseJson<ApiResponse<()>>, StatusCode> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    match state.orchestrator.logs(service, lines).await {
        Ok(output) => Ok(ResponseJson(ApiResponse::success_with_output(output))),
        Err(e) => Ok(ResponseJson(ApiResponse::error(e.to_string()))),
    }
}

// === Node queries ===

pub async fn get_node_status(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<NodeStatusReport>>, StatusCode> {
    Ok(ResponseJson(ApiResponse::success_with_data(
        state.orchestrator.status().await,
    )))
}

pub async fn get_balance(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<ResponseJson<ApiResponse<serde_json::Value>>, StatusCode> {
    data_response(state.orchestrator.balance(&address).await.map(|wei| {
        serde_json::json!({ "address": address, "balance_wei": wei.to_string() })
    }))
}

pub async fn run_validator_action(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(action): Json<ValidatorAction>,
) -> Result<ResponseJson<ApiResponse<ValidatorOutcome>>, StatusCode> {
    data_response(state.orchestrator.validator(action).await)
}

// === Job status handlers ===

pub async fn get_job_status(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<ResponseJson<ApiResponse<JobInfo>>, StatusCode> {
    match state.job_manager.get_job_status(&job_id).await {
        Some(job_info) => {
            let status = job_info.status;
            let error = job_info.error_message.clone();
            let mut response = ApiResponse::success_with_data(job_info);
            response.job_id = Some(job_id);
            response.job_status = Some(status);
            if status == JobStatus::Failed {
                response.success = false;
                response.error = error;
            }
            Ok(ResponseJson(response))
        }
        None => Ok(ResponseJson(ApiResponse::error(format!(
            "Job {} not found",
            job_id
        )))),
    }
}

pub async fn get_busy_status(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
) -> Result<ResponseJson<ApiResponse<BusyStatusResponse>>, StatusCode> {
    let node = state.orchestrator.settings().moniker.clone();
    let active_operation = state
        .orchestrator
        .tracker()
        .get_active_operation(&node)
        .await
        .map(|active| active.operation_type);

    Ok(ResponseJson(ApiResponse::success_with_data(BusyStatusResponse {
        node,
        active_operation,
        running_jobs: state.job_manager.get_running_jobs().await,
        timestamp: Utc::now(),
    })))
}

pub async fn cleanup_jobs(
    _auth: ApiKeyAuth,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CleanupRequest>,
) -> Result<ResponseJson<ApiResponse<CleanupResponse>>, StatusCode> {
    let max_hours = request.max_hours.unwrap_or(12);
    let cleaned_jobs = state.job_manager.cleanup_old_jobs(max_hours).await;

    Ok(ResponseJson(ApiResponse::success_with_data(CleanupResponse {
        cleaned_jobs,
        max_hours,
        timestamp: Utc::now(),
    })))
}
