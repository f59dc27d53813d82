use agent::{build_router, AppState};
use anyhow::Result;
use orchestrator::client::{HostResourceGate, NodeClient, ResourceGate, StoryCli};
use orchestrator::config::loader::load_settings;
use orchestrator::snapshot::ArchiveFetcher;
use orchestrator::supervisor::{ServiceSupervisor, Systemctl};
use orchestrator::NodeOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_NODE_CONFIG: &str = "config/node.toml";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8745";
const DEV_API_KEY: &str = "default-development-key";
const JOB_RETENTION_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("agent=info".parse()?)
        .add_directive("orchestrator=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Story node agent");

    let config_path = PathBuf::from(
        std::env::var("NODE_CONFIG").unwrap_or_else(|_| DEFAULT_NODE_CONFIG.to_string()),
    );
    let settings = load_settings(&config_path).await?;

    let listen_addr =
        std::env::var("AGENT_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let api_key = std::env::var("AGENT_API_KEY").unwrap_or_else(|_| DEV_API_KEY.to_string());
    if api_key == DEV_API_KEY {
        warn!("Using default development API key - set AGENT_API_KEY environment variable for production");
    }

    let supervisor: Arc<dyn ServiceSupervisor> = Arc::new(Systemctl::new(&settings.services));
    let client: Arc<dyn NodeClient> = Arc::new(StoryCli::new(&settings));
    let resources: Arc<dyn ResourceGate> = Arc::new(HostResourceGate::new(
        settings.resources.clone(),
        settings.home.clone(),
    ));
    let fetcher = ArchiveFetcher::new()?;

    let orchestrator = NodeOrchestrator::new(settings, supervisor, client, resources, fetcher);
    if let Err(e) = orchestrator.detect_state().await {
        warn!("Could not detect node state, assuming uninitialized: {}", e);
    }

    let state = Arc::new(AppState::new(api_key, Arc::new(orchestrator)));
    spawn_job_cleanup(state.clone());

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Node agent listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn spawn_job_cleanup(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state.job_manager.cleanup_old_jobs(JOB_RETENTION_HOURS).await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down node agent");
}
