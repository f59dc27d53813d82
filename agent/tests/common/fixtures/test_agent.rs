//! A router wired to an orchestrator over stubs, driven with `oneshot`

use agent::{build_router, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use orchestrator::client::{BinaryVersions, ExecutionRpc, NodeClient, ResourceGate};
use orchestrator::config::loader::parse_settings;
use orchestrator::snapshot::ArchiveFetcher;
use orchestrator::supervisor::{ServiceStatus, ServiceSupervisor};
use orchestrator::{NodeOrchestrator, NodeState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use super::stubs::{StubClient, StubGate, StubSupervisor};

pub const API_KEY: &str = "test-agent-key";
pub const MONIKER: &str = "lisbon-validator";

pub struct TestAgent {
    pub home: TempDir,
    pub supervisor: Arc<StubSupervisor>,
    pub orchestrator: Arc<NodeOrchestrator>,
    pub app: Router,
}

impl TestAgent {
    pub fn new(state: NodeState, services: ServiceStatus) -> Self {
        let home = TempDir::new().unwrap();
        let root = home.path().display().to_string();
        let settings = parse_settings(&format!(
            r#"
network = "aeneid"
moniker = "{moniker}"
home = "{root}/.story"

[binaries]
story = "{root}/bin/story"
geth = "{root}/bin/geth"
story_version = "1.1.0"
geth_version = "1.0.2"

[services]
unit_dir = "{root}/units"
"#,
            moniker = MONIKER,
            root = root,
        ))
        .unwrap();

        let supervisor = Arc::new(StubSupervisor::with_status(services));
        let dyn_supervisor: Arc<dyn ServiceSupervisor> = supervisor.clone();
        let client: Arc<dyn NodeClient> = Arc::new(StubClient {
            versions: BinaryVersions {
                story: "1.1.0".to_string(),
                geth: "1.0.2".to_string(),
            },
        });
        let gate: Arc<dyn ResourceGate> = Arc::new(StubGate);

        let orchestrator = Arc::new(
            NodeOrchestrator::new(settings, dyn_supervisor, client, gate, ArchiveFetcher::new().unwrap())
                .with_start_grace(Duration::ZERO)
                // nothing listens on the discard port
                .with_execution_rpc(ExecutionRpc::new("http://127.0.0.1:9"))
                .with_state(state),
        );

        let app = build_router(Arc::new(AppState::new(
            API_KEY.to_string(),
            orchestrator.clone(),
        )));

        Self {
            home,
            supervisor,
            orchestrator,
            app,
        }
    }

    pub async fn call(&self, method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> Value {
        let (status, json) = self.call("GET", uri, Some(API_KEY), None).await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        json
    }

    pub async fn post(&self, uri: &str, body: Value) -> Value {
        let (status, json) = self.call("POST", uri, Some(API_KEY), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{}", json);
        json
    }

    /// Polls a job until it leaves the running state
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        for _ in 0..200 {
            let json = self.get(&format!("/jobs/{}", job_id)).await;
            if json["job_status"] != "running" {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", job_id);
    }
}
