//! Taskforce Server
//!
//! Self-hosted API for submitting tasks, answering interaction requests, and
//! streaming run events. This is a library crate; the binary calls
//! `start_server()`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use taskforce_core::agent::{
    AgentTeam, ModelSelector, OrchestratorConfig, OrchestratorServices, SpeakerSelector,
    WorkflowSelector,
};
use taskforce_core::ai::{ChatModel, OpenAiChatModel};
use taskforce_core::interaction::BrokerTimeouts;
use taskforce_core::tools::{builtin_tools, register_confirmed, ToolRegistry};
use taskforce_core::{
    EventHub, InteractionBroker, Settings, SqliteRepository, TaskOrchestrator, TaskRepository,
};

pub mod error;
pub mod routes;
pub mod types;
pub mod ws;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn TaskRepository>,
    /// Fan-out of run events to WebSocket observers.
    pub events: Arc<EventHub>,
    pub broker: Arc<InteractionBroker>,
    /// None when no language model is configured; task submission is refused.
    pub orchestrator: Option<Arc<TaskOrchestrator>>,
    /// Root of the per-task workspaces served by the download route.
    pub workspace_dir: Arc<PathBuf>,
}

/// Build the language model from settings, if an API key is configured.
pub fn create_chat_model(settings: &Settings) -> anyhow::Result<Option<Arc<dyn ChatModel>>> {
    let Some(api_key) = settings.openai_api_key.as_deref() else {
        tracing::warn!("No OPENAI_API_KEY configured; task submission will be unavailable");
        return Ok(None);
    };
    let model = OpenAiChatModel::new(api_key)?
        .with_model(&settings.model)
        .with_base_url(&settings.base_url);
    tracing::info!(model = %settings.model, base_url = %settings.base_url, "Language model configured");
    Ok(Some(Arc::new(model)))
}

/// Wire storage, the event hub, the broker, and (given a model) the orchestrator.
pub async fn build_state(
    settings: &Settings,
    model: Option<Arc<dyn ChatModel>>,
) -> anyhow::Result<AppState> {
    let repo: Arc<dyn TaskRepository> =
        Arc::new(SqliteRepository::new(settings.database_path.clone())?);
    let events = Arc::new(EventHub::new());
    let broker = Arc::new(
        InteractionBroker::new(repo.clone(), events.clone())
            .with_timeouts(BrokerTimeouts::from(&settings.interaction)),
    );

    let orchestrator = match model {
        Some(model) => {
            let tools = Arc::new(ToolRegistry::new());
            register_confirmed(&tools, &broker, builtin_tools()).await;

            let selector: Arc<dyn SpeakerSelector> = if settings.model_selection {
                Arc::new(ModelSelector::new(model.clone()))
            } else {
                Arc::new(WorkflowSelector)
            };
            let services = OrchestratorServices {
                repo: repo.clone(),
                notifier: events.clone(),
                broker: broker.clone(),
                selector,
            };
            let config = OrchestratorConfig {
                max_turns: settings.max_turns,
                workspace_root: settings.workspace_dir.clone(),
                guidance_timeout: settings.interaction.guidance_timeout(),
            };
            Some(Arc::new(TaskOrchestrator::new(
                services,
                AgentTeam::new(model, tools),
                config,
            )))
        }
        None => None,
    };

    Ok(AppState {
        repo,
        events,
        broker,
        orchestrator,
        workspace_dir: Arc::new(settings.workspace_dir.clone()),
    })
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws/task/:task_id", get(ws::task_events::handler))
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and block until shutdown.
pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = settings.bind_addr().parse()?;
    let model = create_chat_model(&settings)?;
    let state = build_state(&settings, model).await?;
    let app = build_router(state);

    tracing::info!("Taskforce server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: HashMap::from([
            ("tasks".to_string(), true),
            ("interactions".to_string(), true),
            ("files".to_string(), true),
        ]),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    features: HashMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use taskforce_core::ai::{ChatMessage, Completion, ModelError, ToolDefinition};
    use taskforce_core::storage::{InteractionKind, NewInteraction};
    use taskforce_core::{Notifier, TaskStatus};

    use super::*;

    /// Every agent reports its phase done in one message
    struct FinishingModel;

    #[async_trait]
    impl ChatModel for FinishingModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<Completion, ModelError> {
            Ok(Completion::text(
                "All steps handled. PLAN_COMPLETE EXECUTION_COMPLETE TASK_COMPLETE",
            ))
        }
    }

    fn settings(temp: &TempDir) -> Settings {
        Settings {
            database_path: temp.path().join("taskforce.db"),
            workspace_dir: temp.path().join("workspace"),
            model_selection: false,
            ..Settings::default()
        }
    }

    async fn serve(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        addr
    }

    async fn pending_request(state: &AppState) -> (i64, i64) {
        let task_id = state.repo.create_task("Send the report").await.unwrap();
        let request_id = state
            .repo
            .create_interaction(&NewInteraction {
                task_id,
                kind: InteractionKind::Confirmation,
                tool_name: "send_email".to_string(),
                prompt: "Execute **send_email**".to_string(),
                fields: None,
                preview: Some(json!({"tool": "send_email"})),
            })
            .await
            .unwrap();
        (task_id, request_id)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let temp = TempDir::new().unwrap();
        let state = build_state(&settings(&temp), None).await.unwrap();
        let addr = serve(state).await;

        let body: Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn task_submission_requires_a_model() {
        let temp = TempDir::new().unwrap();
        let state = build_state(&settings(&temp), None).await.unwrap();
        let addr = serve(state).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/api/tasks"))
            .json(&json!({"objective": "Plan a trip"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");

        let response = client
            .post(format!("http://{addr}/api/tasks"))
            .json(&json!({"objective": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn submitted_task_runs_to_completion() {
        let temp = TempDir::new().unwrap();
        let model: Arc<dyn ChatModel> = Arc::new(FinishingModel);
        let state = build_state(&settings(&temp), Some(model)).await.unwrap();
        let addr = serve(state).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("http://{addr}/api/tasks"))
            .json(&json!({"objective": "Plan a trip"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        let created: Value = response.json().await.unwrap();
        let task_id = created["task_id"].as_i64().unwrap();

        let mut detail = Value::Null;
        for _ in 0..200 {
            detail = client
                .get(format!("http://{addr}/api/tasks/{task_id}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if detail["status"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(detail["status"], "completed");
        let speakers: Vec<&str> = detail["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["agent_name"].as_str().unwrap())
            .collect();
        assert_eq!(speakers, ["User", "Planner", "Executor", "Reviewer"]);
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let temp = TempDir::new().unwrap();
        let state = build_state(&settings(&temp), None).await.unwrap();
        let addr = serve(state).await;

        let response = reqwest::get(format!("http://{addr}/api/tasks/42")).await.unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn pending_and_respond_endpoints() {
        let temp = TempDir::new().unwrap();
        let state = build_state(&settings(&temp), None).await.unwrap();
        let (task_id, request_id) = pending_request(&state).await;
        let addr = serve(state).await;
        let client = reqwest::Client::new();

        let pending: Value = client
            .get(format!("http://{addr}/api/interactions/task/{task_id}/pending"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(pending["pending"], true);
        assert_eq!(pending["request_id"], request_id);
        assert_eq!(pending["interaction_type"], "confirmation");
        assert_eq!(pending["tool_name"], "send_email");

        let respond_url = format!("http://{addr}/api/interactions/{request_id}/respond");
        let response = client
            .post(&respond_url)
            .json(&json!({"confirmed": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        // Nothing in this process was waiting on the row
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["outcome"], "orphaned");

        let again = client
            .post(&respond_url)
            .json(&json!({"confirmed": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), 409);

        let missing = client
            .post(format!("http://{addr}/api/interactions/9999/respond"))
            .json(&json!({"cancelled": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);

        let cleared: Value = client
            .get(format!("http://{addr}/api/interactions/task/{task_id}/pending"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cleared, json!({"pending": false}));
    }

    #[tokio::test]
    async fn workspace_file_download() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let state = build_state(&settings, None).await.unwrap();
        let task_id = state.repo.create_task("Write a summary").await.unwrap();
        let workspace = taskforce_core::paths::task_workspace(&settings.workspace_dir, task_id);
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("summary.md"), "# Paris\nSunny").unwrap();
        std::fs::write(temp.path().join("secret.txt"), "outside").unwrap();
        let addr = serve(state).await;
        let base = format!("http://{addr}/api/files/download");

        let response = reqwest::get(format!("{base}/{task_id}/summary.md")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"summary.md\""
        );
        assert_eq!(response.text().await.unwrap(), "# Paris\nSunny");

        let missing = reqwest::get(format!("{base}/{task_id}/notes.txt")).await.unwrap();
        assert_eq!(missing.status(), 404);

        // Directory parts are dropped, so this looks for secret.txt in the workspace
        let escaped = reqwest::get(format!("{base}/{task_id}/..%2F..%2Fsecret.txt"))
            .await
            .unwrap();
        assert_eq!(escaped.status(), 404);

        let unknown_task = reqwest::get(format!("{base}/9999/summary.md")).await.unwrap();
        assert_eq!(unknown_task.status(), 404);
    }

    #[tokio::test]
    async fn websocket_streams_task_events_and_acks() {
        let temp = TempDir::new().unwrap();
        let state = build_state(&settings(&temp), None).await.unwrap();
        let events = state.events.clone();
        let addr = serve(state).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/task/7"))
            .await
            .unwrap();

        for _ in 0..200 {
            if events.subscriber_count(7) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        events.notify_status(7, TaskStatus::Executing);
        events.notify_status(8, TaskStatus::Failed);

        let frame = socket.next().await.unwrap().unwrap();
        let event: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(event, json!({"type": "status_update", "status": "executing"}));

        socket.send(WsMessage::Text("ping".into())).await.unwrap();
        let frame = socket.next().await.unwrap().unwrap();
        let ack: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(ack, json!({"type": "ack", "data": "ping"}));
    }
}
