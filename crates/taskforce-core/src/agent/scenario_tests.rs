//! End-to-end runs of the orchestrator against scripted models and a
//! scripted user

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use super::*;
use crate::ai::{ChatMessage, ChatModel, ChatRole, Completion, ModelError, ToolCall, ToolDefinition};
use crate::interaction::{BrokerTimeouts, InteractionBroker};
use crate::storage::{InteractionKind, InteractionResponse, SqliteRepository, TaskRepository, TaskStatus};
use crate::test_support::{repository, RecordingNotifier, ScriptedModel};
use crate::tools::implementations::CreateFileTool;
use crate::tools::{register_confirmed, Tool, ToolContext, ToolRegistry, ToolResult};

struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Current weather for a city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let city = params["city"].as_str().unwrap_or("nowhere");
        ToolResult::success(format!("Weather in {city}: sunny, 21C"))
    }
}

/// Speakers in a fixed order, regardless of the transcript
struct FixedOrder(parking_lot::Mutex<VecDeque<AgentRole>>);

impl FixedOrder {
    fn new(order: &[AgentRole]) -> Arc<Self> {
        Arc::new(Self(parking_lot::Mutex::new(order.iter().copied().collect())))
    }
}

#[async_trait]
impl SpeakerSelector for FixedOrder {
    async fn select(&self, _transcript: &[TranscriptEntry]) -> AgentRole {
        self.0.lock().pop_front().unwrap_or(AgentRole::Reviewer)
    }
}

/// Status updates without the transient broker waits
fn phases(notifier: &RecordingNotifier, task_id: i64) -> Vec<String> {
    notifier
        .statuses(task_id)
        .into_iter()
        .filter(|s| s != "awaiting_input")
        .collect()
}

fn tool_turn(text: &str, name: &str, arguments: Value) -> Completion {
    Completion {
        text: text.to_string(),
        tool_calls: vec![ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments,
        }],
    }
}

struct Harness {
    repo: Arc<SqliteRepository>,
    notifier: Arc<RecordingNotifier>,
    broker: Arc<InteractionBroker>,
    task_id: i64,
    temp: TempDir,
}

impl Harness {
    async fn new(objective: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let repo = repository(temp.path());
        let notifier = Arc::new(RecordingNotifier::default());
        let timeout = Duration::from_secs(5);
        let broker = Arc::new(
            InteractionBroker::new(repo.clone(), notifier.clone()).with_timeouts(BrokerTimeouts {
                input: timeout,
                confirmation: timeout,
                guidance: timeout,
            }),
        );
        let task_id = repo.create_task(objective).await.unwrap();
        Self {
            repo,
            notifier,
            broker,
            task_id,
            temp,
        }
    }

    async fn orchestrator(
        &self,
        planner: Arc<ScriptedModel>,
        executor: Arc<ScriptedModel>,
        reviewer: Arc<ScriptedModel>,
        max_turns: usize,
    ) -> TaskOrchestrator {
        self.orchestrator_with(planner, executor, reviewer, max_turns, Arc::new(WorkflowSelector))
            .await
    }

    async fn orchestrator_with(
        &self,
        planner: Arc<ScriptedModel>,
        executor: Arc<ScriptedModel>,
        reviewer: Arc<ScriptedModel>,
        max_turns: usize,
        selector: Arc<dyn SpeakerSelector>,
    ) -> TaskOrchestrator {
        let registry = Arc::new(ToolRegistry::new());
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(WeatherTool), Arc::new(CreateFileTool)];
        register_confirmed(&registry, &self.broker, tools).await;

        let team = AgentTeam {
            planner: Agent::new(AgentRole::Planner, planner),
            executor: Agent::new(AgentRole::Executor, executor).with_tools(registry),
            reviewer: Agent::new(AgentRole::Reviewer, reviewer),
        };
        let services = OrchestratorServices {
            repo: self.repo.clone(),
            notifier: self.notifier.clone(),
            broker: self.broker.clone(),
            selector,
        };
        let config = OrchestratorConfig {
            max_turns,
            workspace_root: self.temp.path().join("workspace"),
            guidance_timeout: Duration::from_secs(5),
        };
        TaskOrchestrator::new(services, team, config)
    }

    /// Answer announced requests in order; returns how many were answered
    fn respond_with(&self, responses: Vec<InteractionResponse>) -> tokio::task::JoinHandle<usize> {
        let notifier = self.notifier.clone();
        let broker = self.broker.clone();
        let task_id = self.task_id;
        tokio::spawn(async move {
            let mut queue: VecDeque<_> = responses.into();
            let mut answered = 0;
            while !queue.is_empty() {
                let announced = notifier.announced_requests(task_id);
                if let Some(&request_id) = announced.get(answered) {
                    let response = queue.pop_front().unwrap();
                    broker.resolve(request_id, response).await.unwrap();
                    answered += 1;
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
            answered
        })
    }

    async fn transcript(&self) -> Vec<(String, String)> {
        self.repo
            .messages(self.task_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.agent_name, m.content))
            .collect()
    }
}

#[tokio::test]
async fn test_confirmed_tool_run_completes_task() {
    let h = Harness::new("Get the weather in Paris and save a summary").await;
    let planner = ScriptedModel::texts(&["1. Fetch the weather\n2. Write summary.md\nPLAN_COMPLETE"]);
    let executor = ScriptedModel::new(vec![
        tool_turn("Fetching the weather first.", "get_weather", json!({"city": "Paris"})),
        tool_turn(
            "Saving the summary. EXECUTION_COMPLETE",
            "create_file",
            json!({"filename": "summary.md", "content": "# Paris\nSunny, 21C"}),
        ),
    ]);
    let reviewer = ScriptedModel::texts(&["The summary matches the forecast. TASK_COMPLETE"]);
    let orchestrator = h
        .orchestrator(planner, executor.clone(), reviewer, 20)
        .await;

    let user = h.respond_with(vec![InteractionResponse::confirm(), InteractionResponse::confirm()]);
    let outcome = orchestrator.run(h.task_id).await;
    assert_eq!(user.await.unwrap(), 2);
    assert_eq!(outcome, RunOutcome::Completed);

    let task = h.repo.get_task(h.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.plan.unwrap().contains("PLAN_COMPLETE"));
    let execution = task.execution_result.unwrap();
    assert!(execution.contains("Weather in Paris: sunny, 21C"));
    assert!(execution.contains("\n\n"));
    assert!(task.review_result.unwrap().contains("TASK_COMPLETE"));

    let artifacts = h.repo.artifacts(h.task_id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].filename, "summary.md");
    assert_eq!(artifacts[0].extension, ".md");

    let speakers: Vec<String> = h.transcript().await.into_iter().map(|(s, _)| s).collect();
    assert_eq!(speakers, ["User", "Planner", "Executor", "Executor", "Reviewer"]);

    // Only the Executor is offered tools
    assert!(executor.tool_names_seen()[0].contains(&"get_weather".to_string()));

    let statuses = h.notifier.statuses(h.task_id);
    assert!(statuses.iter().any(|s| s == "awaiting_input"));
    // Broker waits restore the phase they interrupted
    let mut phases = phases(&h.notifier, h.task_id);
    phases.dedup();
    assert_eq!(phases, ["planning", "executing", "reviewing", "completed"]);
}

#[tokio::test]
async fn test_plan_marker_outside_planning_keeps_phase() {
    let h = Harness::new("Write a short report").await;
    let planner = ScriptedModel::texts(&[
        "1. Draft the report\nPLAN_COMPLETE",
        "Revised plan: add a conclusion. PLAN_COMPLETE",
    ]);
    let executor = ScriptedModel::texts(&["Drafted the report body. EXECUTION_COMPLETE"]);
    let reviewer = ScriptedModel::texts(&["Report reads well. TASK_COMPLETE"]);
    let selector = FixedOrder::new(&[
        AgentRole::Planner,
        AgentRole::Executor,
        AgentRole::Planner,
        AgentRole::Reviewer,
    ]);
    let orchestrator = h
        .orchestrator_with(planner, executor, reviewer, 10, selector)
        .await;

    assert_eq!(orchestrator.run(h.task_id).await, RunOutcome::Completed);
    assert_eq!(
        phases(&h.notifier, h.task_id),
        ["planning", "executing", "reviewing", "completed"]
    );
    let task = h.repo.get_task(h.task_id).await.unwrap().unwrap();
    assert!(task.plan.unwrap().contains("Revised plan"));
}

#[tokio::test]
async fn test_repeated_denials_escalate_and_user_stops() {
    let h = Harness::new("Check the weather").await;
    let planner = ScriptedModel::texts(&["Call the weather tool for Oslo. PLAN_COMPLETE"]);
    let executor = ScriptedModel::new(
        (0..3)
            .map(|_| tool_turn("Trying the weather tool.", "get_weather", json!({"city": "Oslo"})))
            .collect(),
    );
    let reviewer = ScriptedModel::texts(&[]);
    let orchestrator = h
        .orchestrator(planner, executor.clone(), reviewer, 20)
        .await;

    let user = h.respond_with(vec![
        InteractionResponse::deny(),
        InteractionResponse::deny(),
        InteractionResponse::deny(),
        InteractionResponse::with_values([("guidance", "cancel")]),
    ]);
    let outcome = orchestrator.run(h.task_id).await;
    assert_eq!(user.await.unwrap(), 4);
    assert_eq!(outcome, RunOutcome::Stopped);
    assert_eq!(executor.remaining(), 0);

    let task = h.repo.get_task(h.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);

    let transcript = h.transcript().await;
    let (last_speaker, last_content) = transcript.last().unwrap();
    assert_eq!(last_speaker, "System");
    assert_eq!(last_content, "Task stopped by user.");
    let denials = transcript
        .iter()
        .filter(|(_, c)| c.contains("was denied by user"))
        .count();
    assert_eq!(denials, 3);

    // Exactly one escalation, raised after the third denial
    let guidance: Vec<_> = h
        .notifier
        .events_for(h.task_id)
        .into_iter()
        .filter(|e| matches!(e, crate::events::TaskEvent::RequestInput { tool_name, .. } if tool_name == "system"))
        .collect();
    assert_eq!(guidance.len(), 1);
    let requests = h.notifier.announced_requests(h.task_id);
    let stuck = h.repo.get_interaction(requests[3]).await.unwrap().unwrap();
    assert_eq!(stuck.kind, InteractionKind::AgentStuck);
    assert!(stuck.prompt.contains("You have denied 3 tool actions"));
}

#[tokio::test]
async fn test_denials_batched_in_one_turn_escalate_once() {
    let h = Harness::new("Check the weather in three cities").await;
    let planner = ScriptedModel::texts(&["Call the weather tool for each city. PLAN_COMPLETE"]);
    let executor = ScriptedModel::new(vec![Completion {
        text: "Checking all three cities.".to_string(),
        tool_calls: ["Oslo", "Rome", "Lima"]
            .iter()
            .map(|city| ToolCall {
                id: format!("call_{city}"),
                name: "get_weather".to_string(),
                arguments: json!({"city": city}),
            })
            .collect(),
    }]);
    let orchestrator = h
        .orchestrator(planner, executor, ScriptedModel::texts(&[]), 20)
        .await;

    let user = h.respond_with(vec![
        InteractionResponse::deny(),
        InteractionResponse::deny(),
        InteractionResponse::deny(),
        InteractionResponse::with_values([("guidance", "stop")]),
    ]);
    let outcome = orchestrator.run(h.task_id).await;
    assert_eq!(user.await.unwrap(), 4);
    assert_eq!(outcome, RunOutcome::Stopped);

    let transcript = h.transcript().await;
    let executor_turns: Vec<_> = transcript.iter().filter(|(s, _)| s == "Executor").collect();
    assert_eq!(executor_turns.len(), 1);
    assert_eq!(executor_turns[0].1.matches("was denied by user").count(), 3);

    let requests = h.notifier.announced_requests(h.task_id);
    assert_eq!(requests.len(), 4);
    let stuck = h.repo.get_interaction(requests[3]).await.unwrap().unwrap();
    assert_eq!(stuck.kind, InteractionKind::AgentStuck);
    assert!(stuck.prompt.contains("You have denied 3 tool actions"));
}

#[tokio::test]
async fn test_stuck_signal_guidance_reaches_agents() {
    let h = Harness::new("Summarise the data file").await;
    let planner = ScriptedModel::texts(&[
        "AGENT_STUCK: missing file path",
        "1. Read /tmp/data.csv\n2. Summarise it\nPLAN_COMPLETE",
    ]);
    let executor = ScriptedModel::texts(&["Read the file and wrote the summary. EXECUTION_COMPLETE"]);
    let reviewer = ScriptedModel::texts(&["Summary is accurate. TASK_COMPLETE"]);
    let orchestrator = h
        .orchestrator(planner.clone(), executor, reviewer, 20)
        .await;

    let user = h.respond_with(vec![InteractionResponse::with_values([(
        "guidance",
        "use /tmp/data.csv",
    )])]);
    let outcome = orchestrator.run(h.task_id).await;
    assert_eq!(user.await.unwrap(), 1);
    assert_eq!(outcome, RunOutcome::Completed);

    let transcript = h.transcript().await;
    assert_eq!(transcript[2], ("User".to_string(), "use /tmp/data.csv".to_string()));

    let request_id = h.notifier.announced_requests(h.task_id)[0];
    let request = h.repo.get_interaction(request_id).await.unwrap().unwrap();
    assert!(request
        .prompt
        .contains("Planner reported it cannot proceed: missing file path"));

    // The guidance is visible to the Planner on its next turn
    let second_call = &planner.requests()[1];
    assert!(second_call
        .iter()
        .any(|m| m.role == ChatRole::User && m.content == "use /tmp/data.csv"));
}

#[tokio::test]
async fn test_turn_cap_fails_task() {
    let h = Harness::new("Plan forever").await;
    let planner = ScriptedModel::texts(&[
        "Still refining the first step of the plan.",
        "Still refining the second step of the plan.",
    ]);
    let orchestrator = h
        .orchestrator(planner, ScriptedModel::texts(&[]), ScriptedModel::texts(&[]), 2)
        .await;

    let outcome = orchestrator.run(h.task_id).await;
    assert!(matches!(outcome, RunOutcome::Failed(ref msg) if msg.contains("2 turns")));

    let status = h.repo.task_status(h.task_id).await.unwrap();
    assert_eq!(status, Some(TaskStatus::Failed));
    let (speaker, content) = h.transcript().await.pop().unwrap();
    assert_eq!(speaker, "System");
    assert!(content.starts_with("Error: "));
}

#[tokio::test]
async fn test_model_error_fails_task() {
    let h = Harness::new("Anything").await;
    let orchestrator = h
        .orchestrator(
            ScriptedModel::texts(&[]),
            ScriptedModel::texts(&[]),
            ScriptedModel::texts(&[]),
            10,
        )
        .await;

    let outcome = Arc::new(orchestrator).spawn(h.task_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let transcript = h.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].0, "System");
    assert!(transcript[1].1.contains("script exhausted"));
    assert_eq!(
        h.notifier.statuses(h.task_id).last().map(String::as_str),
        Some("failed")
    );
}

struct PanickingModel;

#[async_trait]
impl ChatModel for PanickingModel {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<Completion, ModelError> {
        panic!("model backend crashed");
    }
}

#[tokio::test]
async fn test_panicking_run_marks_task_failed() {
    let h = Harness::new("Anything").await;
    let model: Arc<dyn ChatModel> = Arc::new(PanickingModel);
    let team = AgentTeam {
        planner: Agent::new(AgentRole::Planner, model.clone()),
        executor: Agent::new(AgentRole::Executor, model.clone()),
        reviewer: Agent::new(AgentRole::Reviewer, model),
    };
    let services = OrchestratorServices {
        repo: h.repo.clone(),
        notifier: h.notifier.clone(),
        broker: h.broker.clone(),
        selector: Arc::new(WorkflowSelector),
    };
    let config = OrchestratorConfig {
        workspace_root: h.temp.path().join("workspace"),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(TaskOrchestrator::new(services, team, config));

    let outcome = orchestrator.spawn(h.task_id).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref msg) if msg.contains("panicked")));

    let status = h.repo.task_status(h.task_id).await.unwrap();
    assert_eq!(status, Some(TaskStatus::Failed));
    let (speaker, content) = h.transcript().await.pop().unwrap();
    assert_eq!(speaker, "System");
    assert!(content.starts_with("Error: Task run aborted"));
    assert_eq!(
        h.notifier.statuses(h.task_id).last().map(String::as_str),
        Some("failed")
    );
}

#[tokio::test]
async fn test_unknown_task_fails_without_panicking() {
    let h = Harness::new("Exists").await;
    let orchestrator = h
        .orchestrator(
            ScriptedModel::texts(&[]),
            ScriptedModel::texts(&[]),
            ScriptedModel::texts(&[]),
            10,
        )
        .await;
    let outcome = orchestrator.run(h.task_id + 100).await;
    assert!(matches!(outcome, RunOutcome::Failed(ref msg) if msg.contains("not found")));
}
