//! Task orchestrator: the Planner / Executor / Reviewer conversation loop.
//!
//! One `run` drives one task from PLANNING to COMPLETED or FAILED:
//!
//! ```text
//!  select speaker ─► take turn ─► persist + notify ─► phase markers
//!        ▲                                               │
//!        └──── inject guidance ◄── stuck detector ◄──────┘
//! ```
//!
//! Tool calls inside a turn may suspend on the interaction broker; so may the
//! stuck detector's escalations. A user stop is observed at the top of the
//! next iteration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::task::JoinHandle;

use super::artifacts::collect_artifacts;
use super::participant::{Agent, TranscriptEntry};
use super::roles::AgentRole;
use super::selector::SpeakerSelector;
use super::stuck::{is_stop_request, Escalation, StuckDetector};
use crate::ai::ChatModel;
use crate::constants::{agents, interaction, markers, workflow};
use crate::events::Notifier;
use crate::interaction::InteractionBroker;
use crate::paths;
use crate::storage::{TaskOutputs, TaskRepository, TaskStatus};
use crate::tools::{ToolContext, ToolRegistry};

const STOPPED_MESSAGE: &str = "Task stopped by user.";

/// Configuration shared by every run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_turns: usize,
    /// Parent of the per-task `task_<id>` workspaces
    pub workspace_root: PathBuf,
    pub guidance_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: workflow::DEFAULT_MAX_TURNS,
            workspace_root: PathBuf::from("workspace"),
            guidance_timeout: interaction::GUIDANCE_TIMEOUT,
        }
    }
}

/// Shared services the orchestrator needs
pub struct OrchestratorServices {
    pub repo: Arc<dyn TaskRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub broker: Arc<InteractionBroker>,
    pub selector: Arc<dyn SpeakerSelector>,
}

pub struct AgentTeam {
    pub planner: Agent,
    pub executor: Agent,
    pub reviewer: Agent,
}

impl AgentTeam {
    /// Three agents on one model; only the Executor gets tools
    pub fn new(model: Arc<dyn ChatModel>, executor_tools: Arc<ToolRegistry>) -> Self {
        Self {
            planner: Agent::new(AgentRole::Planner, model.clone()),
            executor: Agent::new(AgentRole::Executor, model.clone()).with_tools(executor_tools),
            reviewer: Agent::new(AgentRole::Reviewer, model),
        }
    }

    pub fn agent(&self, role: AgentRole) -> &Agent {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Executor => &self.executor,
            AgentRole::Reviewer => &self.reviewer,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The user asked to stop during an escalation
    Stopped,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Executing,
    Reviewing,
}

/// Per-run mutable state
struct RunState {
    task_id: i64,
    transcript: Vec<TranscriptEntry>,
    detector: StuckDetector,
    phase: Phase,
    plan: Vec<String>,
    execution: Vec<String>,
    review: Vec<String>,
}

pub struct TaskOrchestrator {
    services: OrchestratorServices,
    team: AgentTeam,
    config: OrchestratorConfig,
}

impl TaskOrchestrator {
    pub fn new(services: OrchestratorServices, team: AgentTeam, config: OrchestratorConfig) -> Self {
        Self {
            services,
            team,
            config,
        }
    }

    /// Run the task in the background
    ///
    /// A panic inside the run still leaves the task FAILED.
    pub fn spawn(self: &Arc<Self>, task_id: i64) -> JoinHandle<RunOutcome> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let runner = Arc::clone(&orchestrator);
            match tokio::spawn(async move { runner.run(task_id).await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(task_id, error = %e, "Task run aborted");
                    let message = format!("Task run aborted: {e}");
                    orchestrator
                        .finish_failed(task_id, &format!("Error: {message}"))
                        .await;
                    RunOutcome::Failed(message)
                }
            }
        })
    }

    /// Drive a task to a terminal status
    ///
    /// Never returns an error: failures mark the task FAILED with a System
    /// message describing the cause.
    pub async fn run(&self, task_id: i64) -> RunOutcome {
        tracing::info!(task_id, "Task run started");
        match self.run_inner(task_id).await {
            Ok(outcome) => {
                tracing::info!(task_id, outcome = ?outcome, "Task run finished");
                outcome
            }
            Err(e) => {
                tracing::error!(task_id, error = %e, "Task run failed");
                self.finish_failed(task_id, &format!("Error: {e}")).await;
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_inner(&self, task_id: i64) -> Result<RunOutcome> {
        let task = self
            .services
            .repo
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))?;

        self.set_status(task_id, TaskStatus::Planning).await?;

        let workspace = paths::task_workspace(&self.config.workspace_root, task_id);
        let ctx = ToolContext::for_task(task_id, workspace.clone());

        let mut state = RunState {
            task_id,
            transcript: Vec::new(),
            detector: StuckDetector::new(),
            phase: Phase::Planning,
            plan: Vec::new(),
            execution: Vec::new(),
            review: Vec::new(),
        };

        let opening = format!(
            "## Task Objective\n\nTask ID: {}\n\n{}\n\nPlease begin by creating a detailed plan to accomplish this objective.",
            task_id, task.objective
        );
        self.record(&mut state, agents::USER, opening).await?;

        let mut turns = 0;
        loop {
            if state.detector.is_cancelled() {
                self.finish_failed(task_id, STOPPED_MESSAGE).await;
                return Ok(RunOutcome::Stopped);
            }
            if turns >= self.config.max_turns {
                return Err(anyhow!(
                    "Conversation reached {} turns without completion",
                    self.config.max_turns
                ));
            }
            turns += 1;

            let role = self.services.selector.select(&state.transcript).await;
            tracing::debug!(task_id, turn = turns, agent = role.name(), "Selected speaker");
            let turn = self
                .team
                .agent(role)
                .take_turn(&state.transcript, &ctx)
                .await?;
            let text = turn.message.clone();
            self.record(&mut state, role.name(), text.clone()).await?;
            self.track_phase(&mut state, role, &text).await?;

            let escalations = state
                .detector
                .observe_turn(role.name(), &text, &turn.tool_outputs());
            tracing::debug!(
                task_id,
                agent = role.name(),
                denials = state.detector.tool_denial_count(),
                errors = state.detector.consecutive_error_count(),
                revisions = state.detector.revision_count(),
                empty = state.detector.empty_message_count(),
                "Stuck counters"
            );
            for escalation in escalations {
                if state.detector.is_cancelled() {
                    break;
                }
                self.escalate(&mut state, escalation).await?;
            }

            if role == AgentRole::Reviewer
                && text.contains(markers::TASK_COMPLETE)
                && !state.detector.is_cancelled()
            {
                self.complete(&state, &workspace).await?;
                return Ok(RunOutcome::Completed);
            }
        }
    }

    /// Append to the log, notify observers, and extend the transcript
    async fn record(&self, state: &mut RunState, speaker: &str, content: String) -> Result<()> {
        self.services
            .repo
            .append_message(state.task_id, speaker, &content)
            .await?;
        self.services
            .notifier
            .notify_message(state.task_id, speaker, &content);
        state.transcript.push(TranscriptEntry::new(speaker, content));
        Ok(())
    }

    async fn track_phase(&self, state: &mut RunState, role: AgentRole, text: &str) -> Result<()> {
        match role {
            AgentRole::Planner => {
                state.plan.push(text.to_string());
                if text.contains(markers::PLAN_COMPLETE) && state.phase == Phase::Planning {
                    state.phase = Phase::Executing;
                    self.set_status(state.task_id, TaskStatus::Executing).await?;
                }
            }
            AgentRole::Executor => {
                state.execution.push(text.to_string());
                if text.contains(markers::EXECUTION_COMPLETE) && state.phase == Phase::Executing {
                    state.phase = Phase::Reviewing;
                    self.set_status(state.task_id, TaskStatus::Reviewing).await?;
                }
            }
            AgentRole::Reviewer => state.review.push(text.to_string()),
        }
        Ok(())
    }

    async fn escalate(&self, state: &mut RunState, escalation: Escalation) -> Result<()> {
        tracing::info!(
            task_id = state.task_id,
            kind = ?escalation.kind,
            reason = %escalation.reason,
            "Escalating to user"
        );
        let guidance = self
            .services
            .broker
            .request_guidance(
                state.task_id,
                &escalation.reason,
                &escalation.context,
                &[],
                self.config.guidance_timeout,
            )
            .await?;

        if is_stop_request(&guidance) {
            state.detector.cancel();
        } else {
            self.record(state, agents::USER, guidance).await?;
        }
        Ok(())
    }

    async fn complete(&self, state: &RunState, workspace: &std::path::Path) -> Result<()> {
        let outputs = TaskOutputs {
            plan: state.plan.join("\n\n"),
            execution_result: state.execution.join("\n\n"),
            review_result: state.review.join("\n\n"),
        };
        self.services
            .repo
            .save_outputs(state.task_id, &outputs)
            .await?;

        for artifact in collect_artifacts(workspace).await? {
            self.services
                .repo
                .register_artifact(state.task_id, &artifact)
                .await?;
        }

        self.set_status(state.task_id, TaskStatus::Completed).await
    }

    async fn set_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        self.services.repo.set_task_status(task_id, status).await?;
        self.services.notifier.notify_status(task_id, status);
        Ok(())
    }

    /// Mark FAILED and explain why; errors here are only logged
    async fn finish_failed(&self, task_id: i64, message: &str) {
        if let Err(e) = self
            .services
            .repo
            .set_task_status(task_id, TaskStatus::Failed)
            .await
        {
            tracing::error!(task_id, error = %e, "Failed to mark task failed");
        }
        if let Err(e) = self
            .services
            .repo
            .append_message(task_id, agents::SYSTEM, message)
            .await
        {
            tracing::error!(task_id, error = %e, "Failed to save system message");
        }
        self.services
            .notifier
            .notify_status(task_id, TaskStatus::Failed);
        self.services
            .notifier
            .notify_message(task_id, agents::SYSTEM, message);
    }
}
