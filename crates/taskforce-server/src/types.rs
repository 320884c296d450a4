//! Request and response types for the API

use serde::{Deserialize, Serialize};
use serde_json::Value;

use taskforce_core::storage::{
    AgentMessage, FieldSpec, InteractionRequest, TaskArtifact, TaskRecord,
};
use taskforce_core::ResolveOutcome;

// ============================================================================
// Task Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub objective: String,
}

#[derive(Serialize)]
pub struct CreateTaskResponse {
    pub task_id: i64,
    pub status: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub agent_name: String,
    pub content: String,
    pub created_at: String,
}

impl From<AgentMessage> for MessageResponse {
    fn from(m: AgentMessage) -> Self {
        Self {
            id: m.id,
            agent_name: m.agent_name,
            content: m.content,
            created_at: m.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct TaskDetailResponse {
    pub id: i64,
    pub objective: String,
    pub status: String,
    pub plan: Option<String>,
    pub execution_result: Option<String>,
    pub review_result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub messages: Vec<MessageResponse>,
    pub files: Vec<TaskArtifact>,
}

impl TaskDetailResponse {
    pub fn new(task: TaskRecord, messages: Vec<AgentMessage>, files: Vec<TaskArtifact>) -> Self {
        Self {
            id: task.id,
            objective: task.objective,
            status: task.status.to_string(),
            plan: task.plan,
            execution_result: task.execution_result,
            review_result: task.review_result,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
            messages: messages.into_iter().map(Into::into).collect(),
            files,
        }
    }
}

// ============================================================================
// Interaction Types
// ============================================================================

#[derive(Serialize)]
pub struct PendingInteractionResponse {
    pub pending: bool,
    #[serde(flatten)]
    pub request: Option<PendingRequest>,
}

#[derive(Serialize)]
pub struct PendingRequest {
    pub request_id: i64,
    pub interaction_type: String,
    pub tool_name: String,
    pub prompt_message: String,
    pub fields: Option<Vec<FieldSpec>>,
    pub preview: Option<Value>,
}

impl From<Option<InteractionRequest>> for PendingInteractionResponse {
    fn from(request: Option<InteractionRequest>) -> Self {
        Self {
            pending: request.is_some(),
            request: request.map(|r| PendingRequest {
                request_id: r.id,
                interaction_type: r.kind.to_string(),
                tool_name: r.tool_name,
                prompt_message: r.prompt,
                fields: r.fields,
                preview: r.preview,
            }),
        }
    }
}

#[derive(Serialize)]
pub struct RespondResponse {
    pub success: bool,
    /// `resumed` when a waiting tool call was unblocked, `orphaned` when the
    /// answer was recorded but nothing was waiting for it
    pub outcome: &'static str,
}

impl RespondResponse {
    pub fn from_outcome(outcome: ResolveOutcome) -> Self {
        Self {
            success: true,
            outcome: match outcome {
                ResolveOutcome::Resumed => "resumed",
                _ => "orphaned",
            },
        }
    }
}
