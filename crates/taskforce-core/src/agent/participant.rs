//! A single conversational agent

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::roles::AgentRole;
use crate::ai::{ChatMessage, ChatModel};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

/// One utterance in the shared conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
        }
    }
}

/// What one turn produced
#[derive(Debug, Clone)]
pub struct TurnOutput {
    /// The transcript message: model text followed by each tool result
    pub message: String,
    /// Results of the turn's tool calls, in call order
    pub tool_results: Vec<ToolResult>,
}

impl TurnOutput {
    pub fn tool_outputs(&self) -> Vec<&str> {
        self.tool_results.iter().map(|r| r.output.as_str()).collect()
    }
}

pub struct Agent {
    role: AgentRole,
    model: Arc<dyn ChatModel>,
    tools: Option<Arc<ToolRegistry>>,
}

impl Agent {
    pub fn new(role: AgentRole, model: Arc<dyn ChatModel>) -> Self {
        Self {
            role,
            model,
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    fn build_messages(&self, transcript: &[TranscriptEntry]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(self.role.system_prompt()));
        for entry in transcript {
            let message = if entry.speaker == self.role.name() {
                ChatMessage::assistant(&entry.content)
            } else {
                ChatMessage::user(&entry.content).with_name(&entry.speaker)
            };
            messages.push(message);
        }
        messages
    }

    /// Produce this agent's next message
    ///
    /// Tool calls are executed through the registry and the message becomes
    /// the model's text followed by each tool result, one per line.
    pub async fn take_turn(
        &self,
        transcript: &[TranscriptEntry],
        ctx: &ToolContext,
    ) -> Result<TurnOutput> {
        let messages = self.build_messages(transcript);
        let definitions = match &self.tools {
            Some(registry) => registry.definitions().await,
            None => Vec::new(),
        };

        let completion = self.model.complete(&messages, &definitions).await?;

        let Some(registry) = self.tools.as_ref().filter(|_| !completion.tool_calls.is_empty())
        else {
            return Ok(TurnOutput {
                message: completion.text,
                tool_results: Vec::new(),
            });
        };

        let mut tool_results = Vec::with_capacity(completion.tool_calls.len());
        for call in &completion.tool_calls {
            tracing::info!(agent = self.role.name(), tool = %call.name, "Agent requested tool");
            let result = registry
                .execute(&call.name, call.arguments.clone(), ctx)
                .await
                .unwrap_or_else(|| ToolResult::error(format!("Unknown tool: {}", call.name)));
            tool_results.push(result);
        }

        let mut parts = Vec::with_capacity(tool_results.len() + 1);
        if !completion.text.trim().is_empty() {
            parts.push(completion.text.as_str());
        }
        parts.extend(tool_results.iter().map(|r| r.output.as_str()));
        Ok(TurnOutput {
            message: parts.join("\n"),
            tool_results,
        })
    }
}
