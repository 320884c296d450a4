//! Speaker selection
//!
//! Planner first, then Executor, then Reviewer; the Reviewer hands control
//! back to the Executor until it approves.

use std::sync::Arc;

use async_trait::async_trait;

use super::participant::TranscriptEntry;
use super::roles::{AgentRole, SELECTOR_PROMPT};
use crate::ai::{ChatMessage, ChatModel};
use crate::constants::markers;

#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    async fn select(&self, transcript: &[TranscriptEntry]) -> AgentRole;
}

/// The most recent message from one of the three agents
fn last_agent_message(transcript: &[TranscriptEntry]) -> Option<(AgentRole, &str)> {
    transcript.iter().rev().find_map(|entry| {
        AgentRole::from_name(&entry.speaker).map(|role| (role, entry.content.as_str()))
    })
}

/// Deterministic workflow rule driven by phase markers
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowSelector;

impl WorkflowSelector {
    pub fn next_speaker(transcript: &[TranscriptEntry]) -> AgentRole {
        match last_agent_message(transcript) {
            None => AgentRole::Planner,
            Some((AgentRole::Planner, text)) if text.contains(markers::PLAN_COMPLETE) => {
                AgentRole::Executor
            }
            Some((AgentRole::Planner, _)) => AgentRole::Planner,
            Some((AgentRole::Executor, text)) if text.contains(markers::EXECUTION_COMPLETE) => {
                AgentRole::Reviewer
            }
            Some((AgentRole::Executor, _)) => AgentRole::Executor,
            Some((AgentRole::Reviewer, _)) => AgentRole::Executor,
        }
    }
}

#[async_trait]
impl SpeakerSelector for WorkflowSelector {
    async fn select(&self, transcript: &[TranscriptEntry]) -> AgentRole {
        Self::next_speaker(transcript)
    }
}

/// Asks the model who speaks next, falling back to the workflow rule
pub struct ModelSelector {
    model: Arc<dyn ChatModel>,
}

impl ModelSelector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

/// The role named earliest in `reply`
fn parse_role(reply: &str) -> Option<AgentRole> {
    let lower = reply.to_lowercase();
    AgentRole::ALL
        .into_iter()
        .filter_map(|role| {
            lower
                .find(&role.name().to_lowercase())
                .map(|pos| (pos, role))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, role)| role)
}

fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|entry| format!("{}: {}", entry.speaker, entry.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl SpeakerSelector for ModelSelector {
    async fn select(&self, transcript: &[TranscriptEntry]) -> AgentRole {
        let fallback = WorkflowSelector::next_speaker(transcript);
        if last_agent_message(transcript).is_none() {
            return fallback;
        }

        let messages = vec![
            ChatMessage::system(SELECTOR_PROMPT),
            ChatMessage::user(format!(
                "Conversation so far:\n\n{}\n\nReply with only the name of the next speaker: Planner, Executor, or Reviewer.",
                render_transcript(transcript)
            )),
        ];

        match self.model.complete(&messages, &[]).await {
            Ok(completion) => parse_role(&completion.text).unwrap_or_else(|| {
                tracing::debug!(reply = %completion.text, "Unparseable speaker selection");
                fallback
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Speaker selection failed, using workflow rule");
                fallback
            }
        }
    }
}
