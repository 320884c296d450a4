//! Shared test doubles

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::ai::{ChatMessage, ChatModel, Completion, ModelError, ToolDefinition};
use crate::events::{Notifier, TaskEvent};
use crate::storage::SqliteRepository;

/// Captures every published event
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(i64, TaskEvent)>>,
}

impl RecordingNotifier {
    pub fn events_for(&self, task_id: i64) -> Vec<TaskEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == task_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn statuses(&self, task_id: i64) -> Vec<String> {
        self.events_for(task_id)
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::StatusUpdate { status } => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Request ids announced so far, in order
    pub fn announced_requests(&self, task_id: i64) -> Vec<i64> {
        self.events_for(task_id)
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::RequestInput { request_id, .. }
                | TaskEvent::RequestConfirmation { request_id, .. } => Some(request_id),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, task_id: i64, event: TaskEvent) {
        self.events.lock().push((task_id, event));
    }
}

pub fn repository(dir: &Path) -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::new(dir.join("test.db")).expect("Failed to create repository"))
}

/// Replays canned completions in order and records every request
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            tool_names: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Completion::text(*r)).collect())
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }

    pub fn tool_names_seen(&self) -> Vec<Vec<String>> {
        self.tool_names.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Completion, ModelError> {
        self.requests.lock().push(messages.to_vec());
        self.tool_names
            .lock()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::Malformed("script exhausted".into()))
    }
}
