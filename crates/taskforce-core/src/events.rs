//! Push-notification protocol for task observers.
//!
//! `TaskEvent` is everything a running task tells the outside world. Delivery
//! is best-effort: publishing never blocks and never fails the caller.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::storage::{FieldSpec, TaskStatus};

/// Buffered events per task before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    StatusUpdate {
        status: String,
    },
    AgentMessage {
        agent_name: String,
        content: String,
    },
    RequestInput {
        request_id: i64,
        tool_name: String,
        prompt: String,
        fields: Vec<FieldSpec>,
    },
    RequestConfirmation {
        request_id: i64,
        tool_name: String,
        description: String,
        parameters: BTreeMap<String, String>,
    },
}

/// Sink for task events
pub trait Notifier: Send + Sync {
    fn publish(&self, task_id: i64, event: TaskEvent);

    fn notify_status(&self, task_id: i64, status: TaskStatus) {
        self.publish(
            task_id,
            TaskEvent::StatusUpdate {
                status: status.to_string(),
            },
        );
    }

    fn notify_message(&self, task_id: i64, agent_name: &str, content: &str) {
        self.publish(
            task_id,
            TaskEvent::AgentMessage {
                agent_name: agent_name.to_string(),
                content: content.to_string(),
            },
        );
    }

    fn notify_input_request(
        &self,
        task_id: i64,
        request_id: i64,
        tool_name: &str,
        prompt: &str,
        fields: &[FieldSpec],
    ) {
        self.publish(
            task_id,
            TaskEvent::RequestInput {
                request_id,
                tool_name: tool_name.to_string(),
                prompt: prompt.to_string(),
                fields: fields.to_vec(),
            },
        );
    }

    fn notify_confirmation_request(
        &self,
        task_id: i64,
        request_id: i64,
        tool_name: &str,
        description: &str,
        parameters: &BTreeMap<String, String>,
    ) {
        self.publish(
            task_id,
            TaskEvent::RequestConfirmation {
                request_id,
                tool_name: tool_name.to_string(),
                description: description.to_string(),
                parameters: parameters.clone(),
            },
        );
    }
}

/// Fan-out hub: one broadcast channel per task with live subscribers
#[derive(Default)]
pub struct EventHub {
    channels: DashMap<i64, broadcast::Sender<TaskEvent>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, task_id: i64) -> broadcast::Receiver<TaskEvent> {
        self.channels
            .entry(task_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, task_id: i64) -> usize {
        self.channels
            .get(&task_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Notifier for EventHub {
    fn publish(&self, task_id: i64, event: TaskEvent) {
        let Some(tx) = self.channels.get(&task_id).map(|tx| tx.clone()) else {
            return;
        };
        if tx.send(event).is_err() {
            // Every receiver is gone
            self.channels
                .remove_if(&task_id, |_, tx| tx.receiver_count() == 0);
        }
    }
}
