//! Interaction broker
//!
//! Suspends a task's run until a human answers a persisted request, then
//! resumes exactly that waiter. Every wait is a single-slot rendezvous
//! bounded by a timeout, and every timeout resolves to the fail-safe answer:
//! confirmation is denied, input is absent, guidance is "cancel".
//!
//! Waiters live in memory only. A response that arrives after a restart (or
//! after the wait gave up) still updates the row but resumes nobody.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::config::InteractionSettings;
use crate::constants::interaction::{
    CANCEL_SENTINEL, CONFIRMATION_TIMEOUT, GUIDANCE_TIMEOUT, INPUT_TIMEOUT, SYSTEM_TOOL_NAME,
};
use crate::events::Notifier;
use crate::storage::{
    FieldSpec, InteractionKind, InteractionResponse, InteractionStatus, NewInteraction,
    RespondOutcome, TaskRepository, TaskStatus,
};

/// Default wait limits per request kind
#[derive(Debug, Clone, Copy)]
pub struct BrokerTimeouts {
    pub input: Duration,
    pub confirmation: Duration,
    pub guidance: Duration,
}

impl Default for BrokerTimeouts {
    fn default() -> Self {
        Self {
            input: INPUT_TIMEOUT,
            confirmation: CONFIRMATION_TIMEOUT,
            guidance: GUIDANCE_TIMEOUT,
        }
    }
}

impl From<&InteractionSettings> for BrokerTimeouts {
    fn from(settings: &InteractionSettings) -> Self {
        Self {
            input: settings.input_timeout(),
            confirmation: settings.confirmation_timeout(),
            guidance: settings.guidance_timeout(),
        }
    }
}

/// What came back from `request_input`
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Provided(BTreeMap<String, Value>),
    Cancelled,
    TimedOut,
}

/// What `resolve` did with a submitted response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Persisted and handed to the blocked waiter
    Resumed,
    /// Persisted, but no waiter was registered for the request
    Orphaned,
    /// The request had already been answered or expired; nothing changed
    AlreadyResolved,
    /// No such request
    Unknown,
}

/// How a new request is announced to observers once it has an id
enum Announcement {
    Input {
        fields: Vec<FieldSpec>,
    },
    Confirmation {
        description: String,
        parameters: BTreeMap<String, String>,
    },
}

pub struct InteractionBroker {
    repo: Arc<dyn TaskRepository>,
    notifier: Arc<dyn Notifier>,
    waiters: DashMap<i64, oneshot::Sender<InteractionResponse>>,
    /// Status to restore per task once its outstanding wait resolves
    status_before: DashMap<i64, TaskStatus>,
    timeouts: BrokerTimeouts,
}

impl InteractionBroker {
    pub fn new(repo: Arc<dyn TaskRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repo,
            notifier,
            waiters: DashMap::new(),
            status_before: DashMap::new(),
            timeouts: BrokerTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: BrokerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> BrokerTimeouts {
        self.timeouts
    }

    /// Number of waits currently blocked
    pub fn waiting_count(&self) -> usize {
        self.waiters.len()
    }

    /// Ask the user for values of `fields`
    pub async fn request_input(
        &self,
        task_id: i64,
        tool_name: &str,
        prompt: &str,
        fields: Vec<FieldSpec>,
        timeout: Duration,
    ) -> Result<InputOutcome> {
        let new = NewInteraction {
            task_id,
            kind: InteractionKind::InputNeeded,
            tool_name: tool_name.to_string(),
            prompt: prompt.to_string(),
            fields: Some(fields.clone()),
            preview: None,
        };
        let response = self
            .suspend(new, Announcement::Input { fields }, timeout)
            .await?;

        Ok(match response {
            None => InputOutcome::TimedOut,
            Some(r) if r.cancelled => InputOutcome::Cancelled,
            Some(r) => InputOutcome::Provided(r.values.unwrap_or_default()),
        })
    }

    /// Ask the user to approve an action; anything but an explicit yes is a no
    pub async fn request_confirmation(
        &self,
        task_id: i64,
        tool_name: &str,
        description: &str,
        parameters: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<bool> {
        let new = NewInteraction {
            task_id,
            kind: InteractionKind::Confirmation,
            tool_name: tool_name.to_string(),
            prompt: description.to_string(),
            fields: None,
            preview: Some(json!({
                "tool": tool_name,
                "description": description,
                "parameters": parameters,
            })),
        };
        let announcement = Announcement::Confirmation {
            description: description.to_string(),
            parameters,
        };
        let response = self.suspend(new, announcement, timeout).await?;

        Ok(response.is_some_and(|r| !r.cancelled && r.confirmed == Some(true)))
    }

    /// Ask the user how a stuck workflow should continue
    ///
    /// Returns the guidance text, or `"cancel"` when the user cancelled, sent
    /// nothing usable, or did not answer in time.
    pub async fn request_guidance(
        &self,
        task_id: i64,
        reason: &str,
        context: &str,
        options: &[String],
        timeout: Duration,
    ) -> Result<String> {
        let fields = vec![FieldSpec::new(
            "guidance",
            "What should the agent do?",
            "textarea",
        )];
        let new = NewInteraction {
            task_id,
            kind: InteractionKind::AgentStuck,
            tool_name: SYSTEM_TOOL_NAME.to_string(),
            prompt: format!("**Agent needs help**\n\n**Reason:** {reason}\n\n**Context:** {context}"),
            fields: Some(fields.clone()),
            preview: Some(json!({
                "reason": reason,
                "context": context,
                "options": options,
            })),
        };
        let response = self
            .suspend(new, Announcement::Input { fields }, timeout)
            .await?;

        let guidance = response
            .filter(|r| !r.cancelled)
            .and_then(|r| r.value_text("guidance"))
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        Ok(guidance.unwrap_or_else(|| CANCEL_SENTINEL.to_string()))
    }

    /// Ask the user to pick one of `options`
    ///
    /// `None` on timeout, cancellation, or an answer outside `options`.
    pub async fn request_choice(
        &self,
        task_id: i64,
        tool_name: &str,
        prompt: &str,
        options: Vec<String>,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut field = FieldSpec::new("choice", prompt, "select");
        field.default = options.first().cloned();
        let fields = vec![field];
        let new = NewInteraction {
            task_id,
            kind: InteractionKind::Choice,
            tool_name: tool_name.to_string(),
            prompt: prompt.to_string(),
            fields: Some(fields.clone()),
            preview: Some(json!({ "options": options })),
        };
        let response = self
            .suspend(new, Announcement::Input { fields }, timeout)
            .await?;

        Ok(response
            .filter(|r| !r.cancelled)
            .and_then(|r| r.value_text("choice"))
            .filter(|choice| options.contains(choice)))
    }

    /// Record a user's response and wake the matching waiter, if any
    pub async fn resolve(
        &self,
        request_id: i64,
        response: InteractionResponse,
    ) -> Result<ResolveOutcome> {
        match self
            .repo
            .respond_to_interaction(request_id, &response)
            .await?
        {
            RespondOutcome::NotFound => {
                tracing::debug!(request_id, "Response for unknown interaction request");
                Ok(ResolveOutcome::Unknown)
            }
            RespondOutcome::AlreadyResolved => {
                tracing::info!(request_id, "Interaction request already resolved");
                Ok(ResolveOutcome::AlreadyResolved)
            }
            RespondOutcome::Recorded => {
                let resumed = self
                    .waiters
                    .remove(&request_id)
                    .is_some_and(|(_, tx)| tx.send(response).is_ok());
                if resumed {
                    Ok(ResolveOutcome::Resumed)
                } else {
                    tracing::warn!(request_id, "No waiter for interaction response");
                    Ok(ResolveOutcome::Orphaned)
                }
            }
        }
    }

    async fn suspend(
        &self,
        new: NewInteraction,
        announcement: Announcement,
        timeout: Duration,
    ) -> Result<Option<InteractionResponse>> {
        let task_id = new.task_id;
        self.snapshot_status(task_id).await?;
        let result = self.wait_for_response(new, announcement, timeout).await;
        self.restore_status(task_id).await;
        result
    }

    async fn snapshot_status(&self, task_id: i64) -> Result<()> {
        if self.status_before.contains_key(&task_id) {
            return Ok(());
        }
        if let Some(status) = self.repo.task_status(task_id).await? {
            let status = match status {
                TaskStatus::AwaitingInput => TaskStatus::Executing,
                other => other,
            };
            self.status_before.entry(task_id).or_insert(status);
        }
        Ok(())
    }

    async fn restore_status(&self, task_id: i64) {
        let previous = self
            .status_before
            .remove(&task_id)
            .map(|(_, status)| status)
            .unwrap_or(TaskStatus::Executing);

        if let Err(e) = self.repo.set_task_status(task_id, previous).await {
            tracing::error!(task_id, error = %e, "Failed to restore task status");
        }
        self.notifier.notify_status(task_id, previous);
    }

    async fn wait_for_response(
        &self,
        new: NewInteraction,
        announcement: Announcement,
        timeout: Duration,
    ) -> Result<Option<InteractionResponse>> {
        let task_id = new.task_id;
        let request_id = self.repo.create_interaction(&new).await?;

        // Registered before anyone can learn the id, so no response is missed
        let (tx, mut rx) = oneshot::channel();
        self.waiters.insert(request_id, tx);

        if let Err(e) = self
            .repo
            .set_task_status(task_id, TaskStatus::AwaitingInput)
            .await
        {
            self.waiters.remove(&request_id);
            return Err(e);
        }
        self.notifier
            .notify_status(task_id, TaskStatus::AwaitingInput);
        self.announce(task_id, request_id, &new, announcement);

        tracing::info!(
            task_id,
            request_id,
            kind = %new.kind,
            tool = %new.tool_name,
            "Waiting for user response"
        );

        let response = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) => None,
            Err(_) => {
                self.waiters.remove(&request_id);
                // A resolve may have landed between the deadline and removal
                match rx.try_recv() {
                    Ok(response) => Some(response),
                    Err(_) => self.expire_or_recover(task_id, request_id).await,
                }
            }
        };
        self.waiters.remove(&request_id);
        Ok(response)
    }

    /// Expire a timed-out request. A response persisted after the waiter
    /// was removed is read back from the row instead of being discarded.
    async fn expire_or_recover(&self, task_id: i64, request_id: i64) -> Option<InteractionResponse> {
        match self.repo.expire_interaction(request_id).await {
            Ok(true) => {
                tracing::warn!(task_id, request_id, "Interaction request timed out");
                None
            }
            Ok(false) => match self.repo.get_interaction(request_id).await {
                Ok(Some(row)) if row.status == InteractionStatus::Responded => {
                    tracing::info!(task_id, request_id, "Response persisted at the deadline");
                    row.response
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(request_id, error = %e, "Failed to re-read request");
                    None
                }
            },
            Err(e) => {
                tracing::error!(request_id, error = %e, "Failed to expire request");
                None
            }
        }
    }

    fn announce(
        &self,
        task_id: i64,
        request_id: i64,
        new: &NewInteraction,
        announcement: Announcement,
    ) {
        match announcement {
            Announcement::Input { fields } => self.notifier.notify_input_request(
                task_id,
                request_id,
                &new.tool_name,
                &new.prompt,
                &fields,
            ),
            Announcement::Confirmation {
                description,
                parameters,
            } => self.notifier.notify_confirmation_request(
                task_id,
                request_id,
                &new.tool_name,
                &description,
                &parameters,
            ),
        }
    }
}
