//! Confirmed-tool adapter
//!
//! Wraps a tool so that, inside a task run, nothing executes until the user
//! has supplied any missing inputs and approved the final arguments.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::registry::{Tool, ToolContext, ToolRegistry, ToolResult, DEFAULT_TOOL_TIMEOUT};
use crate::constants::interaction::PARAM_PREVIEW_MAX_CHARS;
use crate::interaction::{InputOutcome, InteractionBroker};
use crate::storage::FieldSpec;

/// What a tool needs from the user before it may run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInputSpec {
    ConfirmOnly,
    /// Values the user must supply when the call leaves them empty
    NeedsInput(Vec<FieldSpec>),
}

/// Static input requirements by tool name; unlisted tools are confirm-only
pub fn tool_input_spec(tool_name: &str) -> ToolInputSpec {
    match tool_name {
        "send_email" => ToolInputSpec::NeedsInput(vec![
            FieldSpec::new("to_address", "Recipient Email", "email"),
            FieldSpec::new("subject", "Subject", "text"),
            FieldSpec::new("body", "Email Body", "textarea"),
        ]),
        "browser_fill_form" => ToolInputSpec::NeedsInput(vec![
            FieldSpec::new("selector", "CSS Selector", "text"),
            FieldSpec::new("value", "Value to Fill", "text"),
        ]),
        _ => ToolInputSpec::ConfirmOnly,
    }
}

pub fn denied_message(tool_name: &str) -> String {
    format!(
        "Tool {tool_name} was denied by user. Please adjust your approach or try a different tool."
    )
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Each argument rendered as text and cut to the preview limit
fn parameter_summary(args: &Map<String, Value>) -> BTreeMap<String, String> {
    args.iter()
        .filter(|(k, _)| k.as_str() != "task_id")
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text.chars().take(PARAM_PREVIEW_MAX_CHARS).collect())
        })
        .collect()
}

pub struct ConfirmedTool {
    inner: Arc<dyn Tool>,
    spec: ToolInputSpec,
    broker: Arc<InteractionBroker>,
    tool_timeout: Duration,
}

impl ConfirmedTool {
    pub fn new(inner: Arc<dyn Tool>, broker: Arc<InteractionBroker>) -> Self {
        let spec = tool_input_spec(inner.name());
        Self {
            inner,
            spec,
            broker,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    async fn run_inner(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let timeout = ctx.timeout.unwrap_or(self.tool_timeout);
        match tokio::time::timeout(timeout, self.inner.execute(params, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(tool = self.inner.name(), "Tool execution timed out");
                ToolResult::error(format!(
                    "Tool '{}' timed out after {} seconds",
                    self.inner.name(),
                    timeout.as_secs()
                ))
            }
        }
    }

    /// Fill missing declared fields from the user; `Err` carries the early result
    async fn collect_input(
        &self,
        task_id: i64,
        args: &mut Map<String, Value>,
    ) -> Result<(), ToolResult> {
        let ToolInputSpec::NeedsInput(fields) = &self.spec else {
            return Ok(());
        };
        let missing: Vec<FieldSpec> = fields
            .iter()
            .filter(|f| !is_truthy(args.get(&f.name)))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let name = self.inner.name();
        let prompt =
            format!("The agent wants to use **{name}**. Please provide the required information:");
        let outcome = self
            .broker
            .request_input(task_id, name, &prompt, missing, self.broker.timeouts().input)
            .await
            .map_err(|e| ToolResult::error(format!("Failed to request input for {name}: {e}")))?;

        match outcome {
            InputOutcome::TimedOut => Err(ToolResult::failure(format!(
                "Tool {name} cancelled: user did not respond in time."
            ))),
            InputOutcome::Cancelled => {
                Err(ToolResult::failure(format!("Tool {name} cancelled by user.")))
            }
            InputOutcome::Provided(values) => {
                for (key, value) in values {
                    if fields.iter().any(|f| f.name == key) {
                        args.insert(key, value);
                    }
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Tool for ConfirmedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    fn waits_for_user(&self) -> bool {
        true
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let Some(task_id) = ctx.task_id else {
            return self.run_inner(params, ctx).await;
        };
        let name = self.inner.name();

        let mut args = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return ToolResult::error(format!("Invalid parameters: expected object, got {other}")),
        };

        if let Err(early) = self.collect_input(task_id, &mut args).await {
            return early;
        }

        let confirmed = match self
            .broker
            .request_confirmation(
                task_id,
                name,
                &format!("Execute **{name}**"),
                parameter_summary(&args),
                self.broker.timeouts().confirmation,
            )
            .await
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::error!(task_id, tool = name, error = %e, "Confirmation request failed");
                return ToolResult::error(format!("Failed to request confirmation for {name}: {e}"));
            }
        };

        if !confirmed {
            tracing::info!(task_id, tool = name, "Tool denied by user");
            return ToolResult::failure(denied_message(name));
        }

        self.run_inner(Value::Object(args), ctx).await
    }
}

/// Wrap each tool in the adapter and register it
pub async fn register_confirmed(
    registry: &ToolRegistry,
    broker: &Arc<InteractionBroker>,
    tools: Vec<Arc<dyn Tool>>,
) {
    for tool in tools {
        registry
            .register(Arc::new(ConfirmedTool::new(tool, broker.clone())))
            .await;
    }
}
