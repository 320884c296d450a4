//! Tool registry for managing available tools

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::ai::types::ToolDefinition;

/// Default tool execution timeout (2 minutes)
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool execution result
///
/// Error results are plain text starting with `Error:` so agents and the
/// stuck detector see the failure in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: format!("Error: {}", msg),
            is_error: true,
        }
    }

    /// A result that reports a failure without the `Error:` prefix
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::error(format!("Invalid parameters: {}", e)))
}

/// Context for tool execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub working_dir: PathBuf,
    /// Task the call runs on behalf of; `None` outside a task run
    pub task_id: Option<i64>,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            task_id: None,
            timeout: None,
        }
    }
}

impl ToolContext {
    /// Context bound to a task and its workspace directory
    pub fn for_task(task_id: i64, working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            task_id: Some(task_id),
            timeout: None,
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for AI
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Tools that block on a human bound their own execution time
    fn waits_for_user(&self) -> bool {
        false
    }

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Registry for managing tools
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a tool
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        tools.insert(name, tool);
    }

    /// Get a tool by name
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// All tools, sorted by name
    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        let mut all: Vec<_> = tools.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Get all tools as model tool definitions
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools()
            .await
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a tool by name with timeout
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        ctx: &ToolContext,
    ) -> Option<ToolResult> {
        let tool = self.get(name).await?;
        let start = Instant::now();

        let result = if tool.waits_for_user() {
            tool.execute(params, ctx).await
        } else {
            let timeout = ctx.timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT);
            match tokio::time::timeout(timeout, tool.execute(params, ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        tool = name,
                        timeout_secs = timeout.as_secs(),
                        "Tool execution timed out"
                    );
                    ToolResult::error(format!(
                        "Tool '{}' timed out after {} seconds",
                        name,
                        timeout.as_secs()
                    ))
                }
            }
        };

        tracing::debug!(
            tool = name,
            task_id = ?ctx.task_id,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        Some(result)
    }
}
