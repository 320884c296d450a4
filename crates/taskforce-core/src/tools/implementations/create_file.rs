//! Create file tool - Write a deliverable into the task workspace

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::info;

use crate::paths;
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

const ALLOWED_EXTENSIONS: &[&str] = &[".txt", ".md", ".csv", ".json", ".html"];

pub struct CreateFileTool;

#[derive(Deserialize)]
struct Params {
    filename: String,
    content: String,
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a file in the task's workspace directory. Only .txt, .md, .csv, .json and .html files are allowed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Name of the file to create (e.g. report.md, data.csv)"
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write to the file"
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let requested = Path::new(&params.filename);
        let extension = requested
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return ToolResult::error(format!(
                "Extension '{}' not allowed. Use one of: {}",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            ));
        }

        let Some(safe_name) = paths::safe_file_name(&params.filename) else {
            return ToolResult::error(format!("Invalid filename '{}'", params.filename));
        };

        if let Err(e) = fs::create_dir_all(&ctx.working_dir).await {
            return ToolResult::failure(format!("Failed to create file: {}", e));
        }

        let path = ctx.working_dir.join(safe_name);
        match fs::write(&path, &params.content).await {
            Ok(()) => {
                info!(path = %path.display(), task_id = ?ctx.task_id, "Created workspace file");
                ToolResult::success(format!(
                    "File created successfully: {} ({} characters)",
                    path.display(),
                    params.content.chars().count()
                ))
            }
            Err(e) => ToolResult::failure(format!("Failed to create file: {}", e)),
        }
    }
}
