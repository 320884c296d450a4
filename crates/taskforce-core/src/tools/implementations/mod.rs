//! Tool implementations
//!
//! Built-in tools:
//! - create_file: Write a deliverable into the task workspace
//! - make_api_call: Call an external HTTP endpoint
//!
//! Anything else the Executor should use is registered by the embedder.

pub mod create_file;
pub mod make_api_call;

pub use create_file::CreateFileTool;
pub use make_api_call::MakeApiCallTool;

use std::sync::Arc;

use super::registry::Tool;

/// The built-in tool set, unwrapped
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(CreateFileTool), Arc::new(MakeApiCallTool::new())]
}
