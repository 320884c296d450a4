//! Tool system
//!
//! Every tool the Executor sees is wrapped by `ConfirmedTool`, so a call inside
//! a task run always passes through the interaction broker first.

pub mod confirmed;
pub mod implementations;
pub mod registry;

pub use confirmed::{register_confirmed, tool_input_spec, ConfirmedTool, ToolInputSpec};
pub use implementations::builtin_tools;
pub use registry::{parse_params, Tool, ToolContext, ToolRegistry, ToolResult};
