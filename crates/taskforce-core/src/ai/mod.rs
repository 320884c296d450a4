//! Language model seam
//!
//! Agents and the speaker selector only see the `ChatModel` trait. The
//! production implementation talks to any OpenAI-compatible endpoint.

pub mod client;
pub mod types;

pub use client::{ChatModel, ModelError, OpenAiChatModel};
pub use types::{ChatMessage, ChatRole, Completion, ToolCall, ToolDefinition};
