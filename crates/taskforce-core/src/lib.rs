//! Taskforce core library
//!
//! Coordinates a Planner / Executor / Reviewer team on a user objective while
//! letting any tool call pause the run for human input or confirmation.
//!
//! ## Layers
//! - `storage` - SQLite persistence for tasks, transcripts, interaction requests
//! - `interaction` - Suspend/resume broker correlating requests with responses
//! - `events` - Push-notification protocol for external observers
//! - `tools` - Tool trait, registry, and the confirmed-tool adapter
//! - `ai` - Chat model seam and an OpenAI-compatible client
//! - `agent` - Agents, speaker selection, stuck detection, and the run loop

pub mod agent;
pub mod ai;
pub mod config;
pub mod constants;
pub mod events;
pub mod interaction;
pub mod paths;
pub mod storage;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{RunOutcome, TaskOrchestrator};
pub use config::Settings;
pub use events::{EventHub, Notifier, TaskEvent};
pub use interaction::{InteractionBroker, ResolveOutcome};
pub use storage::{SqliteRepository, TaskRepository, TaskStatus};
