//! Persistence layer
//!
//! SQLite-based storage for:
//! - Task run state and artifacts
//! - The agent conversation log
//! - Interaction requests (human-in-the-loop audit trail)

mod database;
mod interactions;
mod messages;
mod repository;
mod tasks;

pub use database::Database;
pub use interactions::{
    FieldSpec, InteractionKind, InteractionRequest, InteractionResponse, InteractionStatus,
    InteractionStore, NewInteraction, RespondOutcome,
};
pub use messages::{AgentMessage, MessageStore};
pub use repository::{SqliteRepository, TaskRepository};
pub use tasks::{TaskArtifact, TaskOutputs, TaskRecord, TaskStatus, TaskStore};
