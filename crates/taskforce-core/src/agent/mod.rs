//! Multi-agent workflow
//!
//! - `roles` - Planner / Executor / Reviewer identities and prompts
//! - `participant` - One agent turn against the chat model
//! - `selector` - Who speaks next
//! - `stuck` - Distress detection and escalation triggers
//! - `artifacts` - Deliverable discovery in the task workspace
//! - `orchestrator` - The conversation loop

pub mod artifacts;
pub mod orchestrator;
pub mod participant;
pub mod roles;
pub mod selector;
pub mod stuck;

#[cfg(test)]
mod scenario_tests;

pub use orchestrator::{
    AgentTeam, OrchestratorConfig, OrchestratorServices, RunOutcome, TaskOrchestrator,
};
pub use participant::{Agent, TranscriptEntry, TurnOutput};
pub use roles::AgentRole;
pub use selector::{ModelSelector, SpeakerSelector, WorkflowSelector};
pub use stuck::{Escalation, EscalationKind, StuckDetector};
