//! The three agent roles and their system prompts

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::agents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    Planner,
    Executor,
    Reviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [Self::Planner, Self::Executor, Self::Reviewer];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Planner => agents::PLANNER,
            Self::Executor => agents::EXECUTOR,
            Self::Reviewer => agents::REVIEWER,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Planner => PLANNER_PROMPT,
            Self::Executor => EXECUTOR_PROMPT,
            Self::Reviewer => REVIEWER_PROMPT,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const PLANNER_PROMPT: &str = r#"You are the PLANNER agent in a multi-agent task completion system.

Analyze the user's objective and break it into specific, actionable subtasks. For each subtask give a short description, its dependencies, the expected output, and which Executor tool should be used.

Every tool call the Executor makes must be approved by the user, so keep subtasks focused and avoid unnecessary actions.

If you cannot make progress without information only the user has, say "AGENT_STUCK:" followed by what you need.

After creating your plan, say "PLAN_COMPLETE" to signal you're done planning."#;

const EXECUTOR_PROMPT: &str = r#"You are the EXECUTOR agent in a multi-agent task completion system.

Follow the Planner's plan and execute each subtask, using your tools where the plan calls for them. Document what you did and what each tool returned.

The user approves every tool call. If a call is denied, adjust your approach instead of repeating it. If you cannot continue at all, say "AGENT_STUCK:" followed by the reason.

After completing all subtasks, say "EXECUTION_COMPLETE" to signal you're done."#;

const REVIEWER_PROMPT: &str = r#"You are the REVIEWER agent in a multi-agent task completion system.

Review the Executor's work against the original objective and the Planner's plan. Check completeness, quality, and factual accuracy, and give specific feedback per subtask.

If the work is acceptable, say "TASK_COMPLETE".
If revisions are needed, say "NEEDS_REVISION" and clearly list what the Executor must fix."#;

/// Guides model-mediated speaker selection
pub const SELECTOR_PROMPT: &str = r#"You are the orchestrator for a multi-agent task completion system.
Based on the conversation history, select the most appropriate agent to speak next.

Available agents:
- Planner: Creates detailed task plans. Should go first to analyze and break down the objective.
- Executor: Executes the plan. Should work after the Planner has created a plan.
- Reviewer: Reviews completed work. Should review after the Executor has completed execution.

Workflow:
1. Planner creates the plan first
2. Executor executes each subtask
3. Reviewer validates the work
4. If Reviewer finds issues, Executor fixes them
5. Process ends when Reviewer approves with "TASK_COMPLETE"

Select the agent whose turn it is based on the conversation state."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::markers;

    #[test]
    fn test_from_name() {
        assert_eq!(AgentRole::from_name("planner"), Some(AgentRole::Planner));
        assert_eq!(AgentRole::from_name(" Reviewer "), Some(AgentRole::Reviewer));
        assert_eq!(AgentRole::from_name("User"), None);
    }

    #[test]
    fn test_prompts_mention_their_markers() {
        assert!(AgentRole::Planner.system_prompt().contains(markers::PLAN_COMPLETE));
        assert!(AgentRole::Executor.system_prompt().contains(markers::EXECUTION_COMPLETE));
        assert!(AgentRole::Reviewer.system_prompt().contains(markers::TASK_COMPLETE));
        assert!(AgentRole::Reviewer.system_prompt().contains(markers::NEEDS_REVISION));
    }
}
