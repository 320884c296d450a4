//! Shared constants: workflow markers, agent names, thresholds, and timeouts.

/// Text markers agents emit to drive the workflow.
pub mod markers {
    pub const PLAN_COMPLETE: &str = "PLAN_COMPLETE";
    pub const EXECUTION_COMPLETE: &str = "EXECUTION_COMPLETE";
    pub const TASK_COMPLETE: &str = "TASK_COMPLETE";
    pub const NEEDS_REVISION: &str = "NEEDS_REVISION";

    /// An agent's own declaration that it cannot proceed.
    pub const STUCK_SIGNALS: &[&str] = &["AGENT_STUCK", "CANNOT_PROCEED", "NEED_USER_HELP"];

    /// Produced by the confirmed-tool adapter; the stuck detector counts it.
    pub const TOOL_DENIED: &str = "was denied by user";
    pub const TOOL_CANCELLED_BY_USER: &str = "cancelled by user";
    pub const TOOL_CANCELLED_NO_RESPONSE: &str = "cancelled: user did not respond in time";

    pub const FAILURE_PATTERNS: &[&str] = &["Failed to", "Error:"];
}

/// Transcript speaker names.
pub mod agents {
    pub const PLANNER: &str = "Planner";
    pub const EXECUTOR: &str = "Executor";
    pub const REVIEWER: &str = "Reviewer";
    pub const USER: &str = "User";
    pub const SYSTEM: &str = "System";
}

/// Stuck-detector thresholds.
pub mod stuck {
    pub const TOOL_DENIAL_THRESHOLD: usize = 3;
    pub const CONSECUTIVE_ERROR_THRESHOLD: usize = 3;
    pub const REVISION_THRESHOLD: usize = 3;
    pub const EMPTY_MESSAGE_THRESHOLD: usize = 5;
    /// Stripped messages shorter than this count as degenerate.
    pub const EMPTY_MESSAGE_MIN_CHARS: usize = 20;
    pub const CONTEXT_MAX_CHARS: usize = 500;
    /// Guidance replies that stop the run.
    pub const STOP_WORDS: &[&str] = &["cancel", "stop", "abort"];
}

/// Interaction broker defaults.
pub mod interaction {
    use std::time::Duration;

    pub const INPUT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
    pub const GUIDANCE_TIMEOUT: Duration = Duration::from_secs(600);
    /// Returned by `request_guidance` when nobody answered.
    pub const CANCEL_SENTINEL: &str = "cancel";
    /// Tool name recorded on requests the workflow itself raises.
    pub const SYSTEM_TOOL_NAME: &str = "system";
    /// Parameter values in confirmation previews are cut to this many chars.
    pub const PARAM_PREVIEW_MAX_CHARS: usize = 200;
}

pub mod workflow {
    pub const DEFAULT_MAX_TURNS: usize = 60;
    /// Transient subdirectory of a task workspace, purged at completion.
    pub const SCREENSHOT_DIR: &str = "screenshots";
}

pub mod ai {
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
}

pub mod app {
    pub const CONFIG_DIR_NAME: &str = ".taskforce";
    pub const DATABASE_FILE_NAME: &str = "taskforce.db";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
