//! Stuck-workflow detection.
//!
//! Watches every agent message for distress signatures and reports when the
//! run should pause for user guidance. Counters are per run; one detector is
//! created for each task run and never shared.

use crate::constants::{agents, markers, stuck};

/// Which signature triggered an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    ExplicitSignal,
    RepeatedDenial,
    RepeatedError,
    RevisionLoop,
    DegenerateOutput,
}

/// A request to ask the user for guidance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub kind: EscalationKind,
    pub reason: String,
    pub context: String,
}

#[derive(Debug, Default)]
pub struct StuckDetector {
    tool_denial_count: usize,
    consecutive_error_count: usize,
    revision_count: usize,
    empty_message_count: usize,
    user_cancelled: bool,
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Explanation following the earliest stuck signal, if any signal is present
fn stuck_explanation(text: &str) -> Option<String> {
    let (pos, signal) = markers::STUCK_SIGNALS
        .iter()
        .filter_map(|signal| text.find(signal).map(|pos| (pos, *signal)))
        .min_by_key(|(pos, _)| *pos)?;

    let trailing = text[pos + signal.len()..]
        .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .trim_end();
    Some(truncate_chars(trailing, stuck::CONTEXT_MAX_CHARS))
}

fn is_denial(text: &str) -> bool {
    text.contains(markers::TOOL_DENIED)
        || text.contains(markers::TOOL_CANCELLED_BY_USER)
        || text.contains(markers::TOOL_CANCELLED_NO_RESPONSE)
}

fn is_failure(text: &str) -> bool {
    markers::FAILURE_PATTERNS.iter().any(|p| text.contains(p))
}

/// Guidance that means "stop the workflow"
pub fn is_stop_request(guidance: &str) -> bool {
    let normalized = guidance.trim().to_lowercase();
    stuck::STOP_WORDS.contains(&normalized.as_str())
}

impl StuckDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.user_cancelled
    }

    /// Stop the run at the top of the next iteration
    pub fn cancel(&mut self) {
        self.user_cancelled = true;
    }

    pub fn tool_denial_count(&self) -> usize {
        self.tool_denial_count
    }

    pub fn consecutive_error_count(&self) -> usize {
        self.consecutive_error_count
    }

    pub fn revision_count(&self) -> usize {
        self.revision_count
    }

    pub fn empty_message_count(&self) -> usize {
        self.empty_message_count
    }

    /// [`observe_turn`](Self::observe_turn) for a message that made no tool calls
    #[cfg(test)]
    fn observe(&mut self, agent: &str, text: &str) -> Vec<Escalation> {
        self.observe_turn::<&str>(agent, text, &[])
    }

    /// Inspect one agent turn and return the escalations it triggers
    ///
    /// Checks run in a fixed order: explicit signal, denial, error, revision,
    /// degenerate output. Denial and error checks run once per tool result
    /// when the turn called tools, otherwise once on the message. Counters
    /// that reach their threshold are reset here, whatever the user later
    /// answers.
    pub fn observe_turn<S: AsRef<str>>(
        &mut self,
        agent: &str,
        text: &str,
        tool_outputs: &[S],
    ) -> Vec<Escalation> {
        if self.user_cancelled {
            return Vec::new();
        }
        let mut escalations = Vec::new();

        if let Some(explanation) = stuck_explanation(text) {
            let (reason, context) = if explanation.is_empty() {
                (
                    format!("{agent} reported it cannot proceed"),
                    truncate_chars(text.trim(), stuck::CONTEXT_MAX_CHARS),
                )
            } else {
                (
                    format!("{agent} reported it cannot proceed: {explanation}"),
                    explanation,
                )
            };
            escalations.push(Escalation {
                kind: EscalationKind::ExplicitSignal,
                reason,
                context,
            });
        }

        if tool_outputs.is_empty() {
            self.check_outcome(agent, text, &mut escalations);
        } else {
            for output in tool_outputs {
                self.check_outcome(agent, output.as_ref(), &mut escalations);
            }
        }

        if agent == agents::REVIEWER && text.contains(markers::NEEDS_REVISION) {
            self.revision_count += 1;
            if self.revision_count >= stuck::REVISION_THRESHOLD {
                escalations.push(Escalation {
                    kind: EscalationKind::RevisionLoop,
                    reason: format!(
                        "The Reviewer keeps finding issues ({} revision requests)",
                        self.revision_count
                    ),
                    context: truncate_chars(text, stuck::CONTEXT_MAX_CHARS),
                });
                self.revision_count = 0;
            }
        }

        if text.trim().chars().count() < stuck::EMPTY_MESSAGE_MIN_CHARS {
            self.empty_message_count += 1;
            if self.empty_message_count >= stuck::EMPTY_MESSAGE_THRESHOLD {
                escalations.push(Escalation {
                    kind: EscalationKind::DegenerateOutput,
                    reason: format!(
                        "{agent} appears confused ({} near-empty messages)",
                        self.empty_message_count
                    ),
                    context: text.trim().to_string(),
                });
                self.empty_message_count = 0;
            }
        } else {
            self.empty_message_count = 0;
        }

        escalations
    }

    /// Denial and error counting for one outcome
    fn check_outcome(&mut self, agent: &str, text: &str, escalations: &mut Vec<Escalation>) {
        if is_denial(text) {
            self.tool_denial_count += 1;
            // A denial is not an error
            self.consecutive_error_count = 0;
            if self.tool_denial_count >= stuck::TOOL_DENIAL_THRESHOLD {
                let summary = format!("You have denied {} tool actions", self.tool_denial_count);
                escalations.push(Escalation {
                    kind: EscalationKind::RepeatedDenial,
                    reason: summary.clone(),
                    context: format!("{summary}. The agent may need a different approach."),
                });
                self.tool_denial_count = 0;
            }
            return;
        }

        if is_failure(text) {
            self.consecutive_error_count += 1;
        } else {
            self.consecutive_error_count = 0;
        }
        if self.consecutive_error_count >= stuck::CONSECUTIVE_ERROR_THRESHOLD {
            escalations.push(Escalation {
                kind: EscalationKind::RepeatedError,
                reason: format!(
                    "{agent} hit {} consecutive errors",
                    self.consecutive_error_count
                ),
                context: truncate_chars(text, stuck::CONTEXT_MAX_CHARS),
            });
            self.consecutive_error_count = 0;
        }
    }
}
