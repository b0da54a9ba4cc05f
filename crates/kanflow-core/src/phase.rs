//! The execution phase sub-machine.
//!
//! Phase is orthogonal to entity status: it tracks where in the execution
//! lifecycle a transition is being proposed, with a fixed 4-state table.
//! Phase legality is evaluated per transition context, not as a history
//! check across calls.

use serde::{Deserialize, Serialize};

/// Execution phase of a proposed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Before the operation's main work begins.
    PreExecution,
    /// The operation's main work.
    Execution,
    /// After the main work completed.
    PostExecution,
    /// The operation failed. Terminal.
    Error,
}

impl Phase {
    /// Legal successor phases per the fixed table:
    /// pre-execution → {execution, error}, execution → {post-execution, error},
    /// post-execution → {error}, error → {}.
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::PreExecution => &[Phase::Execution, Phase::Error],
            Phase::Execution => &[Phase::PostExecution, Phase::Error],
            Phase::PostExecution => &[Phase::Error],
            Phase::Error => &[],
        }
    }

    /// Whether `next` is a legal successor of this phase.
    pub fn can_transition_to(self, next: Phase) -> bool {
        self.successors().contains(&next)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::PreExecution => "pre-execution",
            Phase::Execution => "execution",
            Phase::PostExecution => "post-execution",
            Phase::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_table() {
        assert!(Phase::PreExecution.can_transition_to(Phase::Execution));
        assert!(Phase::PreExecution.can_transition_to(Phase::Error));
        assert!(!Phase::PreExecution.can_transition_to(Phase::PostExecution));

        assert!(Phase::Execution.can_transition_to(Phase::PostExecution));
        assert!(Phase::Execution.can_transition_to(Phase::Error));
        assert!(!Phase::Execution.can_transition_to(Phase::PreExecution));

        assert!(Phase::PostExecution.can_transition_to(Phase::Error));
        assert!(!Phase::PostExecution.can_transition_to(Phase::Execution));
    }

    #[test]
    fn test_error_is_terminal() {
        assert!(Phase::Error.successors().is_empty());
        assert!(!Phase::Error.can_transition_to(Phase::PreExecution));
        assert!(!Phase::Error.can_transition_to(Phase::Error));
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::PreExecution.to_string(), "pre-execution");
        assert_eq!(Phase::PostExecution.to_string(), "post-execution");
    }
}
