//! Error types for the kanflow engine.
//!
//! Every failure carries a stable error code (see [`codes`]) so callers can
//! branch programmatically instead of matching on message strings.

use crate::validation::ValidationIssue;
use uuid::Uuid;

/// A convenience `Result` alias using [`KanflowError`].
pub type KanflowResult<T> = Result<T, KanflowError>;

/// Stable error codes attached to every [`KanflowError`] variant.
///
/// Codes are part of the public contract: they never change once published,
/// even when the human-readable messages do.
pub mod codes {
    /// A structurally invalid transition context or rule violation.
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// A mandatory transition-context field was absent or empty.
    pub const FIELD_MISSING: &str = "FIELD_MISSING";
    /// The context's execution phase is not reachable from its predecessor.
    pub const PHASE_TRANSITION_INVALID: &str = "PHASE_TRANSITION_INVALID";
    /// A status value does not belong to the entity kind's enumeration.
    pub const STATUS_KIND_MISMATCH: &str = "STATUS_KIND_MISMATCH";
    /// No transition rule set is registered for the entity kind.
    pub const RULES_NOT_REGISTERED: &str = "RULES_NOT_REGISTERED";
    /// A legal-shape transition whose `(from, to)` edge is not in the rule table.
    pub const STATE_TRANSITION_INVALID: &str = "STATE_TRANSITION_INVALID";
    /// A matching rule's custom guard predicate rejected the transition.
    pub const GUARD_REJECTED: &str = "GUARD_REJECTED";
    /// A dependency graph resolved back onto a node still being resolved.
    pub const CIRCULAR_DEPENDENCY: &str = "CIRCULAR_DEPENDENCY";
    /// A required dependency could not be satisfied by any registered version.
    pub const MISSING_DEPENDENCY: &str = "MISSING_DEPENDENCY";
    /// An entity, version, or handler lookup found nothing.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// An opaque failure surfaced by an external collaborator.
    pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";
    /// Event emission was vetoed by handler validation.
    pub const EVENT_REJECTED: &str = "EVENT_REJECTED";
    /// The scheduler could not be constructed or dispatched safely.
    pub const SCHEDULER_ERROR: &str = "SCHEDULER_ERROR";
    /// A workflow-level failure (e.g. the run terminated in an errored state).
    pub const WORKFLOW_ERROR: &str = "WORKFLOW_ERROR";
    /// A JSON serialization or deserialization error.
    pub const JSON_ERROR: &str = "JSON_ERROR";
}

/// Top-level error type for the kanflow engine.
#[derive(Debug, thiserror::Error)]
pub enum KanflowError {
    /// A structurally invalid transition context, bad field, or rule violation.
    #[error("Validation error [{code}]: {message}")]
    Validation {
        /// Stable code from [`codes`].
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// A legal-shape transition whose edge is not present in the rule table.
    #[error("Invalid {entity} transition {from} -> {to}; allowed from {from}: [{allowed}]")]
    StateTransitionInvalid {
        /// Entity kind name.
        entity: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
        /// Comma-separated legal target statuses, for actionable messages.
        allowed: String,
    },

    /// A dependency walk revisited a node before it was fully resolved.
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// The resolution path that closed the cycle, e.g. `x -> y -> x`.
        chain: String,
    },

    /// A required dependency has no registered version satisfying its constraint.
    #[error("Missing required dependency '{name}' (constraint {constraint})")]
    MissingDependency {
        /// Dependency name.
        name: String,
        /// The unsatisfiable version constraint.
        constraint: String,
    },

    /// An entity, version, or handler lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An opaque failure surfaced by an external collaborator (agent executor).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Event emission was vetoed during the handler validation phase.
    /// No handler side effects ran.
    #[error("Event {event_type} ({event_id}) rejected by handler validation")]
    EventRejected {
        /// Display name of the rejected event type.
        event_type: String,
        /// Id of the offending event.
        event_id: Uuid,
        /// Aggregated validation errors from every handler.
        issues: Vec<ValidationIssue>,
    },

    /// The scheduler could not be constructed or dispatched safely.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A workflow-level failure.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KanflowError {
    /// The stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            KanflowError::Validation { code, .. } => code,
            KanflowError::StateTransitionInvalid { .. } => codes::STATE_TRANSITION_INVALID,
            KanflowError::CircularDependency { .. } => codes::CIRCULAR_DEPENDENCY,
            KanflowError::MissingDependency { .. } => codes::MISSING_DEPENDENCY,
            KanflowError::NotFound(_) => codes::NOT_FOUND,
            KanflowError::Execution(_) => codes::EXECUTION_ERROR,
            KanflowError::EventRejected { .. } => codes::EVENT_REJECTED,
            KanflowError::Scheduler(_) => codes::SCHEDULER_ERROR,
            KanflowError::Workflow(_) => codes::WORKFLOW_ERROR,
            KanflowError::Json(_) => codes::JSON_ERROR,
        }
    }

    /// Shorthand for a [`KanflowError::Validation`] with the given code.
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        KanflowError::Validation {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = KanflowError::StateTransitionInvalid {
            entity: "task".into(),
            from: "todo".into(),
            to: "done".into(),
            allowed: "doing".into(),
        };
        assert_eq!(err.code(), "STATE_TRANSITION_INVALID");

        let err = KanflowError::validation(codes::FIELD_MISSING, "operation is empty");
        assert_eq!(err.code(), "FIELD_MISSING");

        let err = KanflowError::CircularDependency {
            chain: "x -> y -> x".into(),
        };
        assert_eq!(err.code(), "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn test_display_includes_allowed_set() {
        let err = KanflowError::StateTransitionInvalid {
            entity: "task".into(),
            from: "todo".into(),
            to: "done".into(),
            allowed: "doing, blocked".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("todo -> done"));
        assert!(msg.contains("doing, blocked"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: KanflowError = parse_err.into();
        assert_eq!(err.code(), "JSON_ERROR");
    }
}
