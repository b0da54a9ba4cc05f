//! Transition contexts: immutable records describing a proposed status change.

use crate::entity::{EntityKind, Status};
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A point-in-time resource snapshot attached to a transition context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resident memory in bytes at the time of the transition.
    pub memory_bytes: u64,
    /// Number of queued-but-unstarted tasks.
    pub queue_depth: u32,
}

/// A point-in-time performance snapshot attached to a transition context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Latency of the operation so far, in milliseconds.
    pub latency_ms: u64,
    /// Tokens consumed by the operation so far.
    pub tokens: u64,
}

/// An immutable record describing a proposed status change.
///
/// Built once, validated, and passed by reference through the pipeline;
/// nothing mutates a context after construction. `entity_id`, `operation`,
/// `phase`, and `started_at` are mandatory — the validator rejects contexts
/// where they are missing or empty rather than defaulting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionContext {
    /// The kind of entity being transitioned.
    pub entity_kind: EntityKind,
    /// Id of the entity instance.
    pub entity_id: Uuid,
    /// The entity's committed status at proposal time.
    pub current_status: Status,
    /// The requested status.
    pub target_status: Status,
    /// Name of the operation driving the transition (e.g. `start_task`).
    pub operation: String,
    /// Execution phase of the proposal.
    pub phase: Phase,
    /// The phase this proposal follows, when the caller tracks one.
    /// Phase legality is checked against it per-call; `None` skips the check.
    pub previous_phase: Option<Phase>,
    /// When the driving operation started.
    pub started_at: Option<DateTime<Utc>>,
    /// Elapsed operation time, when already known at proposal time.
    pub duration_ms: Option<u64>,
    /// Optional resource snapshot.
    pub resources: Option<ResourceSnapshot>,
    /// Optional performance snapshot.
    pub performance: Option<PerformanceSnapshot>,
    /// Free-form metadata carried through every pipeline stage.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TransitionContext {
    /// Create a context for the given entity and `(from, to)` pair.
    ///
    /// Defaults: phase `pre-execution`, `started_at` now, empty operation
    /// (the validator rejects contexts whose operation is never set).
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Uuid,
        current_status: impl Into<Status>,
        target_status: impl Into<Status>,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            current_status: current_status.into(),
            target_status: target_status.into(),
            operation: String::new(),
            phase: Phase::PreExecution,
            previous_phase: None,
            started_at: Some(Utc::now()),
            duration_ms: None,
            resources: None,
            performance: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the operation name.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Set the execution phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Record the phase this proposal follows.
    pub fn with_previous_phase(mut self, previous: Phase) -> Self {
        self.previous_phase = Some(previous);
        self
    }

    /// Set the known elapsed duration.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach a resource snapshot.
    pub fn with_resources(mut self, resources: ResourceSnapshot) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Attach a performance snapshot.
    pub fn with_performance(mut self, performance: PerformanceSnapshot) -> Self {
        self.performance = Some(performance);
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The `"from -> to"` label used in events, logs, and metrics.
    pub fn transition_label(&self) -> String {
        format!("{} -> {}", self.current_status, self.target_status)
    }

    /// Wall-clock milliseconds elapsed since `started_at`, when set.
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::entity::TaskStatus;

    #[test]
    fn test_builder_defaults() {
        let ctx = TransitionContext::new(
            EntityKind::Task,
            Uuid::new_v4(),
            TaskStatus::Todo,
            TaskStatus::Doing,
        );
        assert_eq!(ctx.phase, Phase::PreExecution);
        assert!(ctx.started_at.is_some());
        assert!(ctx.operation.is_empty());
        assert!(ctx.previous_phase.is_none());
    }

    #[test]
    fn test_transition_label() {
        let ctx = TransitionContext::new(
            EntityKind::Task,
            Uuid::new_v4(),
            TaskStatus::Todo,
            TaskStatus::Doing,
        );
        assert_eq!(ctx.transition_label(), "todo -> doing");
    }

    #[test]
    fn test_builder_chain() {
        let ctx = TransitionContext::new(
            EntityKind::Task,
            Uuid::new_v4(),
            TaskStatus::Doing,
            TaskStatus::Done,
        )
        .with_operation("finish_task")
        .with_phase(Phase::Execution)
        .with_previous_phase(Phase::PreExecution)
        .with_duration_ms(42)
        .with_resources(ResourceSnapshot {
            memory_bytes: 1024,
            queue_depth: 3,
        })
        .with_performance(PerformanceSnapshot {
            latency_ms: 42,
            tokens: 17,
        })
        .with_metadata("attempt", serde_json::json!(1));

        assert_eq!(ctx.operation, "finish_task");
        assert_eq!(ctx.phase, Phase::Execution);
        assert_eq!(ctx.previous_phase, Some(Phase::PreExecution));
        assert_eq!(ctx.duration_ms, Some(42));
        assert_eq!(ctx.resources, Some(ResourceSnapshot { memory_bytes: 1024, queue_depth: 3 }));
        assert_eq!(ctx.performance.map(|p| p.tokens), Some(17));
        assert_eq!(ctx.metadata["attempt"], serde_json::json!(1));
    }

    #[test]
    fn test_serialization_round_trip() {
        let ctx = TransitionContext::new(
            EntityKind::Task,
            Uuid::new_v4(),
            TaskStatus::Todo,
            TaskStatus::Doing,
        )
        .with_operation("start_task");
        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: TransitionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.operation, "start_task");
        assert_eq!(parsed.entity_id, ctx.entity_id);
    }
}
