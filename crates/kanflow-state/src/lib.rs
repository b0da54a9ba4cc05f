//! Status state machine for the kanflow orchestration engine.
//!
//! This crate owns the three layers every status change passes through:
//! the declarative transition rule tables, the staged status validator,
//! and the typed event bus with its 4-stage transition pipeline.
//!
//! # Main types
//!
//! - [`RuleRegistry`] — Per-entity-kind tables of legal `(from, to)` edges.
//! - [`TransitionRule`] — One declarative edge, optionally guarded.
//! - [`StatusValidator`] — Staged, short-circuiting transition validation.
//! - [`StatusEventBus`] — Typed publish/subscribe bus with a strict
//!   validate-then-handle emission protocol.
//! - [`TransitionPipeline`] — Drives `pre-transition` → `transition` →
//!   `post-transition` (or `error`) for each proposed change.
//! - [`MetricsSink`] — Injected sink for per-transition timing metrics.

/// Typed status events, handlers, and the event bus.
pub mod events;
/// Transition metrics and sink implementations.
pub mod metrics;
/// The 4-stage transition emission pipeline.
pub mod pipeline;
/// Declarative transition rules and the per-kind registry.
pub mod rules;
/// The staged status validator.
pub mod validator;

pub use events::{EventHandler, StatusEvent, StatusEventBus, StatusEventType};
pub use metrics::{InMemoryMetrics, MetricsSink, NullMetrics, TransitionMetric};
pub use pipeline::TransitionPipeline;
pub use rules::{
    default_agent_rules, default_message_rules, default_task_rules, default_workflow_rules,
    initial_status, RuleRegistry, StatusSet, TransitionRule,
};
pub use validator::StatusValidator;
