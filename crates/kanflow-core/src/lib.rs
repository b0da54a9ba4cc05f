//! Core types and error definitions for the kanflow orchestration engine.
//!
//! This crate provides the foundational types shared across all kanflow
//! crates: entity kinds and their status enumerations, the execution phase
//! sub-machine, transition contexts, and structured validation results.
//!
//! # Main types
//!
//! - [`KanflowError`] — Unified error enum with stable, branchable error codes.
//! - [`KanflowResult`] — Convenience alias for `Result<T, KanflowError>`.
//! - [`EntityKind`] — Closed enumeration of orchestrated entity categories.
//! - [`Status`] — Tagged union over the per-kind status enumerations.
//! - [`Phase`] — The 4-state execution phase sub-machine.
//! - [`TransitionContext`] — Immutable record describing a proposed status change.
//! - [`ValidationResult`] — Structured outcome of transition validation.

/// Transition contexts and attached execution snapshots.
pub mod context;
/// Entity kinds and per-kind status enumerations.
pub mod entity;
/// Error types and stable error codes.
pub mod error;
/// The execution phase sub-machine.
pub mod phase;
/// Structured validation results.
pub mod validation;

pub use context::{PerformanceSnapshot, ResourceSnapshot, TransitionContext};
pub use entity::{AgentStatus, EntityKind, MessageStatus, Status, TaskStatus, WorkflowStatus};
pub use error::{codes, KanflowError, KanflowResult};
pub use phase::Phase;
pub use validation::{ValidationIssue, ValidationResult};
