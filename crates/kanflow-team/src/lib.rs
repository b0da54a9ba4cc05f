//! Multi-agent task orchestration for the kanflow engine.
//!
//! A [`Team`] declares tasks (with dependencies), registers agents, and runs
//! the board to completion: every status change flows through the validated
//! transition pipeline, a scheduling strategy decides which tasks launch
//! when, and the injected [`AgentExecutor`] performs the actual work.
//!
//! # Main types
//!
//! - [`Team`] / [`TeamBuilder`] — The aggregate and its wiring.
//! - [`Task`] — One declared unit of work.
//! - [`AgentExecutor`] — The seam to whatever performs tasks.
//! - [`ExecutionStrategy`] — Sequential or hierarchical scheduling.
//! - [`TaskScheduler`] — Diff-and-dispatch loop over task snapshots.

/// Agent handles and the executor seam.
pub mod agent;
/// The reactive task scheduler.
pub mod scheduler;
/// Workflow-level statistics.
pub mod stats;
/// The task arena and its snapshot stream.
pub mod store;
/// Execution strategies and the launcher seam.
pub mod strategy;
/// Task definitions and per-task records.
pub mod task;
/// The team aggregate.
pub mod team;

pub use agent::{AgentExecutor, AgentHandle};
pub use scheduler::TaskScheduler;
pub use stats::WorkflowStats;
pub use store::{TaskSnapshot, TaskStore};
pub use strategy::{
    strategy_for, ExecutionStrategy, HierarchicalStrategy, SequentialStrategy, TaskLauncher,
    WorkflowKind,
};
pub use task::{Feedback, Task};
pub use team::{Team, TeamBuilder, WorkflowResult};
