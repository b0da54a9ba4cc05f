//! Agent handles and the executor seam.
//!
//! The engine never talks to a model or tool directly; it hands tasks to an
//! injected [`AgentExecutor`] and consumes the resulting value or error.

use async_trait::async_trait;
use kanflow_core::{AgentStatus, KanflowResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::task::Task;

/// A named executor registered with a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHandle {
    /// Unique agent id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// What this agent is for, shown in logs and stats.
    pub role: String,
    /// Current status. Mutated only through the transition pipeline.
    pub status: AgentStatus,
}

impl AgentHandle {
    /// Register an agent with the given name and role.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: role.into(),
            status: AgentStatus::Initial,
        }
    }
}

/// The seam between the engine and whatever actually performs tasks.
///
/// `perform` receives the task (with its effective description), the
/// workflow inputs, and the aggregated results of the task's dependencies.
/// Returning an error marks the task `error`; the engine never retries.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Perform one task and return its result value.
    async fn perform(
        &self,
        task: &Task,
        inputs: &HashMap<String, serde_json::Value>,
        dependency_context: &str,
    ) -> KanflowResult<serde_json::Value>;
}
