//! Workflow-level statistics.

use chrono::{DateTime, Utc};
use kanflow_core::{TaskStatus, WorkflowStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point-in-time summary of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStats {
    /// Current workflow status.
    pub status: WorkflowStatus,
    /// Scheduling strategy driving the run.
    pub strategy: String,
    /// When the workflow entered `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the workflow settled.
    pub finished_at: Option<DateTime<Utc>>,
    /// Run duration so far (or total, once settled), in milliseconds.
    pub duration_ms: u64,
    /// Number of declared tasks.
    pub total_tasks: usize,
    /// Task counts per status.
    pub task_counts: HashMap<TaskStatus, usize>,
    /// Transitions committed through the pipeline so far.
    pub transitions_recorded: u64,
}

impl WorkflowStats {
    /// One-line rendering for logs.
    pub fn summary(&self) -> String {
        let done = self.task_counts.get(&TaskStatus::Done).copied().unwrap_or(0);
        format!(
            "{} ({}): {done}/{} tasks done, {} transitions, {}ms",
            self.status, self.strategy, self.total_tasks, self.transitions_recorded,
            self.duration_ms
        )
    }
}
