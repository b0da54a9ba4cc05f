//! The task arena and its snapshot stream.
//!
//! Tasks live in one arena keyed by id; declaration order is kept separately
//! so sequential scheduling and reporting stay deterministic. Every status
//! change publishes a full `(id, status)` snapshot on a broadcast channel —
//! subscribers diff consecutive snapshots rather than receiving deltas, so
//! a lagged subscriber can always resynchronize from the latest one.

use kanflow_core::{KanflowError, KanflowResult, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::{Feedback, Task};

/// Buffered snapshots per subscriber before lagging kicks in.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

/// One task's `(id, status)` pair within a published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task id.
    pub id: Uuid,
    /// Status at publication time.
    pub status: TaskStatus,
}

/// The in-memory task arena.
pub struct TaskStore {
    tasks: HashMap<Uuid, Task>,
    order: Vec<Uuid>,
    snapshot_tx: broadcast::Sender<Vec<TaskSnapshot>>,
}

impl TaskStore {
    /// Build a store over the declared tasks, keeping declaration order.
    pub fn new(tasks: Vec<Task>) -> Self {
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let order: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let tasks = tasks.into_iter().map(|t| (t.id, t)).collect();
        Self {
            tasks,
            order,
            snapshot_tx,
        }
    }

    /// Subscribe to the snapshot stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<TaskSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Number of declared tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the store holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Look up a task by id.
    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Task ids in declaration order.
    pub fn order(&self) -> &[Uuid] {
        &self.order
    }

    /// Every task, in declaration order.
    pub fn tasks(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    /// Tasks currently in the given status, in declaration order.
    pub fn by_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// The current `(id, status)` snapshot, in declaration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.tasks()
            .into_iter()
            .map(|t| TaskSnapshot {
                id: t.id,
                status: t.status,
            })
            .collect()
    }

    /// Whether every task has settled (done, error, or blocked).
    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    /// Whether any task settled in a failure status.
    pub fn any_failed(&self) -> bool {
        self.tasks.values().any(|t| t.status.is_terminal_failure())
    }

    /// Ids of tasks that reached terminal success.
    pub fn terminal_success_ids(&self) -> HashSet<Uuid> {
        self.tasks
            .values()
            .filter(|t| t.status.is_terminal_success())
            .map(|t| t.id)
            .collect()
    }

    /// Task counts per status, for workflow stats.
    pub fn status_counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// The workflow deliverable: the last deliverable-flagged task's result,
    /// falling back to the last declared task's result.
    pub fn deliverable_result(&self) -> Option<serde_json::Value> {
        let tasks = self.tasks();
        tasks
            .iter()
            .rev()
            .find(|t| t.is_deliverable)
            .or_else(|| tasks.last())
            .and_then(|t| t.result.clone())
    }

    /// Aggregated results of a task's dependencies, as prompt-ready text.
    /// Dependencies without a result yet are skipped.
    pub fn dependency_context(&self, task: &Task) -> String {
        let sections: Vec<String> = task
            .dependencies
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter_map(|dep| {
                dep.result.as_ref().map(|result| {
                    let rendered = match result {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("## {}\n{rendered}", dep.title)
                })
            })
            .collect();
        sections.join("\n\n")
    }

    /// Interpolate workflow inputs into every task description.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, serde_json::Value>) {
        for task in self.tasks.values_mut() {
            task.interpolate_inputs(inputs);
        }
    }

    /// Commit a new status and publish a snapshot.
    ///
    /// Called only by the pipeline's commit handler; edge legality was
    /// already validated upstream. Terminal success stamps `completed_at`.
    pub(crate) fn set_status(&mut self, id: Uuid, status: TaskStatus) -> KanflowResult<()> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| KanflowError::NotFound(format!("task {id}")))?;
        let previous = task.status;
        task.status = status;
        if status.is_terminal_success() && task.completed_at.is_none() {
            task.completed_at = Some(chrono::Utc::now());
        }
        tracing::debug!(
            task_id = %id,
            title = %task.title,
            from = %previous,
            to = %status,
            "task status committed"
        );
        self.publish();
        Ok(())
    }

    /// Store an executor result.
    pub(crate) fn set_result(
        &mut self,
        id: Uuid,
        result: serde_json::Value,
    ) -> KanflowResult<()> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| KanflowError::NotFound(format!("task {id}")))?;
        task.result = Some(result);
        Ok(())
    }

    /// Append reviewer feedback to a task.
    pub(crate) fn add_feedback(
        &mut self,
        id: Uuid,
        content: impl Into<String>,
    ) -> KanflowResult<()> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| KanflowError::NotFound(format!("task {id}")))?;
        task.feedback.push(Feedback::new(content));
        Ok(())
    }

    /// Publish the current snapshot. A send error only means no subscriber
    /// is listening, which is fine outside an active run.
    fn publish(&self) {
        let _ = self.snapshot_tx.send(self.snapshot());
    }
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore")
            .field("tasks", &self.order.len())
            .field("subscribers", &self.snapshot_tx.receiver_count())
            .finish()
    }
}
