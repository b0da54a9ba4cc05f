//! Task definitions and per-task records.
//!
//! A [`Task`] is declared up front (title, description, dependencies) and
//! then mutated only through the team's transition pipeline; its status is
//! never assigned directly by callers.

use chrono::{DateTime, Utc};
use kanflow_core::TaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One piece of reviewer feedback attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// The feedback text.
    pub content: String,
    /// When the feedback was given.
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    /// Create a feedback entry timestamped now.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A unit of work owned by a workflow.
///
/// `description` may contain `{key}` placeholders; they are substituted from
/// the workflow inputs at start time and the substituted text is kept in
/// `interpolated_description`, leaving the declared template untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id.
    pub id: Uuid,
    /// Short human-readable title.
    pub title: String,
    /// What the executor should do. May contain `{key}` placeholders.
    pub description: String,
    /// What a correct result looks like.
    pub expected_output: String,
    /// The agent assigned to perform this task, when one is pinned.
    pub agent_id: Option<Uuid>,
    /// Current status. Mutated only through the transition pipeline.
    pub status: TaskStatus,
    /// The executor's result, once produced.
    pub result: Option<serde_json::Value>,
    /// Ids of tasks whose terminal success this task waits on.
    pub dependencies: Vec<Uuid>,
    /// Whether this task's result is the workflow deliverable.
    pub is_deliverable: bool,
    /// Whether completion parks the task at `awaiting_validation` instead
    /// of `done` until an external reviewer validates it.
    pub requires_validation: bool,
    /// The description with workflow inputs substituted, when interpolated.
    pub interpolated_description: Option<String>,
    /// Reviewer feedback, oldest first.
    pub feedback: Vec<Feedback>,
    /// When the task was declared.
    pub created_at: DateTime<Utc>,
    /// When the task reached terminal success.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Declare a task with the given title and description.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            expected_output: String::new(),
            agent_id: None,
            status: TaskStatus::Todo,
            result: None,
            dependencies: Vec::new(),
            is_deliverable: false,
            requires_validation: false,
            interpolated_description: None,
            feedback: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Set the expected output description.
    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = expected.into();
        self
    }

    /// Pin the task to an agent.
    pub fn with_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Declare a dependency on another task's terminal success.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        self.dependencies.push(task_id);
        self
    }

    /// Declare dependencies on other tasks' terminal success.
    pub fn with_dependencies(mut self, task_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.dependencies.extend(task_ids);
        self
    }

    /// Mark this task's result as the workflow deliverable.
    pub fn deliverable(mut self) -> Self {
        self.is_deliverable = true;
        self
    }

    /// Require external validation before the task counts as done.
    pub fn with_validation_required(mut self) -> Self {
        self.requires_validation = true;
        self
    }

    /// Substitute `{key}` placeholders in the description from the inputs
    /// and store the result in `interpolated_description`.
    ///
    /// Unknown placeholders are left verbatim. String inputs substitute
    /// their raw text; other JSON values substitute their JSON rendering.
    pub fn interpolate_inputs(&mut self, inputs: &HashMap<String, serde_json::Value>) {
        let mut text = self.description.clone();
        for (key, value) in inputs {
            let placeholder = format!("{{{key}}}");
            if !text.contains(&placeholder) {
                continue;
            }
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            text = text.replace(&placeholder, &rendered);
        }
        self.interpolated_description = Some(text);
    }

    /// The description the executor should act on: the interpolated text
    /// when inputs were applied, otherwise the declared template.
    pub fn effective_description(&self) -> &str {
        self.interpolated_description
            .as_deref()
            .unwrap_or(&self.description)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("research", "Find sources about {topic}");
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.dependencies.is_empty());
        assert!(!task.is_deliverable);
        assert!(!task.requires_validation);
        assert!(task.result.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_interpolation_substitutes_known_keys() {
        let mut task = Task::new("research", "Find {count} sources about {topic}");
        let inputs = HashMap::from([
            ("topic".to_string(), json!("rust async")),
            ("count".to_string(), json!(3)),
        ]);
        task.interpolate_inputs(&inputs);
        assert_eq!(
            task.effective_description(),
            "Find 3 sources about rust async"
        );
        // The declared template is untouched.
        assert_eq!(task.description, "Find {count} sources about {topic}");
    }

    #[test]
    fn test_interpolation_leaves_unknown_placeholders() {
        let mut task = Task::new("t", "Use {known} and {unknown}");
        let inputs = HashMap::from([("known".to_string(), json!("x"))]);
        task.interpolate_inputs(&inputs);
        assert_eq!(task.effective_description(), "Use x and {unknown}");
    }

    #[test]
    fn test_effective_description_before_interpolation() {
        let task = Task::new("t", "Do the thing");
        assert_eq!(task.effective_description(), "Do the thing");
    }

    #[test]
    fn test_builder_chain() {
        let dep = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let task = Task::new("summarize", "Summarize the findings")
            .with_expected_output("A one-page summary")
            .with_agent(agent)
            .with_dependency(dep)
            .deliverable()
            .with_validation_required();
        assert_eq!(task.expected_output, "A one-page summary");
        assert_eq!(task.agent_id, Some(agent));
        assert_eq!(task.dependencies, [dep]);
        assert!(task.is_deliverable);
        assert!(task.requires_validation);
    }
}
