//! Entity kinds and their status enumerations.
//!
//! Each entity kind owns its own status enumeration and its own transition
//! rule table; kinds are never cross-compatible. Statuses are mutated only
//! through the validated transition pipeline, never assigned directly.

use serde::{Deserialize, Serialize};

/// The closed set of entity categories the engine orchestrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A named executor that performs tasks.
    Agent,
    /// A unit of work owned by a workflow.
    Task,
    /// The team/workflow aggregate itself.
    Workflow,
    /// A message exchanged between agents.
    Message,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Agent => write!(f, "agent"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Workflow => write!(f, "workflow"),
            EntityKind::Message => write!(f, "message"),
        }
    }
}

/// Status of a task within its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Declared but not yet started.
    Todo,
    /// Currently being executed by an agent.
    Doing,
    /// Stopped by an unmet precondition or a failed upstream dependency.
    Blocked,
    /// Returned to the executor with feedback.
    Revise,
    /// Execution finished; awaiting external validation.
    AwaitingValidation,
    /// Externally validated.
    Validated,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Error,
}

impl TaskStatus {
    /// Whether this status counts as terminal success for dependency readiness.
    pub fn is_terminal_success(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Validated)
    }

    /// Whether this status is a terminal failure (never auto-recovered).
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, TaskStatus::Error | TaskStatus::Blocked)
    }

    /// Whether the task has settled (no further automatic transitions pending).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error | TaskStatus::Blocked)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Revise => "revise",
            TaskStatus::AwaitingValidation => "awaiting_validation",
            TaskStatus::Validated => "validated",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Status of an agent while it works on a task.
///
/// Fine-grained states are reported by the agent executor itself; the engine
/// only consumes the resulting transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed, never started.
    Initial,
    /// Waiting for work.
    Idle,
    /// Reasoning about the current task.
    Thinking,
    /// Produced a reasoning result.
    ThinkingEnd,
    /// Reasoning failed; may retry.
    ThinkingError,
    /// Executing a non-tool action.
    ExecutingAction,
    /// Invoking a tool.
    UsingTool,
    /// Tool invocation succeeded.
    UsingToolEnd,
    /// Tool invocation failed; may retry.
    UsingToolError,
    /// Produced a final answer for the task.
    FinalAnswer,
    /// The task was completed and handed back.
    TaskCompleted,
    /// Gave up after exhausting the iteration budget. Terminal.
    MaxIterationsError,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentStatus::Initial => "initial",
            AgentStatus::Idle => "idle",
            AgentStatus::Thinking => "thinking",
            AgentStatus::ThinkingEnd => "thinking_end",
            AgentStatus::ThinkingError => "thinking_error",
            AgentStatus::ExecutingAction => "executing_action",
            AgentStatus::UsingTool => "using_tool",
            AgentStatus::UsingToolEnd => "using_tool_end",
            AgentStatus::UsingToolError => "using_tool_error",
            AgentStatus::FinalAnswer => "final_answer",
            AgentStatus::TaskCompleted => "task_completed",
            AgentStatus::MaxIterationsError => "max_iterations_error",
        };
        write!(f, "{name}")
    }
}

/// Workflow-level status of the team aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Declared but not yet started.
    Initial,
    /// Executing tasks.
    Running,
    /// Suspended; no new tasks launch until resumed.
    Paused,
    /// Stop requested; draining.
    Stopping,
    /// Stopped before completion. Terminal.
    Stopped,
    /// All tasks reached terminal success. Terminal.
    Finished,
    /// A dependency failure left tasks permanently unrunnable.
    /// Terminal but not failed.
    Blocked,
    /// A task or the engine failed. Terminal.
    Errored,
}

impl WorkflowStatus {
    /// Whether the workflow has settled and will make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Stopped
                | WorkflowStatus::Finished
                | WorkflowStatus::Blocked
                | WorkflowStatus::Errored
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStatus::Initial => "initial",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Stopping => "stopping",
            WorkflowStatus::Stopped => "stopped",
            WorkflowStatus::Finished => "finished",
            WorkflowStatus::Blocked => "blocked",
            WorkflowStatus::Errored => "errored",
        };
        write!(f, "{name}")
    }
}

/// Delivery status of a message between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Queued for delivery.
    Pending,
    /// Delivered to the recipient.
    Delivered,
    /// Delivery failed. Terminal.
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// A status value tagged with the entity kind it belongs to.
///
/// Membership of a status in a kind's enumeration is checked by comparing
/// [`Status::kind`] against the entity kind on the transition context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// A task status.
    Task(TaskStatus),
    /// An agent status.
    Agent(AgentStatus),
    /// A workflow status.
    Workflow(WorkflowStatus),
    /// A message status.
    Message(MessageStatus),
}

impl Status {
    /// The entity kind this status belongs to.
    pub fn kind(self) -> EntityKind {
        match self {
            Status::Task(_) => EntityKind::Task,
            Status::Agent(_) => EntityKind::Agent,
            Status::Workflow(_) => EntityKind::Workflow,
            Status::Message(_) => EntityKind::Message,
        }
    }

}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Task(s) => write!(f, "{s}"),
            Status::Agent(s) => write!(f, "{s}"),
            Status::Workflow(s) => write!(f, "{s}"),
            Status::Message(s) => write!(f, "{s}"),
        }
    }
}

impl From<TaskStatus> for Status {
    fn from(s: TaskStatus) -> Self {
        Status::Task(s)
    }
}

impl From<AgentStatus> for Status {
    fn from(s: AgentStatus) -> Self {
        Status::Agent(s)
    }
}

impl From<WorkflowStatus> for Status {
    fn from(s: WorkflowStatus) -> Self {
        Status::Workflow(s)
    }
}

impl From<MessageStatus> for Status {
    fn from(s: MessageStatus) -> Self {
        Status::Message(s)
    }
}
