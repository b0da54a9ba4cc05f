//! Declarative transition rules and the per-entity-kind registry.
//!
//! Rules are registered once per entity kind at system initialization and
//! never mutated in the steady state; the registry is shared behind an `Arc`
//! without locking. A kind with no registered rule set is a configuration
//! error surfaced by the validator, never silently defaulted.

use futures::future::BoxFuture;
use kanflow_core::{
    codes, AgentStatus, EntityKind, KanflowError, KanflowResult, MessageStatus, Status,
    TaskStatus, TransitionContext, WorkflowStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An async guard predicate attached to a transition rule.
pub type Guard =
    Arc<dyn for<'a> Fn(&'a TransitionContext) -> BoxFuture<'a, bool> + Send + Sync>;

/// A set of statuses usable on either side of a rule.
///
/// Built from a single status or a slice of them, so rule tables read as
/// `TransitionRule::new(TaskStatus::Doing, [TaskStatus::Done, TaskStatus::Error])`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet(pub Vec<Status>);

impl StatusSet {
    /// Whether the set contains the given status.
    pub fn contains(&self, status: Status) -> bool {
        self.0.contains(&status)
    }
}

impl From<Status> for StatusSet {
    fn from(s: Status) -> Self {
        StatusSet(vec![s])
    }
}

impl From<Vec<Status>> for StatusSet {
    fn from(v: Vec<Status>) -> Self {
        StatusSet(v)
    }
}

impl<const N: usize> From<[Status; N]> for StatusSet {
    fn from(v: [Status; N]) -> Self {
        StatusSet(v.to_vec())
    }
}

impl From<TaskStatus> for StatusSet {
    fn from(s: TaskStatus) -> Self {
        StatusSet(vec![s.into()])
    }
}

impl<const N: usize> From<[TaskStatus; N]> for StatusSet {
    fn from(v: [TaskStatus; N]) -> Self {
        StatusSet(v.into_iter().map(Status::from).collect())
    }
}

impl From<AgentStatus> for StatusSet {
    fn from(s: AgentStatus) -> Self {
        StatusSet(vec![s.into()])
    }
}

impl<const N: usize> From<[AgentStatus; N]> for StatusSet {
    fn from(v: [AgentStatus; N]) -> Self {
        StatusSet(v.into_iter().map(Status::from).collect())
    }
}

impl From<WorkflowStatus> for StatusSet {
    fn from(s: WorkflowStatus) -> Self {
        StatusSet(vec![s.into()])
    }
}

impl<const N: usize> From<[WorkflowStatus; N]> for StatusSet {
    fn from(v: [WorkflowStatus; N]) -> Self {
        StatusSet(v.into_iter().map(Status::from).collect())
    }
}

impl From<MessageStatus> for StatusSet {
    fn from(s: MessageStatus) -> Self {
        StatusSet(vec![s.into()])
    }
}

impl<const N: usize> From<[MessageStatus; N]> for StatusSet {
    fn from(v: [MessageStatus; N]) -> Self {
        StatusSet(v.into_iter().map(Status::from).collect())
    }
}

/// One declarative `(from → to)` edge, optionally guarded.
///
/// Matching is structural and order-independent: the first rule whose `from`
/// and `to` sets contain the proposed pair makes the edge legal, but every
/// structurally matching rule that carries a guard must also pass.
#[derive(Clone)]
pub struct TransitionRule {
    /// Legal source statuses.
    pub from: StatusSet,
    /// Legal target statuses.
    pub to: StatusSet,
    /// Optional async predicate that must resolve `true` for the edge to hold.
    pub guard: Option<Guard>,
}

impl TransitionRule {
    /// Create an unguarded rule from single statuses or status arrays.
    pub fn new(from: impl Into<StatusSet>, to: impl Into<StatusSet>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
        }
    }

    /// Attach an async guard predicate.
    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: for<'a> Fn(&'a TransitionContext) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Whether this rule structurally matches the `(from, to)` pair.
    pub fn matches(&self, from: Status, to: Status) -> bool {
        self.from.contains(from) && self.to.contains(to)
    }
}

impl std::fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRule")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guard", &self.guard.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// The initial status each entity kind starts from.
pub fn initial_status(kind: EntityKind) -> Status {
    match kind {
        EntityKind::Task => TaskStatus::Todo.into(),
        EntityKind::Agent => AgentStatus::Initial.into(),
        EntityKind::Workflow => WorkflowStatus::Initial.into(),
        EntityKind::Message => MessageStatus::Pending.into(),
    }
}

/// Built-in rule table for tasks.
pub fn default_task_rules() -> Vec<TransitionRule> {
    use TaskStatus::*;
    vec![
        TransitionRule::new(Todo, [Doing, Blocked]),
        TransitionRule::new(Doing, [Done, AwaitingValidation, Revise, Blocked, Error]),
        TransitionRule::new(AwaitingValidation, [Validated, Revise]),
        TransitionRule::new(Validated, [Done]),
        TransitionRule::new(Revise, [Doing]),
        TransitionRule::new(Blocked, [Doing, Error]),
    ]
}

/// Built-in rule table for agents.
pub fn default_agent_rules() -> Vec<TransitionRule> {
    use AgentStatus::*;
    vec![
        TransitionRule::new([Initial, Idle], [Thinking]),
        TransitionRule::new(Thinking, [ThinkingEnd, ThinkingError, MaxIterationsError]),
        TransitionRule::new(ThinkingEnd, [ExecutingAction, UsingTool, FinalAnswer]),
        TransitionRule::new(ThinkingError, [Thinking, MaxIterationsError]),
        TransitionRule::new(UsingTool, [UsingToolEnd, UsingToolError]),
        TransitionRule::new([UsingToolEnd, UsingToolError, ExecutingAction], [Thinking]),
        TransitionRule::new(FinalAnswer, [TaskCompleted]),
        TransitionRule::new(TaskCompleted, [Idle]),
    ]
}

/// Built-in rule table for workflows.
pub fn default_workflow_rules() -> Vec<TransitionRule> {
    use WorkflowStatus::*;
    vec![
        TransitionRule::new(Initial, [Running]),
        TransitionRule::new(Running, [Paused, Stopping, Finished, Blocked, Errored]),
        TransitionRule::new(Paused, [Running, Stopping]),
        TransitionRule::new(Stopping, [Stopped]),
        TransitionRule::new(Blocked, [Running, Errored]),
    ]
}

/// Built-in rule table for messages.
pub fn default_message_rules() -> Vec<TransitionRule> {
    use MessageStatus::*;
    vec![TransitionRule::new(Pending, [Delivered, Failed])]
}

/// Static, per-entity-kind table of legal transition edges.
///
/// Populated once at initialization; `rules_for` is a pure lookup afterward.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: HashMap<EntityKind, Vec<TransitionRule>>,
}

impl RuleRegistry {
    /// An empty registry. Kinds must be registered before use.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in tables for all four kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EntityKind::Task, default_task_rules());
        registry.register(EntityKind::Agent, default_agent_rules());
        registry.register(EntityKind::Workflow, default_workflow_rules());
        registry.register(EntityKind::Message, default_message_rules());
        registry
    }

    /// Register (or replace) the rule set for a kind.
    pub fn register(&mut self, kind: EntityKind, rules: Vec<TransitionRule>) {
        self.rules.insert(kind, rules);
    }

    /// The rule set for a kind. `None` means the kind was never configured.
    pub fn rules_for(&self, kind: EntityKind) -> Option<&[TransitionRule]> {
        self.rules.get(&kind).map(Vec::as_slice)
    }

    /// Startup invariant: every rule must be reachable from the kind's
    /// initial status, i.e. at least one of its `from` statuses appears in
    /// the closure of `initial` under the table's edges. Orphan rules make
    /// their `to` statuses unreachable and indicate a broken table.
    pub fn verify_reachability(&self, kind: EntityKind, initial: Status) -> KanflowResult<()> {
        let rules = self.rules_for(kind).ok_or_else(|| {
            KanflowError::validation(
                codes::RULES_NOT_REGISTERED,
                format!("no rule set registered for entity kind '{kind}'"),
            )
        })?;

        // BFS closure of `initial` under the rule edges.
        let mut reachable: HashSet<Status> = HashSet::new();
        reachable.insert(initial);
        let mut frontier = vec![initial];
        while let Some(status) = frontier.pop() {
            for rule in rules {
                if rule.from.contains(status) {
                    for &target in &rule.to.0 {
                        if reachable.insert(target) {
                            frontier.push(target);
                        }
                    }
                }
            }
        }

        for (index, rule) in rules.iter().enumerate() {
            if !rule.from.0.iter().any(|s| reachable.contains(s)) {
                let froms: Vec<String> = rule.from.0.iter().map(ToString::to_string).collect();
                return Err(KanflowError::validation(
                    codes::VALIDATION_ERROR,
                    format!(
                        "rule {index} for kind '{kind}' is orphaned: none of its source \
                         statuses [{}] are reachable from '{initial}'",
                        froms.join(", ")
                    ),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_matches_single_and_set() {
        let rule = TransitionRule::new(
            TaskStatus::Doing,
            [TaskStatus::Done, TaskStatus::Error],
        );
        assert!(rule.matches(TaskStatus::Doing.into(), TaskStatus::Done.into()));
        assert!(rule.matches(TaskStatus::Doing.into(), TaskStatus::Error.into()));
        assert!(!rule.matches(TaskStatus::Todo.into(), TaskStatus::Done.into()));
        assert!(!rule.matches(TaskStatus::Doing.into(), TaskStatus::Todo.into()));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RuleRegistry::with_defaults();
        assert!(registry.rules_for(EntityKind::Task).is_some());
        assert!(registry.rules_for(EntityKind::Agent).is_some());
        assert!(registry.rules_for(EntityKind::Workflow).is_some());
        assert!(registry.rules_for(EntityKind::Message).is_some());

        let empty = RuleRegistry::new();
        assert!(empty.rules_for(EntityKind::Task).is_none());
    }

    #[test]
    fn test_default_tables_are_reachable() {
        let registry = RuleRegistry::with_defaults();
        for kind in [
            EntityKind::Task,
            EntityKind::Agent,
            EntityKind::Workflow,
            EntityKind::Message,
        ] {
            registry
                .verify_reachability(kind, initial_status(kind))
                .unwrap();
        }
    }

    #[test]
    fn test_orphan_rule_detected() {
        let mut registry = RuleRegistry::new();
        registry.register(
            EntityKind::Task,
            vec![
                TransitionRule::new(TaskStatus::Todo, TaskStatus::Doing),
                // Validated is unreachable: nothing transitions into it.
                TransitionRule::new(TaskStatus::Validated, TaskStatus::Done),
            ],
        );
        let err = registry
            .verify_reachability(EntityKind::Task, TaskStatus::Todo.into())
            .unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_ERROR);
        assert!(err.to_string().contains("orphaned"));
    }

    #[test]
    fn test_unregistered_kind_reachability_errors() {
        let registry = RuleRegistry::new();
        let err = registry
            .verify_reachability(EntityKind::Task, TaskStatus::Todo.into())
            .unwrap_err();
        assert_eq!(err.code(), codes::RULES_NOT_REGISTERED);
    }

    #[test]
    fn test_guard_attachment() {
        let rule = TransitionRule::new(TaskStatus::Todo, TaskStatus::Doing)
            .with_guard(|_ctx| Box::pin(async { true }));
        assert!(rule.guard.is_some());
        // Debug impl must not panic on the guard.
        let debug = format!("{rule:?}");
        assert!(debug.contains("<fn>"));
    }
}
