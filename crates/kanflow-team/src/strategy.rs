//! Execution strategies: which tasks to launch, and when.
//!
//! A strategy is consulted at kickoff and again for every batch of changed
//! task statuses. It never executes tasks itself; it asks the injected
//! [`TaskLauncher`] to launch, block, or raise, so strategies stay pure
//! scheduling logic and the launcher owns pipeline emission.

use async_trait::async_trait;
use kanflow_core::{KanflowError, KanflowResult, TaskStatus, WorkflowStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{TaskSnapshot, TaskStore};
use crate::task::Task;

/// The actions a strategy can request from the team.
#[async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Launch a runnable task (drive it `todo`/`revise` → `doing` and run
    /// the executor). A no-op when the workflow is not running or the task
    /// already left its runnable status.
    async fn launch(&self, task_id: Uuid) -> KanflowResult<()>;

    /// Block a not-yet-started task whose upstream dependency failed.
    async fn block_task(&self, task_id: Uuid, reason: &str) -> KanflowResult<()>;

    /// Raise the workflow into a terminal status. Idempotent: a no-op when
    /// the workflow already left `running`.
    async fn raise_workflow(&self, status: WorkflowStatus, reason: &str) -> KanflowResult<()>;
}

/// Scheduling policy consulted at kickoff and on every status-change batch.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Strategy name for logs and stats.
    fn name(&self) -> &'static str;

    /// Launch whatever is runnable in the initial state.
    async fn start_execution(
        &self,
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()>;

    /// React to a batch of tasks whose status changed since the last
    /// consultation.
    async fn execute_from_changed_tasks(
        &self,
        changed: &[TaskSnapshot],
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()>;
}

/// Whether a task may be handed to the launcher.
fn is_runnable(status: TaskStatus) -> bool {
    matches!(status, TaskStatus::Todo | TaskStatus::Revise)
}

/// Strict declaration-order execution: one task at a time, each gated on
/// its predecessor's terminal success.
#[derive(Debug)]
pub struct SequentialStrategy {
    order: Vec<Uuid>,
}

impl SequentialStrategy {
    /// Build a sequential strategy over the declared tasks.
    ///
    /// Sequential execution implies the dependency chain `task[i]` →
    /// `task[i-1]`; more than one later task declaring its own explicit
    /// dependencies means the declaration order is not the real graph, and
    /// construction fails rather than guessing.
    pub fn new(tasks: &[Task]) -> KanflowResult<Self> {
        let offenders = tasks
            .iter()
            .skip(1)
            .filter(|t| !t.dependencies.is_empty())
            .count();
        if offenders > 1 {
            return Err(KanflowError::Scheduler(format!(
                "sequential execution is ambiguous: {offenders} non-first tasks declare \
                 explicit dependencies; use the hierarchical strategy"
            )));
        }
        Ok(Self {
            order: tasks.iter().map(|t| t.id).collect(),
        })
    }

    /// The next task that may run, if any: the first non-settled task in
    /// declaration order, runnable only when its predecessor succeeded.
    async fn next_runnable(&self, store: &RwLock<TaskStore>) -> Option<Uuid> {
        let store = store.read().await;
        for (index, id) in self.order.iter().enumerate() {
            let task = store.get(*id)?;
            if task.status.is_terminal_success() {
                continue;
            }
            if is_runnable(task.status) {
                if index == 0 {
                    return Some(*id);
                }
                let predecessor = store.get(self.order[index - 1])?;
                return predecessor.status.is_terminal_success().then_some(*id);
            }
            // In flight, failed, or awaiting validation: nothing to launch.
            return None;
        }
        None
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn start_execution(
        &self,
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()> {
        if let Some(id) = self.next_runnable(store).await {
            launcher.launch(id).await?;
        }
        Ok(())
    }

    async fn execute_from_changed_tasks(
        &self,
        changed: &[TaskSnapshot],
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()> {
        for snapshot in changed {
            match snapshot.status {
                TaskStatus::Error => {
                    return launcher
                        .raise_workflow(
                            WorkflowStatus::Errored,
                            &format!("task {} errored", snapshot.id),
                        )
                        .await;
                }
                TaskStatus::Blocked => {
                    return launcher
                        .raise_workflow(
                            WorkflowStatus::Blocked,
                            &format!("task {} blocked", snapshot.id),
                        )
                        .await;
                }
                _ => {}
            }
        }
        if let Some(id) = self.next_runnable(store).await {
            launcher.launch(id).await?;
        }
        Ok(())
    }
}

/// Dependency-graph execution: every task whose declared dependencies all
/// reached terminal success is runnable, independent of declaration order.
#[derive(Debug, Default)]
pub struct HierarchicalStrategy;

impl HierarchicalStrategy {
    /// Tasks runnable right now, in declaration order.
    async fn ready_tasks(&self, store: &RwLock<TaskStore>) -> Vec<Uuid> {
        let store = store.read().await;
        let satisfied = store.terminal_success_ids();
        store
            .tasks()
            .into_iter()
            .filter(|t| {
                is_runnable(t.status) && t.dependencies.iter().all(|d| satisfied.contains(d))
            })
            .map(|t| t.id)
            .collect()
    }

    /// Not-yet-started tasks transitively dependent on any failed id.
    async fn doomed_descendants(
        &self,
        store: &RwLock<TaskStore>,
        failed: &[Uuid],
    ) -> Vec<Uuid> {
        let store = store.read().await;
        let mut doomed: HashSet<Uuid> = failed.iter().copied().collect();
        // Fixpoint over the reverse dependency edges.
        loop {
            let mut grew = false;
            for task in store.tasks() {
                if doomed.contains(&task.id) {
                    continue;
                }
                if task.dependencies.iter().any(|d| doomed.contains(d)) {
                    doomed.insert(task.id);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        store
            .tasks()
            .into_iter()
            .filter(|t| doomed.contains(&t.id) && is_runnable(t.status))
            .map(|t| t.id)
            .collect()
    }
}

#[async_trait]
impl ExecutionStrategy for HierarchicalStrategy {
    fn name(&self) -> &'static str {
        "hierarchical"
    }

    async fn start_execution(
        &self,
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()> {
        for id in self.ready_tasks(store).await {
            launcher.launch(id).await?;
        }
        Ok(())
    }

    async fn execute_from_changed_tasks(
        &self,
        changed: &[TaskSnapshot],
        store: &RwLock<TaskStore>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()> {
        let failed: Vec<&TaskSnapshot> = changed
            .iter()
            .filter(|s| s.status.is_terminal_failure())
            .collect();
        if !failed.is_empty() {
            let failed_ids: Vec<Uuid> = failed.iter().map(|s| s.id).collect();
            for id in self.doomed_descendants(store, &failed_ids).await {
                launcher
                    .block_task(id, "an upstream dependency failed")
                    .await?;
            }
            // An errored task outranks cascade-blocked ones.
            let errored = failed.iter().any(|s| s.status == TaskStatus::Error);
            let (status, reason) = if errored {
                (WorkflowStatus::Errored, "a task errored")
            } else {
                (WorkflowStatus::Blocked, "a task was blocked")
            };
            return launcher.raise_workflow(status, reason).await;
        }

        for id in self.ready_tasks(store).await {
            launcher.launch(id).await?;
        }
        Ok(())
    }
}

/// How a team's workflow should be scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkflowKind {
    /// Infer from the declared tasks: plain chains run sequentially,
    /// anything with a real dependency graph runs hierarchically.
    #[default]
    Auto,
    /// Force strict declaration-order execution.
    Sequential,
    /// Force dependency-graph execution.
    Hierarchy,
}

/// Select the strategy for the declared tasks.
pub fn strategy_for(
    kind: WorkflowKind,
    tasks: &[Task],
) -> KanflowResult<Arc<dyn ExecutionStrategy>> {
    match kind {
        WorkflowKind::Sequential => Ok(Arc::new(SequentialStrategy::new(tasks)?)),
        WorkflowKind::Hierarchy => Ok(Arc::new(HierarchicalStrategy)),
        WorkflowKind::Auto => {
            let offenders = tasks
                .iter()
                .skip(1)
                .filter(|t| !t.dependencies.is_empty())
                .count();
            if offenders > 1 {
                Ok(Arc::new(HierarchicalStrategy))
            } else {
                Ok(Arc::new(SequentialStrategy::new(tasks)?))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Launcher that records requested actions without executing anything.
    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<Uuid>>,
        blocked: Mutex<Vec<Uuid>>,
        raised: Mutex<Vec<WorkflowStatus>>,
    }

    #[async_trait]
    impl TaskLauncher for RecordingLauncher {
        async fn launch(&self, task_id: Uuid) -> KanflowResult<()> {
            self.launched.lock().unwrap().push(task_id);
            Ok(())
        }

        async fn block_task(&self, task_id: Uuid, _reason: &str) -> KanflowResult<()> {
            self.blocked.lock().unwrap().push(task_id);
            Ok(())
        }

        async fn raise_workflow(
            &self,
            status: WorkflowStatus,
            _reason: &str,
        ) -> KanflowResult<()> {
            self.raised.lock().unwrap().push(status);
            Ok(())
        }
    }

    fn chain(n: usize) -> Vec<Task> {
        (0..n).map(|i| Task::new(format!("t{i}"), "work")).collect()
    }

    #[tokio::test]
    async fn test_sequential_rejects_ambiguous_shape() {
        let a = Task::new("a", "a");
        let b = Task::new("b", "b").with_dependency(a.id);
        let c = Task::new("c", "c").with_dependency(a.id);
        let err = SequentialStrategy::new(&[a, b, c]).unwrap_err();
        assert_eq!(err.code(), kanflow_core::codes::SCHEDULER_ERROR);
        assert!(err.to_string().contains("ambiguous"));
    }

    #[tokio::test]
    async fn test_sequential_accepts_single_dependent() {
        let a = Task::new("a", "a");
        let b = Task::new("b", "b").with_dependency(a.id);
        assert!(SequentialStrategy::new(&[a, b]).is_ok());
    }

    #[tokio::test]
    async fn test_sequential_launches_first_task_only() {
        let tasks = chain(3);
        let strategy = SequentialStrategy::new(&tasks).unwrap();
        let first = tasks[0].id;
        let store = RwLock::new(TaskStore::new(tasks));
        let launcher = RecordingLauncher::default();

        strategy.start_execution(&store, &launcher).await.unwrap();
        assert_eq!(*launcher.launched.lock().unwrap(), [first]);
    }

    #[tokio::test]
    async fn test_sequential_advances_after_success() {
        let tasks = chain(3);
        let strategy = SequentialStrategy::new(&tasks).unwrap();
        let (first, second) = (tasks[0].id, tasks[1].id);
        let store = RwLock::new(TaskStore::new(tasks));
        store.write().await.set_status(first, TaskStatus::Done).unwrap();

        let launcher = RecordingLauncher::default();
        let changed = [TaskSnapshot {
            id: first,
            status: TaskStatus::Done,
        }];
        strategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.launched.lock().unwrap(), [second]);
    }

    #[tokio::test]
    async fn test_sequential_raises_errored_on_task_error() {
        let tasks = chain(2);
        let strategy = SequentialStrategy::new(&tasks).unwrap();
        let first = tasks[0].id;
        let store = RwLock::new(TaskStore::new(tasks));
        store.write().await.set_status(first, TaskStatus::Error).unwrap();

        let launcher = RecordingLauncher::default();
        let changed = [TaskSnapshot {
            id: first,
            status: TaskStatus::Error,
        }];
        strategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.raised.lock().unwrap(), [WorkflowStatus::Errored]);
        assert!(launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hierarchical_initial_readiness() {
        // C depends on A and B; only A and B are ready at kickoff.
        let a = Task::new("a", "a");
        let b = Task::new("b", "b");
        let c = Task::new("c", "c").with_dependencies([a.id, b.id]);
        let (a_id, b_id) = (a.id, b.id);
        let store = RwLock::new(TaskStore::new(vec![a, b, c]));
        let launcher = RecordingLauncher::default();

        HierarchicalStrategy
            .start_execution(&store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.launched.lock().unwrap(), [a_id, b_id]);
    }

    #[tokio::test]
    async fn test_hierarchical_waits_for_every_dependency() {
        let a = Task::new("a", "a");
        let b = Task::new("b", "b");
        let c = Task::new("c", "c").with_dependencies([a.id, b.id]);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let store = RwLock::new(TaskStore::new(vec![a, b, c]));

        // Only A succeeded: C stays unlaunched.
        store.write().await.set_status(a_id, TaskStatus::Done).unwrap();
        let launcher = RecordingLauncher::default();
        let changed = [TaskSnapshot {
            id: a_id,
            status: TaskStatus::Done,
        }];
        HierarchicalStrategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert!(launcher.launched.lock().unwrap().is_empty());

        // B succeeds too: C becomes ready.
        store.write().await.set_status(b_id, TaskStatus::Done).unwrap();
        let changed = [TaskSnapshot {
            id: b_id,
            status: TaskStatus::Done,
        }];
        HierarchicalStrategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.launched.lock().unwrap(), [c_id]);
    }

    #[tokio::test]
    async fn test_hierarchical_failure_cascades_to_descendants() {
        // B depends on A, C depends on B: A's failure dooms both.
        let a = Task::new("a", "a");
        let b = Task::new("b", "b").with_dependency(a.id);
        let c = Task::new("c", "c").with_dependency(b.id);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let store = RwLock::new(TaskStore::new(vec![a, b, c]));
        store.write().await.set_status(a_id, TaskStatus::Error).unwrap();

        let launcher = RecordingLauncher::default();
        let changed = [TaskSnapshot {
            id: a_id,
            status: TaskStatus::Error,
        }];
        HierarchicalStrategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.blocked.lock().unwrap(), [b_id, c_id]);
        assert_eq!(*launcher.raised.lock().unwrap(), [WorkflowStatus::Errored]);
    }

    #[tokio::test]
    async fn test_hierarchical_blocked_raises_blocked_workflow() {
        let a = Task::new("a", "a");
        let a_id = a.id;
        let store = RwLock::new(TaskStore::new(vec![a]));
        store
            .write()
            .await
            .set_status(a_id, TaskStatus::Blocked)
            .unwrap();

        let launcher = RecordingLauncher::default();
        let changed = [TaskSnapshot {
            id: a_id,
            status: TaskStatus::Blocked,
        }];
        HierarchicalStrategy
            .execute_from_changed_tasks(&changed, &store, &launcher)
            .await
            .unwrap();
        assert_eq!(*launcher.raised.lock().unwrap(), [WorkflowStatus::Blocked]);
    }

    #[test]
    fn test_auto_detection() {
        let a = Task::new("a", "a");
        let b = Task::new("b", "b").with_dependency(a.id);
        let c = Task::new("c", "c").with_dependency(a.id);

        let plain = strategy_for(WorkflowKind::Auto, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(plain.name(), "sequential");

        let graph = strategy_for(WorkflowKind::Auto, &[a, b, c]).unwrap();
        assert_eq!(graph.name(), "hierarchical");
    }
}
