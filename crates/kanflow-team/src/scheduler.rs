//! The reactive task scheduler.
//!
//! The scheduler subscribes to the store's snapshot stream, diffs each
//! snapshot against the previous one it dispatched on, and forwards only
//! the tasks whose status actually changed to the strategy. The previous
//! snapshot lives behind an async mutex, so overlapping reactive calls
//! serialize instead of double-dispatching the same change.

use kanflow_core::KanflowResult;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::store::{TaskSnapshot, TaskStore};
use crate::strategy::{ExecutionStrategy, TaskLauncher};

/// Diff-and-dispatch scheduler over one task store.
pub struct TaskScheduler {
    strategy: Arc<dyn ExecutionStrategy>,
    store: Arc<RwLock<TaskStore>>,
    previous: Mutex<Vec<TaskSnapshot>>,
}

impl TaskScheduler {
    /// Build a scheduler for the given strategy and store.
    pub fn new(strategy: Arc<dyn ExecutionStrategy>, store: Arc<RwLock<TaskStore>>) -> Self {
        Self {
            strategy,
            store,
            previous: Mutex::new(Vec::new()),
        }
    }

    /// Name of the underlying strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Seed the diff baseline from the current store state and launch
    /// whatever the strategy considers runnable.
    ///
    /// Tasks already settled in a failure status are replayed through the
    /// strategy's change path first: a failure that landed while the
    /// workflow was paused was dispatched into a suppressed raise, and
    /// nothing else would ever surface it.
    pub async fn kickoff(&self, launcher: &dyn TaskLauncher) -> KanflowResult<()> {
        let mut previous = self.previous.lock().await;
        let snapshot = self.store.read().await.snapshot();
        *previous = snapshot.clone();
        tracing::debug!(strategy = self.strategy_name(), "scheduler kickoff");
        let failed: Vec<TaskSnapshot> = snapshot
            .into_iter()
            .filter(|s| s.status.is_terminal_failure())
            .collect();
        if !failed.is_empty() {
            return self
                .strategy
                .execute_from_changed_tasks(&failed, &self.store, launcher)
                .await;
        }
        self.strategy.start_execution(&self.store, launcher).await
    }

    /// Dispatch one snapshot: diff against the previous baseline and hand
    /// the changed tasks to the strategy. Holding the baseline lock for the
    /// whole dispatch serializes overlapping calls.
    pub async fn on_snapshot(
        &self,
        current: Vec<TaskSnapshot>,
        launcher: &dyn TaskLauncher,
    ) -> KanflowResult<()> {
        let mut previous = self.previous.lock().await;
        let changed: Vec<TaskSnapshot> = current
            .iter()
            .filter(|snapshot| {
                previous
                    .iter()
                    .find(|p| p.id == snapshot.id)
                    .map_or(true, |p| p.status != snapshot.status)
            })
            .copied()
            .collect();
        *previous = current;

        if changed.is_empty() {
            tracing::trace!("snapshot carried no status changes");
            return Ok(());
        }
        tracing::debug!(changed = changed.len(), "dispatching changed tasks");
        self.strategy
            .execute_from_changed_tasks(&changed, &self.store, launcher)
            .await
    }

    /// Spawn the reactive loop over an already-open subscription.
    ///
    /// The subscription must be taken before kickoff so no snapshot
    /// published during kickoff is missed. On lag the loop resynchronizes
    /// from the store's current state instead of giving up.
    pub fn spawn_reactive(
        self: &Arc<Self>,
        mut rx: broadcast::Receiver<Vec<TaskSnapshot>>,
        launcher: Arc<dyn TaskLauncher>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let snapshot = match rx.recv().await {
                    Ok(snapshot) => snapshot,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "scheduler lagged; resyncing from store");
                        scheduler.store.read().await.snapshot()
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(error) = scheduler.on_snapshot(snapshot, launcher.as_ref()).await {
                    tracing::error!(error = %error, "reactive dispatch failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::strategy::SequentialStrategy;
    use crate::task::Task;
    use async_trait::async_trait;
    use kanflow_core::{TaskStatus, WorkflowStatus};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: StdMutex<Vec<Uuid>>,
        raised: StdMutex<Vec<WorkflowStatus>>,
    }

    #[async_trait]
    impl TaskLauncher for RecordingLauncher {
        async fn launch(&self, task_id: Uuid) -> KanflowResult<()> {
            self.launched.lock().unwrap().push(task_id);
            Ok(())
        }

        async fn block_task(&self, _task_id: Uuid, _reason: &str) -> KanflowResult<()> {
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

    fn fixture(n: usize) -> (Arc<TaskScheduler>, Arc<RwLock<TaskStore>>, Vec<Uuid>) {
        let tasks: Vec<Task> = (0..n).map(|i| Task::new(format!("t{i}"), "work")).collect();
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let strategy = Arc::new(SequentialStrategy::new(&tasks).unwrap());
        let store = Arc::new(RwLock::new(TaskStore::new(tasks)));
        let scheduler = Arc::new(TaskScheduler::new(strategy, Arc::clone(&store)));
        (scheduler, store, ids)
    }

    #[tokio::test]
    async fn test_kickoff_launches_and_seeds_baseline() {
        let (scheduler, store, ids) = fixture(2);
        let launcher = RecordingLauncher::default();
        scheduler.kickoff(&launcher).await.unwrap();
        assert_eq!(*launcher.launched.lock().unwrap(), [ids[0]]);

        // An unchanged snapshot dispatches nothing.
        let snapshot = store.read().await.snapshot();
        scheduler.on_snapshot(snapshot, &launcher).await.unwrap();
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_kickoff_replays_settled_failures() {
        let (scheduler, store, ids) = fixture(2);
        store.write().await.set_status(ids[0], TaskStatus::Error).unwrap();

        // The error pre-dates the kickoff; the strategy still sees it.
        let launcher = RecordingLauncher::default();
        scheduler.kickoff(&launcher).await.unwrap();
        assert!(launcher.launched.lock().unwrap().is_empty());
        assert_eq!(*launcher.raised.lock().unwrap(), [WorkflowStatus::Errored]);
    }

    #[tokio::test]
    async fn test_only_changed_tasks_are_forwarded() {
        let (scheduler, store, ids) = fixture(3);
        let launcher = RecordingLauncher::default();
        scheduler.kickoff(&launcher).await.unwrap();

        store.write().await.set_status(ids[0], TaskStatus::Done).unwrap();
        let snapshot = store.read().await.snapshot();
        scheduler.on_snapshot(snapshot, &launcher).await.unwrap();
        // Kickoff launched t0; the change to Done advanced to t1.
        assert_eq!(*launcher.launched.lock().unwrap(), [ids[0], ids[1]]);

        // Replaying the identical snapshot is a no-op.
        let snapshot = store.read().await.snapshot();
        scheduler.on_snapshot(snapshot, &launcher).await.unwrap();
        assert_eq!(launcher.launched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reactive_loop_dispatches_published_snapshots() {
        let (scheduler, store, ids) = fixture(2);
        let launcher = Arc::new(RecordingLauncher::default());

        let rx = store.read().await.subscribe();
        let handle = scheduler
            .spawn_reactive(rx, Arc::clone(&launcher) as Arc<dyn TaskLauncher>);
        scheduler.kickoff(launcher.as_ref()).await.unwrap();

        store.write().await.set_status(ids[0], TaskStatus::Done).unwrap();
        // Give the loop a chance to run.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if launcher.launched.lock().unwrap().len() == 2 {
                break;
            }
        }
        assert_eq!(*launcher.launched.lock().unwrap(), [ids[0], ids[1]]);
        handle.abort();
    }
}
