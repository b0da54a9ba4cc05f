//! The team aggregate: tasks, agents, and the workflow state machine.
//!
//! A [`Team`] owns the task store, the agent registry, and one workflow
//! record, and routes every status change through the transition pipeline.
//! State is committed by a single pipeline handler on the `transition`
//! stage, so a vetoed proposal never touches the stores.

use async_trait::async_trait;
use chrono::Utc;
use kanflow_core::{
    AgentStatus, EntityKind, KanflowError, KanflowResult, PerformanceSnapshot, Phase,
    ResourceSnapshot, Status, TaskStatus, TransitionContext, WorkflowStatus,
};
use kanflow_resolver::verify_graph;
use kanflow_state::{
    initial_status, EventHandler, MetricsSink, NullMetrics, RuleRegistry, StatusEvent,
    StatusEventType, StatusValidator, TransitionPipeline,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use uuid::Uuid;

use crate::agent::{AgentExecutor, AgentHandle};
use crate::scheduler::TaskScheduler;
use crate::stats::WorkflowStats;
use crate::store::{TaskSnapshot, TaskStore};
use crate::strategy::{strategy_for, TaskLauncher, WorkflowKind};
use crate::task::Task;

/// Mutable workflow record, guarded by the team's lock.
struct WorkflowState {
    status: WorkflowStatus,
    result: Option<serde_json::Value>,
    started_at: Option<chrono::DateTime<Utc>>,
    finished_at: Option<chrono::DateTime<Utc>>,
    watch_tx: watch::Sender<WorkflowStatus>,
}

/// The outcome of a completed (or stopped) workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// The terminal workflow status.
    pub status: WorkflowStatus,
    /// The deliverable, when the run produced one.
    pub result: Option<serde_json::Value>,
    /// Final run statistics.
    pub stats: WorkflowStats,
}

/// The single commit point: applies validated transitions to the stores.
///
/// Registered on the `transition` stage, after the validator's
/// pre-transition veto; by the time `handle` runs the edge is known legal.
struct CommitHandler {
    store: Arc<RwLock<TaskStore>>,
    workflow: Arc<RwLock<WorkflowState>>,
    agents: Arc<RwLock<HashMap<Uuid, AgentHandle>>>,
    workflow_id: Uuid,
    transitions: Arc<AtomicU64>,
}

#[async_trait]
impl EventHandler for CommitHandler {
    fn name(&self) -> &str {
        "commit"
    }

    async fn handle(&self, event: &StatusEvent) -> KanflowResult<()> {
        let ctx = &event.context;
        match ctx.target_status {
            Status::Task(status) => {
                self.store.write().await.set_status(ctx.entity_id, status)?;
            }
            Status::Workflow(status) => {
                if ctx.entity_id != self.workflow_id {
                    return Err(KanflowError::NotFound(format!(
                        "workflow {}",
                        ctx.entity_id
                    )));
                }
                let mut workflow = self.workflow.write().await;
                workflow.status = status;
                if status == WorkflowStatus::Running && workflow.started_at.is_none() {
                    workflow.started_at = Some(Utc::now());
                }
                if status.is_terminal() {
                    workflow.finished_at = Some(Utc::now());
                }
                tracing::info!(workflow_id = %self.workflow_id, status = %status, "workflow status committed");
                let _ = workflow.watch_tx.send(status);
            }
            Status::Agent(status) => {
                let mut agents = self.agents.write().await;
                let agent = agents.get_mut(&ctx.entity_id).ok_or_else(|| {
                    KanflowError::NotFound(format!("agent {}", ctx.entity_id))
                })?;
                agent.status = status;
            }
            Status::Message(_) => {}
        }
        self.transitions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Executes strategy decisions by driving tasks through the pipeline.
struct TeamLauncher {
    store: Arc<RwLock<TaskStore>>,
    workflow: Arc<RwLock<WorkflowState>>,
    pipeline: Arc<TransitionPipeline>,
    executor: Arc<dyn AgentExecutor>,
    inputs: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    workflow_id: Uuid,
}

impl TeamLauncher {
    fn task_ctx(
        &self,
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        operation: &str,
    ) -> TransitionContext {
        TransitionContext::new(EntityKind::Task, task_id, from, to).with_operation(operation)
    }
}

#[async_trait]
impl TaskLauncher for TeamLauncher {
    async fn launch(&self, task_id: Uuid) -> KanflowResult<()> {
        {
            let workflow = self.workflow.read().await;
            if workflow.status != WorkflowStatus::Running {
                tracing::debug!(
                    task_id = %task_id,
                    workflow_status = %workflow.status,
                    "launch suppressed; workflow not running"
                );
                return Ok(());
            }
        }

        let (task, dependency_context) = {
            let store = self.store.read().await;
            let task = store
                .get(task_id)
                .ok_or_else(|| KanflowError::NotFound(format!("task {task_id}")))?
                .clone();
            let dependency_context = store.dependency_context(&task);
            (task, dependency_context)
        };
        if !matches!(task.status, TaskStatus::Todo | TaskStatus::Revise) {
            tracing::debug!(task_id = %task_id, status = %task.status, "launch skipped");
            return Ok(());
        }

        let started = Utc::now();
        self.pipeline
            .emit_transition(
                self.task_ctx(task_id, task.status, TaskStatus::Doing, "start_task")
                    .with_phase(Phase::PreExecution),
            )
            .await?;

        tracing::info!(task_id = %task_id, title = %task.title, "task started");
        let inputs = self.inputs.read().await.clone();
        let outcome = self.executor.perform(&task, &inputs, &dependency_context).await;
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as u64;

        match outcome {
            Ok(result) => {
                let queue_depth = {
                    let mut store = self.store.write().await;
                    store.set_result(task_id, result)?;
                    store.by_status(TaskStatus::Todo).len() as u32
                };
                let target = if task.requires_validation {
                    TaskStatus::AwaitingValidation
                } else {
                    TaskStatus::Done
                };
                self.pipeline
                    .emit_transition(
                        self.task_ctx(task_id, TaskStatus::Doing, target, "complete_task")
                            .with_phase(Phase::Execution)
                            .with_previous_phase(Phase::PreExecution)
                            .with_duration_ms(elapsed)
                            .with_resources(ResourceSnapshot {
                                queue_depth,
                                ..Default::default()
                            })
                            .with_performance(PerformanceSnapshot {
                                latency_ms: elapsed,
                                ..Default::default()
                            }),
                    )
                    .await?;
                Ok(())
            }
            Err(error) => {
                tracing::error!(task_id = %task_id, error = %error, "task execution failed");
                self.pipeline
                    .emit_transition(
                        self.task_ctx(task_id, TaskStatus::Doing, TaskStatus::Error, "fail_task")
                            .with_phase(Phase::Error)
                            .with_previous_phase(Phase::Execution)
                            .with_duration_ms(elapsed)
                            .with_metadata("error", serde_json::json!(error.to_string())),
                    )
                    .await?;
                // The failure is carried by the task status; the strategy
                // decides what it means for the workflow.
                Ok(())
            }
        }
    }

    async fn block_task(&self, task_id: Uuid, reason: &str) -> KanflowResult<()> {
        let current = {
            let store = self.store.read().await;
            store
                .get(task_id)
                .ok_or_else(|| KanflowError::NotFound(format!("task {task_id}")))?
                .status
        };
        if current != TaskStatus::Todo {
            return Ok(());
        }
        tracing::warn!(task_id = %task_id, reason, "blocking task");
        self.pipeline
            .emit_transition(
                self.task_ctx(task_id, current, TaskStatus::Blocked, "block_task")
                    .with_metadata("reason", serde_json::json!(reason)),
            )
            .await?;
        Ok(())
    }

    async fn raise_workflow(&self, status: WorkflowStatus, reason: &str) -> KanflowResult<()> {
        let current = self.workflow.read().await.status;
        if current != WorkflowStatus::Running {
            tracing::debug!(
                current = %current,
                requested = %status,
                "workflow raise skipped; not running"
            );
            return Ok(());
        }
        tracing::warn!(workflow_id = %self.workflow_id, status = %status, reason, "raising workflow");
        self.pipeline
            .emit_transition(
                TransitionContext::new(EntityKind::Workflow, self.workflow_id, current, status)
                    .with_operation("raise_workflow")
                    .with_metadata("reason", serde_json::json!(reason)),
            )
            .await?;
        Ok(())
    }
}

/// A team: declared tasks and agents plus the machinery to run them.
pub struct Team {
    name: String,
    workflow_id: Uuid,
    store: Arc<RwLock<TaskStore>>,
    agents: Arc<RwLock<HashMap<Uuid, AgentHandle>>>,
    workflow: Arc<RwLock<WorkflowState>>,
    watch_rx: watch::Receiver<WorkflowStatus>,
    pipeline: Arc<TransitionPipeline>,
    scheduler: Arc<TaskScheduler>,
    launcher: Arc<TeamLauncher>,
    inputs: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    transitions: Arc<AtomicU64>,
}

impl Team {
    /// Start building a team.
    pub fn builder(name: impl Into<String>) -> TeamBuilder {
        TeamBuilder::new(name)
    }

    /// The team name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the workflow entity.
    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    /// Current workflow status.
    pub async fn workflow_status(&self) -> WorkflowStatus {
        self.workflow.read().await.status
    }

    /// Subscribe to the task snapshot stream.
    pub async fn subscribe(&self) -> broadcast::Receiver<Vec<TaskSnapshot>> {
        self.store.read().await.subscribe()
    }

    /// A watch over the workflow status.
    pub fn watch_workflow(&self) -> watch::Receiver<WorkflowStatus> {
        self.watch_rx.clone()
    }

    /// Run the workflow to a terminal status.
    ///
    /// Interpolates inputs into task descriptions, drives the workflow
    /// `initial` → `running`, launches tasks per the strategy, and waits
    /// until the workflow settles. An `errored` outcome is returned as an
    /// error; `finished`, `blocked`, and `stopped` return the result record.
    pub async fn start(
        &self,
        inputs: HashMap<String, serde_json::Value>,
    ) -> KanflowResult<WorkflowResult> {
        if !inputs.is_empty() {
            self.inputs.write().await.extend(inputs);
        }
        {
            let inputs = self.inputs.read().await.clone();
            self.store.write().await.interpolate_inputs(&inputs);
        }

        // Subscribe before anything runs so no snapshot is missed.
        let scheduler_rx = self.store.read().await.subscribe();
        let mut task_rx = self.store.read().await.subscribe();
        let mut watch_rx = self.watch_rx.clone();

        let task_count = self.store.read().await.len();
        tracing::info!(
            team = %self.name,
            workflow_id = %self.workflow_id,
            strategy = self.scheduler.strategy_name(),
            tasks = task_count,
            "workflow starting"
        );
        self.emit_workflow(WorkflowStatus::Running, "start_workflow").await?;

        let reactive = self
            .scheduler
            .spawn_reactive(scheduler_rx, Arc::clone(&self.launcher) as Arc<dyn TaskLauncher>);
        let kickoff_result = self.scheduler.kickoff(self.launcher.as_ref()).await;
        if let Err(error) = kickoff_result {
            reactive.abort();
            let _ = self
                .launcher
                .raise_workflow(WorkflowStatus::Errored, &error.to_string())
                .await;
            return Err(error);
        }

        loop {
            let status = *watch_rx.borrow_and_update();
            if status.is_terminal() {
                break;
            }
            if status == WorkflowStatus::Running {
                let (all_terminal, any_failed, deliverable) = {
                    let store = self.store.read().await;
                    (store.all_terminal(), store.any_failed(), store.deliverable_result())
                };
                // Failures settle through the strategy's raise; only an
                // all-success board finishes here.
                if all_terminal && !any_failed {
                    self.workflow.write().await.result = deliverable;
                    if let Err(error) =
                        self.emit_workflow(WorkflowStatus::Finished, "finish_workflow").await
                    {
                        reactive.abort();
                        return Err(error);
                    }
                    continue;
                }
            }
            tokio::select! {
                changed = watch_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = task_rx.recv() => {
                    if matches!(received, Err(broadcast::error::RecvError::Closed)) {
                        break;
                    }
                }
            }
        }
        reactive.abort();

        let stats = self.get_workflow_stats().await;
        tracing::info!(team = %self.name, summary = %stats.summary(), "workflow settled");
        let (status, result) = {
            let workflow = self.workflow.read().await;
            (workflow.status, workflow.result.clone())
        };
        if status == WorkflowStatus::Errored {
            return Err(KanflowError::Workflow(format!(
                "workflow '{}' errored; see task statuses for details",
                self.name
            )));
        }
        Ok(WorkflowResult {
            status,
            result,
            stats,
        })
    }

    /// Suspend a running workflow. No new tasks launch until resumed.
    pub async fn pause(&self) -> KanflowResult<()> {
        self.emit_workflow(WorkflowStatus::Paused, "pause_workflow").await
    }

    /// Resume a paused workflow and relaunch whatever is runnable.
    pub async fn resume(&self) -> KanflowResult<()> {
        self.emit_workflow(WorkflowStatus::Running, "resume_workflow").await?;
        self.scheduler.kickoff(self.launcher.as_ref()).await
    }

    /// Stop the workflow: `stopping`, then `stopped`.
    pub async fn stop(&self) -> KanflowResult<()> {
        self.emit_workflow(WorkflowStatus::Stopping, "stop_workflow").await?;
        self.emit_workflow(WorkflowStatus::Stopped, "stop_workflow").await
    }

    /// Attach reviewer feedback to a task and send it back for rework.
    ///
    /// Legal only while the task is `doing` or `awaiting_validation`; the
    /// task moves to `revise` and the strategy relaunches it with the
    /// feedback attached.
    pub async fn provide_feedback(
        &self,
        task_id: Uuid,
        feedback: impl Into<String>,
    ) -> KanflowResult<()> {
        let current = {
            let mut store = self.store.write().await;
            store.add_feedback(task_id, feedback)?;
            store
                .get(task_id)
                .ok_or_else(|| KanflowError::NotFound(format!("task {task_id}")))?
                .status
        };
        self.pipeline
            .emit_transition(
                TransitionContext::new(EntityKind::Task, task_id, current, TaskStatus::Revise)
                    .with_operation("provide_feedback"),
            )
            .await?;
        Ok(())
    }

    /// Approve a task awaiting validation: `validated`, then `done`.
    pub async fn validate_task(&self, task_id: Uuid) -> KanflowResult<()> {
        let current = {
            let store = self.store.read().await;
            store
                .get(task_id)
                .ok_or_else(|| KanflowError::NotFound(format!("task {task_id}")))?
                .status
        };
        self.pipeline
            .emit_transition(
                TransitionContext::new(EntityKind::Task, task_id, current, TaskStatus::Validated)
                    .with_operation("validate_task"),
            )
            .await?;
        self.pipeline
            .emit_transition(
                TransitionContext::new(
                    EntityKind::Task,
                    task_id,
                    TaskStatus::Validated,
                    TaskStatus::Done,
                )
                .with_operation("validate_task"),
            )
            .await?;
        Ok(())
    }

    /// Report an agent's status change through the pipeline.
    pub async fn set_agent_status(
        &self,
        agent_id: Uuid,
        status: AgentStatus,
    ) -> KanflowResult<()> {
        let current = {
            let agents = self.agents.read().await;
            agents
                .get(&agent_id)
                .ok_or_else(|| KanflowError::NotFound(format!("agent {agent_id}")))?
                .status
        };
        self.pipeline
            .emit_transition(
                TransitionContext::new(EntityKind::Agent, agent_id, current, status)
                    .with_operation("report_agent_status"),
            )
            .await?;
        Ok(())
    }

    /// A task by id.
    pub async fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.store.read().await.get(task_id).cloned()
    }

    /// Tasks currently in the given status, in declaration order.
    pub async fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.store
            .read()
            .await
            .by_status(status)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Registered agents.
    pub async fn get_agents(&self) -> Vec<AgentHandle> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Point-in-time workflow statistics.
    pub async fn get_workflow_stats(&self) -> WorkflowStats {
        let (status, started_at, finished_at) = {
            let workflow = self.workflow.read().await;
            (workflow.status, workflow.started_at, workflow.finished_at)
        };
        let (total_tasks, task_counts) = {
            let store = self.store.read().await;
            (store.len(), store.status_counts())
        };
        let duration_ms = match (started_at, finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            (Some(start), None) => (Utc::now() - start).num_milliseconds().max(0) as u64,
            _ => 0,
        };
        WorkflowStats {
            status,
            strategy: self.scheduler.strategy_name().to_string(),
            started_at,
            finished_at,
            duration_ms,
            total_tasks,
            task_counts,
            transitions_recorded: self.transitions.load(Ordering::Relaxed),
        }
    }

    async fn emit_workflow(
        &self,
        target: WorkflowStatus,
        operation: &str,
    ) -> KanflowResult<()> {
        let current = self.workflow.read().await.status;
        self.pipeline
            .emit_transition(
                TransitionContext::new(EntityKind::Workflow, self.workflow_id, current, target)
                    .with_operation(operation),
            )
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Team")
            .field("name", &self.name)
            .field("workflow_id", &self.workflow_id)
            .field("strategy", &self.scheduler.strategy_name())
            .finish()
    }
}

/// Builder for [`Team`], with injectable rules and metrics.
pub struct TeamBuilder {
    name: String,
    tasks: Vec<Task>,
    agents: Vec<AgentHandle>,
    executor: Option<Arc<dyn AgentExecutor>>,
    kind: WorkflowKind,
    inputs: HashMap<String, serde_json::Value>,
    registry: Option<Arc<RuleRegistry>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl TeamBuilder {
    /// Start a builder for a team with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            agents: Vec::new(),
            executor: None,
            kind: WorkflowKind::Auto,
            inputs: HashMap::new(),
            registry: None,
            metrics: None,
        }
    }

    /// Declare one task.
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Declare several tasks.
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Register an agent.
    pub fn agent(mut self, agent: AgentHandle) -> Self {
        self.agents.push(agent);
        self
    }

    /// Inject the executor that performs tasks.
    pub fn executor(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Force a scheduling strategy instead of auto-detecting one.
    pub fn workflow_kind(mut self, kind: WorkflowKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set a default workflow input.
    pub fn input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// Inject a custom transition rule registry.
    pub fn registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Inject a metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wire the team.
    ///
    /// Fails when no executor was injected, when a task declares a cyclic
    /// or unknown dependency, when the rule tables fail their reachability
    /// check, or when the task shape does not fit the requested strategy.
    pub fn build(self) -> KanflowResult<Team> {
        let executor = self
            .executor
            .ok_or_else(|| KanflowError::Workflow("an agent executor is required".into()))?;

        // A cyclic or dangling task graph would never settle; reject it here.
        let mut edges: HashMap<Uuid, Vec<Uuid>> = HashMap::with_capacity(self.tasks.len());
        let mut titles: HashMap<Uuid, String> = HashMap::with_capacity(self.tasks.len());
        for task in &self.tasks {
            edges.insert(task.id, task.dependencies.clone());
            titles.insert(task.id, task.title.clone());
        }
        verify_graph(&edges, |id| {
            titles.get(&id).cloned().unwrap_or_else(|| id.to_string())
        })?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(RuleRegistry::with_defaults()));
        for kind in [
            EntityKind::Task,
            EntityKind::Agent,
            EntityKind::Workflow,
            EntityKind::Message,
        ] {
            registry.verify_reachability(kind, initial_status(kind))?;
        }
        let strategy = strategy_for(self.kind, &self.tasks)?;
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NullMetrics));

        let workflow_id = Uuid::new_v4();
        let (watch_tx, watch_rx) = watch::channel(WorkflowStatus::Initial);
        let workflow = Arc::new(RwLock::new(WorkflowState {
            status: WorkflowStatus::Initial,
            result: None,
            started_at: None,
            finished_at: None,
            watch_tx,
        }));
        let store = Arc::new(RwLock::new(TaskStore::new(self.tasks)));
        let agents = Arc::new(RwLock::new(
            self.agents
                .into_iter()
                .map(|a| (a.id, a))
                .collect::<HashMap<_, _>>(),
        ));
        let inputs = Arc::new(RwLock::new(self.inputs));
        let transitions = Arc::new(AtomicU64::new(0));

        let validator = Arc::new(StatusValidator::new(registry));
        let mut pipeline = TransitionPipeline::new(validator, metrics);
        pipeline.register(
            StatusEventType::Transition,
            Arc::new(CommitHandler {
                store: Arc::clone(&store),
                workflow: Arc::clone(&workflow),
                agents: Arc::clone(&agents),
                workflow_id,
                transitions: Arc::clone(&transitions),
            }),
        );
        let pipeline = Arc::new(pipeline);

        let launcher = Arc::new(TeamLauncher {
            store: Arc::clone(&store),
            workflow: Arc::clone(&workflow),
            pipeline: Arc::clone(&pipeline),
            executor,
            inputs: Arc::clone(&inputs),
            workflow_id,
        });
        let scheduler = Arc::new(TaskScheduler::new(strategy, Arc::clone(&store)));

        Ok(Team {
            name: self.name,
            workflow_id,
            store,
            agents,
            workflow,
            watch_rx,
            pipeline,
            scheduler,
            launcher,
            inputs,
            transitions,
        })
    }
}
