//! The 4-stage transition emission pipeline.
//!
//! `emit_transition` drives `pre-transition` → `transition` →
//! `post-transition` for a proposed change, and routes any stage failure to
//! an `error` event before re-throwing to the caller. A built-in
//! pre-transition handler runs the [`StatusValidator`] so every registered
//! emitter gets the same veto behavior; a built-in transition handler
//! records a wall-clock metric per commit.

use crate::events::{EventHandler, StatusEvent, StatusEventBus, StatusEventType};
use crate::metrics::{MetricsSink, TransitionMetric};
use crate::validator::StatusValidator;
use async_trait::async_trait;
use kanflow_core::{KanflowResult, TransitionContext, ValidationResult};
use std::sync::Arc;

/// Pre-transition handler that vetoes transitions the validator rejects.
struct TransitionValidationHandler {
    validator: Arc<StatusValidator>,
}

#[async_trait]
impl EventHandler for TransitionValidationHandler {
    fn name(&self) -> &str {
        "transition-validation"
    }

    async fn validate(&self, event: &StatusEvent) -> ValidationResult {
        self.validator.validate_transition(&event.context).await
    }

    async fn handle(&self, _event: &StatusEvent) -> KanflowResult<()> {
        Ok(())
    }
}

/// Transition handler that records one metric per commit, valued at the
/// wall-clock time since the context's `started_at`.
struct MetricsHandler {
    sink: Arc<dyn MetricsSink>,
}

#[async_trait]
impl EventHandler for MetricsHandler {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn handle(&self, event: &StatusEvent) -> KanflowResult<()> {
        let metric = TransitionMetric::from_context(&event.context);
        tracing::debug!(
            entity = %metric.entity_kind,
            entity_id = %metric.entity_id,
            transition = %metric.transition,
            elapsed_ms = metric.elapsed_ms,
            "transition committed"
        );
        self.sink.track(metric);
        Ok(())
    }
}

/// Drives the transition protocol over a [`StatusEventBus`].
///
/// Constructed explicitly and injected into the aggregate; there is no
/// process-global instance. Handlers (commit, observers) are registered
/// during wiring, then the pipeline is shared behind an `Arc`.
pub struct TransitionPipeline {
    validator: Arc<StatusValidator>,
    bus: StatusEventBus,
}

impl TransitionPipeline {
    /// Create a pipeline with the validation and metrics handlers installed.
    pub fn new(validator: Arc<StatusValidator>, metrics: Arc<dyn MetricsSink>) -> Self {
        let mut bus = StatusEventBus::new();
        bus.on(
            StatusEventType::PreTransition,
            Arc::new(TransitionValidationHandler {
                validator: Arc::clone(&validator),
            }),
        );
        bus.on(
            StatusEventType::Transition,
            Arc::new(MetricsHandler { sink: metrics }),
        );
        Self { validator, bus }
    }

    /// Register an additional handler (commit handlers, observers).
    pub fn register(&mut self, event_type: StatusEventType, handler: Arc<dyn EventHandler>) {
        self.bus.on(event_type, handler);
    }

    /// Deregister a handler by name.
    pub fn deregister(&mut self, event_type: StatusEventType, name: &str) -> bool {
        self.bus.off(event_type, name)
    }

    /// The validator backing the pre-transition veto.
    pub fn validator(&self) -> &Arc<StatusValidator> {
        &self.validator
    }

    /// The underlying bus, for emitting non-protocol events directly.
    pub fn bus(&self) -> &StatusEventBus {
        &self.bus
    }

    /// Run the full transition protocol for a proposed change.
    ///
    /// Stages: (a) `pre-transition` — handler validation may veto;
    /// (b) `transition` — commit handlers persist the change, the metrics
    /// handler records timing; (c) `post-transition`. On any stage failure
    /// an `error` event is emitted (best effort) and the original error is
    /// returned — callers must not assume state was applied past the
    /// failing stage.
    ///
    /// Returns the pre-transition stage's aggregated validation result,
    /// which echoes the entity, transition label, and domain metadata.
    pub async fn emit_transition(
        &self,
        ctx: TransitionContext,
    ) -> KanflowResult<ValidationResult> {
        match self.run_stages(&ctx).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(
                    entity = %ctx.entity_kind,
                    entity_id = %ctx.entity_id,
                    transition = %ctx.transition_label(),
                    error = %err,
                    "transition failed"
                );
                let error_event =
                    StatusEvent::new(StatusEventType::Error, ctx).with_error(err.to_string());
                if let Err(emit_err) = self.bus.emit(&error_event).await {
                    tracing::warn!(error = %emit_err, "error-event emission failed");
                }
                Err(err)
            }
        }
    }

    async fn run_stages(&self, ctx: &TransitionContext) -> KanflowResult<ValidationResult> {
        let pre = self
            .bus
            .emit(&StatusEvent::new(StatusEventType::PreTransition, ctx.clone()))
            .await?;
        self.bus
            .emit(&StatusEvent::new(StatusEventType::Transition, ctx.clone()))
            .await?;
        self.bus
            .emit(&StatusEvent::new(
                StatusEventType::PostTransition,
                ctx.clone(),
            ))
            .await?;
        Ok(pre)
    }
}

impl std::fmt::Debug for TransitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionPipeline")
            .field("bus", &self.bus)
            .finish()
    }
}
