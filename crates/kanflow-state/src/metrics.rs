//! Per-transition timing metrics and the injected sink contract.
//!
//! The engine defines the call shape only; storage and formatting belong to
//! the embedding application.

use chrono::{DateTime, Utc};
use kanflow_core::{EntityKind, TransitionContext};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded transition measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionMetric {
    /// Kind of the transitioned entity.
    pub entity_kind: EntityKind,
    /// Id of the transitioned entity.
    pub entity_id: Uuid,
    /// Operation that drove the transition.
    pub operation: String,
    /// The `"from -> to"` label.
    pub transition: String,
    /// Wall-clock milliseconds since the context's `started_at`.
    pub elapsed_ms: u64,
    /// When the metric was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl TransitionMetric {
    /// Build a metric from a committed transition context.
    pub fn from_context(ctx: &TransitionContext) -> Self {
        Self {
            entity_kind: ctx.entity_kind,
            entity_id: ctx.entity_id,
            operation: ctx.operation.clone(),
            transition: ctx.transition_label(),
            elapsed_ms: ctx.elapsed_ms().unwrap_or(0),
            recorded_at: Utc::now(),
        }
    }
}

/// Injected sink for transition metrics.
pub trait MetricsSink: Send + Sync {
    /// Record one measurement. Must not block.
    fn track(&self, metric: TransitionMetric);
}

/// Sink that discards every metric.
#[derive(Debug, Default)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn track(&self, _metric: TransitionMetric) {}
}

/// Sink that keeps every metric in memory. Used by tests and workflow stats.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    records: Mutex<Vec<TransitionMetric>>,
}

impl InMemoryMetrics {
    /// An empty in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded metrics.
    pub fn count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// A copy of every recorded metric, in recording order.
    pub fn recorded(&self) -> Vec<TransitionMetric> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn track(&self, metric: TransitionMetric) {
        if let Ok(mut records) = self.records.lock() {
            records.push(metric);
        }
    }
}
