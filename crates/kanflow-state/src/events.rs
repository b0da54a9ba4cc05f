//! Typed status events and the publish/subscribe bus.
//!
//! Emission follows a strict two-phase protocol: every registered handler's
//! `validate` is awaited before any handler's `handle` runs. A single
//! invalid verdict vetoes the whole emission and no side effects execute.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use kanflow_core::{KanflowError, KanflowResult, TransitionContext, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The four event types of the transition protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusEventType {
    /// Proposed transition, before commit. Handlers may veto.
    PreTransition,
    /// The commit point: handlers persist the change and record metrics.
    Transition,
    /// After commit. For observers that must only see committed state.
    PostTransition,
    /// A stage failed; carries the error text.
    Error,
}

impl std::fmt::Display for StatusEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusEventType::PreTransition => "status:pre-transition",
            StatusEventType::Transition => "status:transition",
            StatusEventType::PostTransition => "status:post-transition",
            StatusEventType::Error => "status:error",
        };
        write!(f, "{name}")
    }
}

/// One event flowing through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Which stage of the protocol this event belongs to.
    pub event_type: StatusEventType,
    /// The transition context the event describes.
    pub context: TransitionContext,
    /// When the event was built.
    pub emitted_at: DateTime<Utc>,
    /// The failure text, on `Error` events.
    pub error: Option<String>,
}

impl StatusEvent {
    /// Build an event for the given stage and context.
    pub fn new(event_type: StatusEventType, context: TransitionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            context,
            emitted_at: Utc::now(),
            error: None,
        }
    }

    /// Attach a failure description (for `Error` events).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A named event handler with separate validation and side-effect methods.
///
/// `validate` runs for every registered handler before any `handle` does;
/// the default implementation accepts everything.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name, used for deregistration and diagnostics.
    fn name(&self) -> &str;

    /// Inspect the event; an invalid result vetoes the whole emission.
    async fn validate(&self, _event: &StatusEvent) -> ValidationResult {
        ValidationResult::ok()
    }

    /// Run the handler's side effect. Only called after every handler
    /// validated the event.
    async fn handle(&self, event: &StatusEvent) -> KanflowResult<()>;
}

/// A minimal typed event bus.
///
/// Handlers are registered during wiring (`&mut self`) and the bus is then
/// shared immutably; emission never mutates it.
#[derive(Default)]
pub struct StatusEventBus {
    handlers: HashMap<StatusEventType, Vec<Arc<dyn EventHandler>>>,
}

impl StatusEventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an event type.
    pub fn on(&mut self, event_type: StatusEventType, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Deregister the handler with the given name. Returns whether one was removed.
    pub fn off(&mut self, event_type: StatusEventType, name: &str) -> bool {
        if let Some(handlers) = self.handlers.get_mut(&event_type) {
            let before = handlers.len();
            handlers.retain(|h| h.name() != name);
            return handlers.len() < before;
        }
        false
    }

    /// Number of handlers registered for an event type.
    pub fn handler_count(&self, event_type: StatusEventType) -> usize {
        self.handlers.get(&event_type).map_or(0, Vec::len)
    }

    /// Emit an event to every handler registered for its type.
    ///
    /// Protocol:
    /// 1. No handlers: log and return Ok — unhandled events are permitted.
    /// 2. Await every handler's `validate` concurrently; aggregate all
    ///    findings. Any invalid verdict rejects the emission with
    ///    [`KanflowError::EventRejected`] and no `handle` runs.
    /// 3. Await every handler's `handle` concurrently; the first handler
    ///    failure fails the emission.
    ///
    /// Returns the aggregated (valid) validation result, so callers get the
    /// handlers' echoed metadata and warnings.
    pub async fn emit(&self, event: &StatusEvent) -> KanflowResult<ValidationResult> {
        let Some(handlers) = self.handlers.get(&event.event_type) else {
            tracing::debug!(
                event_type = %event.event_type,
                event_id = %event.id,
                "no handlers registered; event dropped"
            );
            return Ok(ValidationResult::ok());
        };

        let verdicts = join_all(handlers.iter().map(|h| h.validate(event))).await;
        let mut aggregated = ValidationResult::ok();
        for verdict in verdicts {
            aggregated.merge(verdict);
        }

        if !aggregated.is_valid {
            tracing::warn!(
                event_type = %event.event_type,
                event_id = %event.id,
                errors = aggregated.errors.len(),
                "event rejected by handler validation"
            );
            return Err(KanflowError::EventRejected {
                event_type: event.event_type.to_string(),
                event_id: event.id,
                issues: aggregated.errors,
            });
        }

        try_join_all(handlers.iter().map(|h| h.handle(event))).await?;

        Ok(aggregated)
    }
}

impl std::fmt::Debug for StatusEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .handlers
            .iter()
            .map(|(t, hs)| (t.to_string(), hs.len()))
            .collect();
        f.debug_struct("StatusEventBus")
            .field("handlers", &counts)
            .finish()
    }
}
