//! The staged status validator.
//!
//! Validation runs a fixed sequence of checks and short-circuits on the
//! first failing stage: required fields, phase legality, status membership,
//! rule-set presence, structural rule match, then guard predicates. Every
//! failure carries a stable code so callers can branch programmatically.

use crate::rules::RuleRegistry;
use kanflow_core::{
    codes, EntityKind, Status, TransitionContext, ValidationIssue, ValidationResult,
};
use std::sync::Arc;
use uuid::Uuid;

/// Validates proposed transitions against the rule registry.
///
/// Read-mostly and immutable after construction; share freely via `Arc`.
#[derive(Debug, Clone)]
pub struct StatusValidator {
    registry: Arc<RuleRegistry>,
}

impl StatusValidator {
    /// Create a validator over the given registry.
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this validator checks against.
    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Validate a proposed transition, short-circuiting on the first
    /// failing stage. A passing result echoes the entity, the transition
    /// label, and the domain metadata so downstream consumers need not
    /// re-derive them.
    pub async fn validate_transition(&self, ctx: &TransitionContext) -> ValidationResult {
        // Stage 1: required fields.
        if ctx.entity_id == Uuid::nil() {
            return ValidationResult::failure(
                ValidationIssue::new(codes::FIELD_MISSING, "entity_id must be set")
                    .with_field("entity_id"),
            );
        }
        if ctx.operation.is_empty() {
            return ValidationResult::failure(
                ValidationIssue::new(codes::FIELD_MISSING, "operation must be non-empty")
                    .with_field("operation"),
            );
        }
        if ctx.started_at.is_none() {
            return ValidationResult::failure(
                ValidationIssue::new(codes::FIELD_MISSING, "started_at must be set")
                    .with_field("started_at"),
            );
        }

        // Stage 2: phase legality, evaluated per-call against the recorded
        // predecessor only. A context with no recorded predecessor is
        // phase-legal in isolation.
        if let Some(previous) = ctx.previous_phase {
            if !previous.can_transition_to(ctx.phase) {
                return ValidationResult::failure(
                    ValidationIssue::new(
                        codes::PHASE_TRANSITION_INVALID,
                        format!("phase '{previous}' cannot transition to '{}'", ctx.phase),
                    )
                    .with_field("phase"),
                );
            }
        }

        // Stage 3: both statuses must belong to the entity kind's enumeration.
        for (label, status) in [
            ("current_status", ctx.current_status),
            ("target_status", ctx.target_status),
        ] {
            if status.kind() != ctx.entity_kind {
                return ValidationResult::failure(
                    ValidationIssue::new(
                        codes::STATUS_KIND_MISMATCH,
                        format!(
                            "status '{status}' belongs to kind '{}', not '{}'",
                            status.kind(),
                            ctx.entity_kind
                        ),
                    )
                    .with_field(label),
                );
            }
        }

        // Stage 4: the kind must have a registered rule set.
        let Some(rules) = self.registry.rules_for(ctx.entity_kind) else {
            return ValidationResult::failure(ValidationIssue::new(
                codes::RULES_NOT_REGISTERED,
                format!("no rule set registered for entity kind '{}'", ctx.entity_kind),
            ));
        };

        // Stage 5: at least one rule must structurally match.
        let matching: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.matches(ctx.current_status, ctx.target_status))
            .map(|(index, _)| index)
            .collect();

        if matching.is_empty() {
            let allowed = self.available_transitions(ctx.current_status, ctx.entity_kind);
            let allowed_names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return ValidationResult::failure(ValidationIssue::new(
                codes::STATE_TRANSITION_INVALID,
                format!(
                    "transition {} invalid for {}; allowed: {{{}}}",
                    ctx.transition_label(),
                    ctx.entity_kind,
                    allowed_names.join(", ")
                ),
            ))
            .with_metadata(
                "available_transitions",
                serde_json::json!(allowed_names),
            );
        }

        // Stage 6: every matching rule with a guard must pass.
        for index in matching {
            if let Some(guard) = &rules[index].guard {
                if !guard(ctx).await {
                    return ValidationResult::failure(ValidationIssue::new(
                        codes::GUARD_REJECTED,
                        format!(
                            "guard on rule {index} rejected transition {} for {}",
                            ctx.transition_label(),
                            ctx.entity_kind
                        ),
                    ));
                }
            }
        }

        ValidationResult::ok()
            .with_metadata("entity", serde_json::json!(ctx.entity_kind.to_string()))
            .with_metadata("transition", serde_json::json!(ctx.transition_label()))
            .with_metadata(
                "domain",
                serde_json::json!({
                    "phase": ctx.phase.to_string(),
                    "operation": ctx.operation,
                    "started_at": ctx.started_at,
                    "duration_ms": ctx.duration_ms,
                }),
            )
    }

    /// The union of every rule's `to` set where `from` matches the given
    /// status, deduplicated in order of first appearance. Used to build
    /// actionable rejection messages.
    pub fn available_transitions(&self, status: Status, kind: EntityKind) -> Vec<Status> {
        let Some(rules) = self.registry.rules_for(kind) else {
            return Vec::new();
        };
        let mut seen = Vec::new();
        for rule in rules {
            if rule.from.contains(status) {
                for &target in &rule.to.0 {
                    if !seen.contains(&target) {
                        seen.push(target);
                    }
                }
            }
        }
        seen
    }
}
