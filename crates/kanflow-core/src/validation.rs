//! Structured validation results returned by the status validator and
//! event-handler validation phase.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single validation error or warning with a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable code from [`crate::error::codes`].
    pub code: String,
    /// Human-readable detail.
    pub message: String,
    /// The offending field, when the issue concerns one.
    pub field: Option<String>,
}

impl ValidationIssue {
    /// Create an issue with the given stable code and message.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    /// Name the field this issue concerns.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {} (field: {field})", self.code, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// The aggregated outcome of validating a transition context or an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the subject passed validation.
    pub is_valid: bool,
    /// Errors that made the subject invalid.
    pub errors: Vec<ValidationIssue>,
    /// Non-fatal findings.
    pub warnings: Vec<ValidationIssue>,
    /// Echoed context for downstream consumers (entity, transition label,
    /// phase/operation/timing on success; hints such as available
    /// transitions on failure).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationResult {
    /// A passing result with no findings.
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// A failing result carrying one error.
    pub fn failure(issue: ValidationIssue) -> Self {
        Self {
            is_valid: false,
            errors: vec![issue],
            warnings: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Append a warning without affecting validity.
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Fold another result into this one: validity is the conjunction,
    /// findings and metadata are unioned.
    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.metadata.extend(other.metadata);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}
