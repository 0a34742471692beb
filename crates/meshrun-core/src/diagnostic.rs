//! Error codes and per-model error details
//!
//! IMPORTANT: Error codes are versioned and stable.
//! NEVER rename or remove codes - they appear in run_results.json.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Error code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration-time errors (fatal, abort before execution)
    /// A reference marker names a source or model that is not declared
    UnresolvedReference,

    /// A reference marker resolves to a physical name claimed by two entities
    AmbiguousReference,

    /// The model graph contains a cycle
    CyclicDependency,

    /// The resolved model body is not a single valid query
    SqlValidation,

    /// The project could not be loaded (bad config, duplicate names, IO)
    InvalidProject,

    /// Template rendering failed for a reason other than a bad reference
    TemplateError,

    // Execution-time errors (local to a model's subtree)
    /// The warehouse rejected a materialization statement
    EngineExecution,

    /// An upstream model failed, so this model was not attempted
    UpstreamFailed,

    /// The run was cancelled before this model started
    Cancelled,

    /// The run aborted on another model's configuration error
    RunAborted,
}

impl ErrorCode {
    /// Get the error code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::AmbiguousReference => "AMBIGUOUS_REFERENCE",
            Self::CyclicDependency => "CYCLIC_DEPENDENCY",
            Self::SqlValidation => "SQL_VALIDATION",
            Self::InvalidProject => "INVALID_PROJECT",
            Self::TemplateError => "TEMPLATE_ERROR",
            Self::EngineExecution => "ENGINE_EXECUTION",
            Self::UpstreamFailed => "UPSTREAM_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::RunAborted => "RUN_ABORTED",
        }
    }

    /// Whether this code aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference
                | Self::AmbiguousReference
                | Self::CyclicDependency
                | Self::SqlValidation
                | Self::InvalidProject
                | Self::TemplateError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error detail attached to a failed or skipped model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable error code
    pub code: ErrorCode,

    /// Human-readable message (engine messages are kept verbatim)
    pub message: String,

    /// Models that were skipped because of this failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impact: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            impact: Vec::new(),
        }
    }

    /// Set downstream impact
    pub fn with_impact(mut self, impact: Vec<String>) -> Self {
        self.impact = impact;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
