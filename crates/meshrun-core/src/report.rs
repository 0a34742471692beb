//! Run report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::Diagnostic;
use crate::model::Materialization;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Final status of a model in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome for a single model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResult {
    /// Model name
    pub model_name: String,

    /// Final status
    pub status: RunStatus,

    /// Materialization, when the model got far enough to know it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialization: Option<Materialization>,

    /// Error detail for failed and skipped models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<Diagnostic>,

    /// Wall-clock time spent executing the model
    #[serde(default)]
    pub duration_ms: u64,
}

impl ModelResult {
    pub fn succeeded(model_name: impl Into<String>, materialization: Materialization, duration_ms: u64) -> Self {
        Self {
            model_name: model_name.into(),
            status: RunStatus::Succeeded,
            materialization: Some(materialization),
            error_detail: None,
            duration_ms,
        }
    }

    pub fn failed(model_name: impl Into<String>, error: Diagnostic) -> Self {
        Self {
            model_name: model_name.into(),
            status: RunStatus::Failed,
            materialization: None,
            error_detail: Some(error),
            duration_ms: 0,
        }
    }

    pub fn skipped(model_name: impl Into<String>, reason: Diagnostic) -> Self {
        Self {
            model_name: model_name.into(),
            status: RunStatus::Skipped,
            materialization: None,
            error_detail: Some(reason),
            duration_ms: 0,
        }
    }

    pub fn with_materialization(mut self, materialization: Materialization) -> Self {
        self.materialization = Some(materialization);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Summary statistics for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Run report (run_results.json v1)
///
/// Results are listed in execution order. When the run aborts before
/// execution, models are listed in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Project that was run
    pub project_name: String,

    /// True when a configuration error stopped the run before execution
    pub aborted: bool,

    /// True when the run was interrupted
    pub cancelled: bool,

    /// Summary statistics
    pub summary: RunSummary,

    /// Per-model outcomes
    pub results: Vec<ModelResult>,
}

impl RunReport {
    /// Create a new empty report
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            project_name: project_name.into(),
            aborted: false,
            cancelled: false,
            summary: RunSummary::default(),
            results: Vec::new(),
        }
    }

    /// Add a model outcome to the report
    pub fn push(&mut self, result: ModelResult) {
        match result.status {
            RunStatus::Succeeded => self.summary.succeeded += 1,
            RunStatus::Failed => self.summary.failed += 1,
            RunStatus::Skipped => self.summary.skipped += 1,
        }

        self.summary.total += 1;
        self.results.push(result);
    }

    /// Check if any model failed
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Look up a model's outcome
    pub fn get(&self, model_name: &str) -> Option<&ModelResult> {
        self.results.iter().find(|r| r.model_name == model_name)
    }

    /// `(model_name, status)` pairs in report order
    pub fn statuses(&self) -> Vec<(&str, RunStatus)> {
        self.results
            .iter()
            .map(|r| (r.model_name.as_str(), r.status))
            .collect()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }
}
