//! Warehouse trait for materializing models

use meshrun_core::{Diagnostic, ErrorCode, Materialization, Relation};

/// Errors reported by a warehouse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The warehouse rejected a statement; `message` is the engine's text verbatim
    #[error("{relation}: {message}")]
    Statement { relation: String, message: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

impl ExecutionError {
    pub fn statement(relation: &Relation, message: impl Into<String>) -> Self {
        Self::Statement {
            relation: relation.to_string(),
            message: message.into(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(ErrorCode::EngineExecution, self.to_string())
    }
}

/// A SQL engine models are materialized into
///
/// Both operations are idempotent: running them again with the same
/// statement leaves the warehouse in the same state. `select` is a single
/// validated query.
pub trait Warehouse: Send + Sync {
    /// Adapter name (e.g., "DuckDB")
    fn name(&self) -> &'static str;

    /// Create or replace `relation` as a view over `select`
    fn create_view(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError>;

    /// Rebuild `relation` as a table holding the rows of `select`
    ///
    /// Readers see either the previous contents or the new contents, never
    /// a partial table. On failure the previous contents are kept.
    fn create_table(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError>;

    /// Dispatch on materialization
    fn materialize(
        &self,
        materialization: Materialization,
        relation: &Relation,
        select: &str,
    ) -> Result<(), ExecutionError> {
        match materialization {
            Materialization::View => self.create_view(relation, select),
            Materialization::Table => self.create_table(relation, select),
        }
    }
}
