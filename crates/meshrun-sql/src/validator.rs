//! Single-query validation using sqlparser-rs

use meshrun_core::{Diagnostic, DialectConfig, ErrorCode};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, DuckDbDialect, GenericDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

/// SQL validator with configurable dialect
pub struct SqlValidator {
    dialect: Box<dyn Dialect>,
}

impl SqlValidator {
    /// Create a validator for DuckDB SQL
    pub fn new() -> Self {
        Self {
            dialect: Box::new(DuckDbDialect {}),
        }
    }

    /// Create a validator for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a validator for generic ANSI SQL
    pub fn ansi() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }

    /// Create a validator from a dialect config
    pub fn from_dialect(dialect: &DialectConfig) -> Self {
        match dialect {
            DialectConfig::DuckDb => Self::new(),
            DialectConfig::Postgres => Self::postgres(),
            DialectConfig::Ansi => Self::ansi(),
        }
    }

    /// Check that `sql` is exactly one query statement
    ///
    /// `SELECT`, `WITH ... SELECT`, `VALUES` and set operations all parse
    /// as queries. A trailing semicolon is fine.
    pub fn validate(&self, sql: &str) -> Result<ValidatedQuery, SqlValidationError> {
        let statements = Parser::parse_sql(&*self.dialect, sql)
            .map_err(|e| SqlValidationError::Parse(e.to_string()))?;

        match statements.as_slice() {
            [] => Err(SqlValidationError::Empty),
            [Statement::Query(_)] => Ok(ValidatedQuery {
                sql: sql.trim().trim_end_matches(';').trim_end().to_string(),
            }),
            [other] => Err(SqlValidationError::NotAQuery(statement_kind(other))),
            many => Err(SqlValidationError::MultipleStatements(many.len())),
        }
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading keyword of a statement, e.g. `DROP`
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// A query that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    /// Query text without a trailing semicolon, ready to embed
    pub sql: String,
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlValidationError {
    #[error("Failed to parse SQL: {0}")]
    Parse(String),

    #[error("Model body is empty")]
    Empty,

    #[error("Expected a single query, found {0} statements")]
    MultipleStatements(usize),

    #[error("Expected a query, found a {0} statement")]
    NotAQuery(String),
}

impl SqlValidationError {
    pub fn to_diagnostic(&self, model: &str) -> Diagnostic {
        Diagnostic::new(ErrorCode::SqlValidation, format!("model '{}': {}", model, self))
    }
}
