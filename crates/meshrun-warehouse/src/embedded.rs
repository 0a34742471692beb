//! Embedded DuckDB warehouse
//!
//! Views are replaced with `CREATE OR REPLACE VIEW`. Tables are rebuilt
//! inside a transaction with `CREATE OR REPLACE TABLE ... AS`, so a failed
//! rebuild rolls back to the previous table. A relation that changes kind
//! (view to table or back) has the old object dropped in the same step.

use duckdb::types::Value;
use duckdb::Connection;
use meshrun_core::Relation;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use crate::adapter::{ExecutionError, Warehouse};

/// Kind of an existing relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Table,
    View,
}

/// DuckDB database, in a file or in memory
pub struct DuckDbWarehouse {
    conn: Mutex<Connection>,
    location: String,
}

impl DuckDbWarehouse {
    /// Open a database file (`:memory:` opens an in-memory database)
    pub fn open(location: &str) -> Result<Self, ExecutionError> {
        if location == ":memory:" {
            return Self::open_in_memory();
        }

        if let Some(parent) = Path::new(location).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ExecutionError::Connection(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(location)
            .map_err(|e| ExecutionError::Connection(format!("{}: {}", location, e)))?;
        tracing::debug!(location, "opened DuckDB database");

        Ok(Self {
            conn: Mutex::new(conn),
            location: location.to_string(),
        })
    }

    /// Open a fresh in-memory database
    pub fn open_in_memory() -> Result<Self, ExecutionError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutionError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run arbitrary SQL (seeding source tables, setup scripts)
    pub fn execute_batch(&self, sql: &str) -> Result<(), ExecutionError> {
        self.lock()
            .execute_batch(sql)
            .map_err(|e| ExecutionError::Connection(e.to_string()))
    }

    /// Kind of `relation`, if it exists
    pub fn relation_kind(&self, relation: &Relation) -> Result<Option<RelationKind>, ExecutionError> {
        let conn = self.lock();
        existing_kind(&conn, relation).map_err(|e| ExecutionError::statement(relation, e.to_string()))
    }

    /// Run a query and render every value as a string
    pub fn query_strings(&self, sql: &str) -> Result<Vec<Vec<String>>, ExecutionError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ExecutionError::Connection(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::new();
                let mut index = 0;
                while let Ok(value) = row.get::<_, Value>(index) {
                    values.push(render_value(value));
                    index += 1;
                }
                Ok(values)
            })
            .map_err(|e| ExecutionError::Connection(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExecutionError::Connection(e.to_string()))
    }

    fn ensure_schema(conn: &Connection, relation: &Relation) -> Result<(), ExecutionError> {
        conn.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", relation.schema))
            .map_err(|e| ExecutionError::statement(relation, e.to_string()))
    }
}

impl Warehouse for DuckDbWarehouse {
    fn name(&self) -> &'static str {
        "DuckDB"
    }

    fn create_view(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        let mut conn = self.lock();
        Self::ensure_schema(&conn, relation)?;

        let tx = conn
            .transaction()
            .map_err(|e| ExecutionError::statement(relation, e.to_string()))?;

        let result = (|| -> duckdb::Result<()> {
            if existing_kind(&tx, relation)? == Some(RelationKind::Table) {
                tx.execute_batch(&format!("DROP TABLE {}", relation))?;
            }
            tx.execute_batch(&format!("CREATE OR REPLACE VIEW {} AS {}", relation, select))
        })();

        match result {
            Ok(()) => tx
                .commit()
                .map_err(|e| ExecutionError::statement(relation, e.to_string())),
            Err(e) => {
                let _ = tx.rollback();
                Err(ExecutionError::statement(relation, e.to_string()))
            }
        }?;

        tracing::debug!(%relation, "created view");
        Ok(())
    }

    fn create_table(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        let mut conn = self.lock();
        Self::ensure_schema(&conn, relation)?;

        let tx = conn
            .transaction()
            .map_err(|e| ExecutionError::statement(relation, e.to_string()))?;

        let result = (|| -> duckdb::Result<()> {
            if existing_kind(&tx, relation)? == Some(RelationKind::View) {
                tx.execute_batch(&format!("DROP VIEW {}", relation))?;
            }
            tx.execute_batch(&format!("CREATE OR REPLACE TABLE {} AS {}", relation, select))
        })();

        match result {
            Ok(()) => tx
                .commit()
                .map_err(|e| ExecutionError::statement(relation, e.to_string())),
            Err(e) => {
                let _ = tx.rollback();
                Err(ExecutionError::statement(relation, e.to_string()))
            }
        }?;

        tracing::debug!(%relation, "rebuilt table");
        Ok(())
    }
}

fn existing_kind(conn: &Connection, relation: &Relation) -> duckdb::Result<Option<RelationKind>> {
    let mut stmt = conn.prepare(
        "SELECT table_type FROM information_schema.tables \
         WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
    )?;
    let mut rows = stmt.query(duckdb::params![relation.schema, relation.name])?;

    let kind = match rows.next()? {
        Some(row) => {
            let table_type: String = row.get(0)?;
            Some(if table_type.eq_ignore_ascii_case("VIEW") {
                RelationKind::View
            } else {
                RelationKind::Table
            })
        }
        None => None,
    };
    Ok(kind)
}

fn render_value(value: Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::HugeInt(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(s) => s,
        other => format!("{:?}", other),
    }
}
