//! Mock warehouse for testing
//!
//! Records every statement it receives without executing anything, and
//! can be told to fail for specific relations. Useful for:
//! - Asserting that nothing reached the warehouse (configuration errors)
//! - Asserting execution order
//! - Simulating engine failures in one branch of the graph
//!
//! ```rust,ignore
//! let warehouse = MockWarehouse::new().with_failure("main.public_orders", "Binder Error");
//! runner.run(&warehouse);
//! assert_eq!(warehouse.call_count(), 2);
//! ```

use meshrun_core::{Materialization, Relation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use crate::adapter::{ExecutionError, Warehouse};

/// One recorded materialization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseCall {
    pub materialization: Materialization,
    pub relation: Relation,
    pub select: String,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<WarehouseCall>,

    /// Relation -> (materialization, select) of the last successful call
    relations: HashMap<String, (Materialization, String)>,
}

/// Mock warehouse for testing
///
/// Cloning shares the recorded state, so a test can keep a handle while
/// the runner owns another.
#[derive(Debug, Clone, Default)]
pub struct MockWarehouse {
    state: Arc<Mutex<MockState>>,

    /// Errors to return for specific relations (`schema.name`)
    failures: HashMap<String, String>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement targeting `relation` with `message`
    pub fn with_failure(mut self, relation: &str, message: &str) -> Self {
        self.failures.insert(relation.to_string(), message.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call received, failed ones included, in order
    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Relation names in call order
    pub fn called_relations(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|call| call.relation.to_string())
            .collect()
    }

    /// Current definition of a relation
    pub fn relation(&self, relation: &str) -> Option<(Materialization, String)> {
        self.lock().relations.get(relation).cloned()
    }

    fn record(
        &self,
        materialization: Materialization,
        relation: &Relation,
        select: &str,
    ) -> Result<(), ExecutionError> {
        let mut state = self.lock();
        state.calls.push(WarehouseCall {
            materialization,
            relation: relation.clone(),
            select: select.to_string(),
        });

        if let Some(message) = self.failures.get(&relation.to_string()) {
            return Err(ExecutionError::statement(relation, message.clone()));
        }

        state
            .relations
            .insert(relation.to_string(), (materialization, select.to_string()));
        Ok(())
    }
}

impl Warehouse for MockWarehouse {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn create_view(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        self.record(Materialization::View, relation, select)
    }

    fn create_table(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        self.record(Materialization::Table, relation, select)
    }
}
