//! Warehouse adapters
//!
//! This crate provides:
//! - The `Warehouse` trait: the two materialization operations the runner needs
//! - `DuckDbWarehouse`: an embedded DuckDB database (file or in-memory)
//! - `MockWarehouse`: records statements and injects failures for tests

pub mod adapter;
pub mod embedded;
pub mod mock;

pub use adapter::{ExecutionError, Warehouse};
pub use embedded::{DuckDbWarehouse, RelationKind};
pub use mock::{MockWarehouse, WarehouseCall};
