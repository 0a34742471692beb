//! SQL validation for resolved models
//!
//! A resolved model body must be a single query before any statement
//! built from it reaches the warehouse.

pub mod validator;

pub use validator::{SqlValidationError, SqlValidator, ValidatedQuery};
