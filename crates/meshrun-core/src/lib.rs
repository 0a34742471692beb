//! meshrun core
//!
//! Core domain model shared by every meshrun crate.
//! Never rename error codes - they are part of the public API.

pub mod diagnostic;
pub mod model;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, ErrorCode};
pub use model::{Access, Materialization, ParseEnumError, Reference, Relation};
pub use report::{ModelResult, ReportVersion, RunReport, RunStatus, RunSummary};
pub use config::{
    Config, ConfigError, DialectConfig, ModelOverrides, SourceConfig, UpstreamConfig,
    CONFIG_FILE_NAME,
    WarehouseConfig,
};
