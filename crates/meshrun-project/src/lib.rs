//! Project loading, dependency graphs and manifest artifacts
//!
//! This crate handles:
//! - Reading `meshrun.toml` and discovering model files
//! - The source registry and upstream (cross-project) catalog
//! - Building dependency graphs (DAG) and topological ordering
//! - Generating and parsing manifest.json
//! - Publishing manifests to a registry and validating lineage

pub mod scanner;
pub mod model;
pub mod upstream;
pub mod project;
pub mod dag;
pub mod manifest;
pub mod publish;
pub mod lineage;

pub use scanner::{ScanResult, TemplateScanner};
pub use model::{Model, Source, SourceRegistry};
pub use upstream::UpstreamCatalog;
pub use project::{Project, ProjectError};
pub use dag::{CyclicDependencyError, DependencyGraph, NodeId};
pub use manifest::{CompiledNode, Manifest, ManifestError, ManifestNode, ManifestSource};
pub use publish::{Publication, PublishError, RegistryPublisher};
pub use lineage::{LineageReport, LineageStatus, LineageValidator};
