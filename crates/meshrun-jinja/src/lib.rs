//! Reference resolution for model templates
//!
//! This crate handles:
//! - Rendering model templates with a MiniJinja environment
//! - Binding `ref()`, `source()` and `config()` to the project registry
//! - Recording the dependencies each model actually uses
//! - Reporting unresolved and ambiguous references

pub mod context;
pub mod functions;
pub mod resolver;

pub use context::{ResolutionRecorder, ResolutionScope};
pub use resolver::{ReferenceResolver, ResolveError, ResolvedModel};
