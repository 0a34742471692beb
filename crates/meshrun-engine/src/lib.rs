//! meshrun engine - compile, plan and run a project
//!
//! This crate implements:
//! - Compilation: resolving and validating every model before execution
//! - Planning: dependency ordering with cycle detection
//! - The runner: sequential materialization with failure isolation
//! - Artifact generation (compiled SQL, manifest, run results)

pub mod compiler;
pub mod planner;
pub mod runner;
pub mod artifacts;

pub use compiler::{CompileError, CompiledModel, CompiledProject, Compiler};
pub use planner::ExecutionPlan;
pub use runner::{ModelState, RunOutcome, Runner};
pub use artifacts::{ArtifactError, ArtifactWriter};
