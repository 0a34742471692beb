//! Compilation: resolve and validate every model
//!
//! Compilation never touches the warehouse. The first model that fails
//! stops it, and the error is reported against that model.

use meshrun_core::{Diagnostic, Materialization, Reference, Relation};
use meshrun_jinja::ReferenceResolver;
use meshrun_project::{CompiledNode, Manifest, Model, Project};
use meshrun_sql::SqlValidator;

/// A model ready to be materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModel {
    pub name: String,
    pub materialization: Materialization,

    /// Where the model is materialized
    pub relation: Relation,

    /// Validated query, no template syntax left
    pub sql: String,

    /// Dependencies used while resolving, in first-use order
    pub dependencies: Vec<Reference>,
}

impl CompiledModel {
    /// Local models this model depends on
    pub fn model_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().filter_map(Reference::local_model)
    }
}

/// Every model of a project, compiled, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledProject {
    pub models: Vec<CompiledModel>,
}

impl CompiledProject {
    pub fn get(&self, name: &str) -> Option<&CompiledModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Manifest of the compiled project
    pub fn manifest(&self, project: &Project) -> Manifest {
        let nodes = self.models.iter().filter_map(|compiled| {
            project.model(&compiled.name).map(|model| CompiledNode {
                model,
                compiled_sql: &compiled.sql,
                dependencies: &compiled.dependencies,
            })
        });
        Manifest::build(project, nodes)
    }
}

/// A model failed to compile
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{diagnostic}")]
pub struct CompileError {
    pub model: String,
    pub diagnostic: Diagnostic,
}

/// Resolves and validates the models of a project
pub struct Compiler<'a> {
    project: &'a Project,
    resolver: ReferenceResolver,
    validator: SqlValidator,
}

impl<'a> Compiler<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            resolver: ReferenceResolver::new(project),
            validator: SqlValidator::from_dialect(&project.config.dialect),
        }
    }

    /// Compile every model in declaration order, stopping at the first error
    pub fn compile(&self) -> Result<CompiledProject, CompileError> {
        let models = self
            .project
            .models
            .iter()
            .map(|model| self.compile_model(model))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(models = models.len(), "compiled project");
        Ok(CompiledProject { models })
    }

    /// Compile a single model
    pub fn compile_model(&self, model: &Model) -> Result<CompiledModel, CompileError> {
        tracing::debug!(model = %model.name, state = "resolving", "compiling model");

        let resolved = self.resolver.resolve(model).map_err(|e| CompileError {
            model: model.name.clone(),
            diagnostic: e.to_diagnostic(),
        })?;

        let query = self.validator.validate(&resolved.sql).map_err(|e| CompileError {
            model: model.name.clone(),
            diagnostic: e.to_diagnostic(&model.name),
        })?;

        Ok(CompiledModel {
            name: model.name.clone(),
            materialization: model.materialization,
            relation: self.project.relation_for(&model.name),
            sql: query.sql,
            dependencies: resolved.dependencies,
        })
    }
}
