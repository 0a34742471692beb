//! Resolve model templates into executable SQL
//!
//! Every `ref()` and `source()` marker is replaced by the physical name of
//! what it points at. The resolver never talks to the warehouse.

use meshrun_core::{Diagnostic, ErrorCode, Reference};
use meshrun_project::{Model, Project, TemplateScanner};
use minijinja::Environment;
use std::sync::Arc;
use crate::context::{ResolutionRecorder, ResolutionScope};

/// A model with every reference replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub name: String,

    /// SQL with no template syntax left
    pub sql: String,

    /// Dependencies actually used, in first-use order
    pub dependencies: Vec<Reference>,
}

impl ResolvedModel {
    /// Local models this model depends on
    pub fn model_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().filter_map(Reference::local_model)
    }
}

/// Resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("model '{model}': {reference} does not resolve to a declared source or model")]
    UnresolvedReference { model: String, reference: Reference },

    #[error(
        "model '{model}': {reference} resolves to '{relation}', which is claimed by {}",
        .claimants.join(", ")
    )]
    AmbiguousReference {
        model: String,
        reference: Reference,
        relation: String,
        claimants: Vec<String>,
    },

    #[error("model '{model}': template error: {message}")]
    Render { model: String, message: String },
}

impl ResolveError {
    /// Stable error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnresolvedReference { .. } => ErrorCode::UnresolvedReference,
            Self::AmbiguousReference { .. } => ErrorCode::AmbiguousReference,
            Self::Render { .. } => ErrorCode::TemplateError,
        }
    }

    /// Model the error belongs to
    pub fn model(&self) -> &str {
        match self {
            Self::UnresolvedReference { model, .. }
            | Self::AmbiguousReference { model, .. }
            | Self::Render { model, .. } => model,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.code(), self.to_string())
    }
}

/// Resolves the models of one project
pub struct ReferenceResolver {
    scope: Arc<ResolutionScope>,
}

impl ReferenceResolver {
    pub fn new(project: &Project) -> Self {
        Self {
            scope: Arc::new(ResolutionScope::from_project(project)),
        }
    }

    /// Resolve a model's template
    pub fn resolve(&self, model: &Model) -> Result<ResolvedModel, ResolveError> {
        if !TemplateScanner::has_markers(&model.sql_template) {
            return Ok(ResolvedModel {
                name: model.name.clone(),
                sql: model.sql_template.clone(),
                dependencies: Vec::new(),
            });
        }

        let recorder = ResolutionRecorder::new();
        let mut env = Environment::new();
        crate::functions::register(&mut env, self.scope.clone(), recorder.clone(), &model.name);

        let rendered = env.render_str(&model.sql_template, ()).map_err(|e| {
            recorder.take_failure().unwrap_or_else(|| ResolveError::Render {
                model: model.name.clone(),
                message: e.to_string(),
            })
        })?;

        if TemplateScanner::has_markers(&rendered) {
            return Err(ResolveError::Render {
                model: model.name.clone(),
                message: "template markers remain after rendering".to_string(),
            });
        }

        let dependencies = recorder.dependencies();
        tracing::debug!(model = %model.name, dependencies = dependencies.len(), "resolved model");

        Ok(ResolvedModel {
            name: model.name.clone(),
            sql: rendered.trim().to_string(),
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrun_core::{Config, SourceConfig};
    use pretty_assertions::assert_eq;

    fn project(models: &[(&str, &str)]) -> Project {
        let mut config = Config::default();
        config.name = "dbt_up".to_string();
        config.sources = vec![SourceConfig::new("raw", "raw_orders")];
        let models = models
            .iter()
            .map(|(name, sql)| Model::from_sql(*name, format!("models/{}.sql", name), *sql, &config).unwrap())
            .collect();
        Project::from_parts(config, models).unwrap()
    }

    #[test]
    fn resolves_source_and_ref() {
        let project = project(&[
            ("stg_orders", "{{ config(materialized='view') }}\nselect * from {{ source('raw', 'raw_orders') }}"),
            ("public_orders", "select * from {{ ref('stg_orders') }} where amount > 0"),
        ]);
        let resolver = ReferenceResolver::new(&project);

        let stg = resolver.resolve(project.model("stg_orders").unwrap()).unwrap();
        assert_eq!(stg.sql, "select * from raw.raw_orders");
        assert_eq!(stg.dependencies, vec![Reference::source("raw", "raw_orders")]);

        let public = resolver.resolve(project.model("public_orders").unwrap()).unwrap();
        assert_eq!(public.sql, "select * from main.stg_orders where amount > 0");
        assert_eq!(public.model_dependencies().collect::<Vec<_>>(), vec!["stg_orders"]);
    }

    #[test]
    fn plain_sql_passes_through() {
        let project = project(&[("literal", "select 1 as id union all select 2 as id")]);
        let resolved = ReferenceResolver::new(&project)
            .resolve(project.model("literal").unwrap())
            .unwrap();

        assert_eq!(resolved.sql, "select 1 as id union all select 2 as id");
        assert!(resolved.dependencies.is_empty());
    }

    #[test]
    fn missing_model_is_unresolved() {
        let project = project(&[("public_orders", "select * from {{ ref('stg_missing') }}")]);
        let err = ReferenceResolver::new(&project)
            .resolve(project.model("public_orders").unwrap())
            .unwrap_err();

        assert_eq!(
            err,
            ResolveError::UnresolvedReference {
                model: "public_orders".to_string(),
                reference: Reference::model("stg_missing"),
            }
        );
        assert_eq!(err.code(), ErrorCode::UnresolvedReference);
        assert_eq!(err.model(), "public_orders");
    }

    #[test]
    fn missing_source_and_private_upstream_are_unresolved() {
        let project = project(&[
            ("a", "select * from {{ source('raw', 'customers') }}"),
            ("b", "select * from {{ ref('dbt_other', 'orders') }}"),
        ]);
        let resolver = ReferenceResolver::new(&project);

        assert_eq!(
            resolver.resolve(project.model("a").unwrap()).unwrap_err().code(),
            ErrorCode::UnresolvedReference
        );
        assert_eq!(
            resolver.resolve(project.model("b").unwrap()).unwrap_err().code(),
            ErrorCode::UnresolvedReference
        );
    }

    #[test]
    fn model_colliding_with_source_table_is_ambiguous() {
        let mut config = Config::default();
        let mut source = SourceConfig::new("legacy", "orders");
        source.table = Some("main.orders".to_string());
        config.sources = vec![source];
        let models = vec![
            Model::from_sql("orders", "models/orders.sql", "select 1 as id", &config).unwrap(),
            Model::from_sql("report", "models/report.sql", "select * from {{ ref('orders') }}", &config).unwrap(),
        ];
        let project = Project::from_parts(config, models).unwrap();

        let err = ReferenceResolver::new(&project)
            .resolve(project.model("report").unwrap())
            .unwrap_err();

        match err {
            ResolveError::AmbiguousReference { relation, claimants, .. } => {
                assert_eq!(relation, "main.orders");
                assert_eq!(claimants, vec!["source('legacy', 'orders')", "ref('orders')"]);
            }
            other => panic!("expected AmbiguousReference, got {:?}", other),
        }
    }

    #[test]
    fn broken_template_is_render_error() {
        let project = project(&[("broken", "select * from {{ ref('stg_orders' }}")]);
        let err = ReferenceResolver::new(&project)
            .resolve(project.model("broken").unwrap())
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::TemplateError);
        assert_eq!(err.to_diagnostic().code, ErrorCode::TemplateError);
    }
}
