//! Project loading: config, model discovery, registries

use meshrun_core::{Config, ConfigError, Relation};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;
use crate::model::{Model, SourceRegistry};
use crate::upstream::UpstreamCatalog;

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    /// Project configuration
    pub config: Config,

    /// Models in declaration order
    pub models: Vec<Model>,

    /// Declared sources
    pub sources: SourceRegistry,

    /// Public models of upstream projects
    pub upstream: UpstreamCatalog,

    index: HashMap<String, usize>,
}

impl Project {
    /// Load `meshrun.toml` and every model under the models directory
    pub fn load(dir: &Path) -> Result<Self, ProjectError> {
        let config = Config::from_project_dir(dir)?;
        Self::from_config(config)
    }

    /// Discover models for an already loaded config
    ///
    /// Declaration order is the lexical order of model paths.
    pub fn from_config(config: Config) -> Result<Self, ProjectError> {
        let models_dir = config.models_dir();
        let mut models = Vec::new();

        if models_dir.exists() {
            for entry in WalkDir::new(&models_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| ProjectError::Io {
                    path: models_dir.display().to_string(),
                    message: e.to_string(),
                })?;

                let path = entry.path();
                if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                    models.push(Model::from_file(path, &config.project_root, &config)?);
                }
            }
        } else {
            tracing::warn!(path = %models_dir.display(), "models directory does not exist");
        }

        tracing::debug!(models = models.len(), "discovered models");
        Self::from_parts(config, models)
    }

    /// Assemble a project from in-memory models
    pub fn from_parts(config: Config, models: Vec<Model>) -> Result<Self, ProjectError> {
        let mut index = HashMap::new();
        for (i, model) in models.iter().enumerate() {
            if let Some(&first) = index.get(&model.name) {
                let first: &Model = &models[first];
                return Err(ProjectError::DuplicateModel {
                    name: model.name.clone(),
                    first: first.path.display().to_string(),
                    second: model.path.display().to_string(),
                });
            }
            index.insert(model.name.clone(), i);
        }

        let sources = SourceRegistry::from_config(&config)?;
        let upstream = UpstreamCatalog::from_config(&config)?;

        Ok(Self {
            config,
            models,
            sources,
            upstream,
            index,
        })
    }

    /// Get a model by name
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.index.get(name).map(|&i| &self.models[i])
    }

    /// Position of a model in declaration order
    pub fn model_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Model names in declaration order
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    /// Where a model is materialized
    pub fn relation_for(&self, model: &str) -> Relation {
        Relation::new(self.config.target_schema.clone(), model)
    }
}

/// Project loading errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid model name '{name}' ({path}): must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidModelName { name: String, path: String },

    #[error("Invalid config for model '{model}': {message}")]
    InvalidModelConfig { model: String, message: String },

    #[error("Duplicate model '{name}' defined in {first} and {second}")]
    DuplicateModel { name: String, first: String, second: String },

    #[error("Duplicate source '{namespace}.{name}'")]
    DuplicateSource { namespace: String, name: String },

    #[error("Failed to load upstream project '{project}': {message}")]
    Upstream { project: String, message: String },
}
