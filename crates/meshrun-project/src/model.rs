//! Model and source definitions

use meshrun_core::{Access, Config, Materialization, Reference, Relation, SourceConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::project::ProjectError;
use crate::scanner::TemplateScanner;

/// A model definition read from a `.sql` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Logical name (file stem)
    pub name: String,

    /// Path relative to the project root
    pub path: PathBuf,

    /// How the model is persisted
    pub materialization: Materialization,

    /// Visibility to other projects
    pub access: Access,

    /// Raw template, config block included
    pub sql_template: String,

    /// References found by a static scan, in first-seen order
    pub referenced_names: Vec<Reference>,
}

impl Model {
    /// Build a model from its template
    ///
    /// The in-file `config()` block wins over `[models.<name>]` in the
    /// project config, which wins over the project default.
    pub fn from_sql(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        sql: impl Into<String>,
        config: &Config,
    ) -> Result<Self, ProjectError> {
        let name = name.into();
        let path = path.into();
        let sql_template = sql.into();

        if !Relation::is_valid_identifier(&name) {
            return Err(ProjectError::InvalidModelName {
                name,
                path: path.display().to_string(),
            });
        }

        let scan = TemplateScanner::scan(&sql_template);

        let materialization = match scan.config.get("materialized") {
            Some(value) => value.parse().map_err(|e: meshrun_core::ParseEnumError| {
                ProjectError::InvalidModelConfig {
                    model: name.clone(),
                    message: e.to_string(),
                }
            })?,
            None => config.materialization_for(&name),
        };

        let access = match scan.config.get("access") {
            Some(value) => value.parse().map_err(|e: meshrun_core::ParseEnumError| {
                ProjectError::InvalidModelConfig {
                    model: name.clone(),
                    message: e.to_string(),
                }
            })?,
            None => config.access_for(&name),
        };

        for key in scan.config.keys() {
            if key != "materialized" && key != "access" {
                tracing::debug!(model = %name, option = %key, "ignoring unrecognized config option");
            }
        }

        // ref('<this project>', 'x') is the local ref('x')
        let mut referenced_names: Vec<Reference> = Vec::with_capacity(scan.references.len());
        for reference in scan.references {
            let reference = match reference {
                Reference::Upstream { project, name } if project == config.name => Reference::model(name),
                other => other,
            };
            if !referenced_names.contains(&reference) {
                referenced_names.push(reference);
            }
        }

        Ok(Self {
            name,
            path,
            materialization,
            access,
            sql_template,
            referenced_names,
        })
    }

    /// Read a model file; `root` is the project root used to relativize the path
    pub fn from_file(path: &Path, root: &Path, config: &Config) -> Result<Self, ProjectError> {
        let sql = std::fs::read_to_string(path).map_err(|e| ProjectError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        Self::from_sql(name, relative, sql, config)
    }

    /// Models this model references by local name
    pub fn model_dependencies(&self) -> impl Iterator<Item = &str> {
        self.referenced_names.iter().filter_map(Reference::local_model)
    }
}

/// A declared source table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub namespace: String,
    pub name: String,
    pub physical_table: String,
}

impl From<&SourceConfig> for Source {
    fn from(config: &SourceConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            name: config.name.clone(),
            physical_table: config.physical_table(),
        }
    }
}

/// Declared sources, in declaration order
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
    index: HashMap<(String, String), usize>,
}

impl SourceRegistry {
    /// Build the registry; `(namespace, name)` pairs must be unique
    pub fn new(sources: impl IntoIterator<Item = Source>) -> Result<Self, ProjectError> {
        let mut registry = Self::default();

        for source in sources {
            let key = (source.namespace.clone(), source.name.clone());
            if registry.index.contains_key(&key) {
                return Err(ProjectError::DuplicateSource {
                    namespace: source.namespace,
                    name: source.name,
                });
            }
            registry.index.insert(key, registry.sources.len());
            registry.sources.push(source);
        }

        Ok(registry)
    }

    pub fn from_config(config: &Config) -> Result<Self, ProjectError> {
        Self::new(config.sources.iter().map(Source::from))
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&Source> {
        self.index
            .get(&(namespace.to_string(), name.to_string()))
            .map(|&i| &self.sources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_block_wins_over_project_config() {
        let mut config = Config::default();
        config.models.insert(
            "public_orders".to_string(),
            meshrun_core::ModelOverrides {
                materialized: Some(Materialization::View),
                access: None,
            },
        );

        let model = Model::from_sql(
            "public_orders",
            "models/public_orders.sql",
            "{{ config(materialized='table') }}\nSELECT * FROM {{ ref('stg_orders') }}",
            &config,
        )
        .unwrap();

        assert_eq!(model.materialization, Materialization::Table);
        assert_eq!(model.access, Access::Private);
        assert_eq!(model.model_dependencies().collect::<Vec<_>>(), vec!["stg_orders"]);
    }

    #[test]
    fn own_project_ref_is_a_local_dependency() {
        let mut config = Config::default();
        config.name = "dbt_up".to_string();

        let model = Model::from_sql(
            "public_orders",
            "models/public_orders.sql",
            "SELECT * FROM {{ ref('dbt_up', 'stg_orders') }} JOIN {{ ref('stg_orders') }} USING (id) \
             JOIN {{ ref('dbt_other', 'customers') }} USING (id)",
            &config,
        )
        .unwrap();

        assert_eq!(
            model.referenced_names,
            vec![Reference::model("stg_orders"), Reference::upstream("dbt_other", "customers")]
        );
        assert_eq!(model.model_dependencies().collect::<Vec<_>>(), vec!["stg_orders"]);
    }

    #[test]
    fn project_override_applies_without_config_block() {
        let mut config = Config::default();
        config.models.insert(
            "stg_orders".to_string(),
            meshrun_core::ModelOverrides {
                materialized: Some(Materialization::Table),
                access: Some(Access::Public),
            },
        );

        let model = Model::from_sql("stg_orders", "models/stg_orders.sql", "SELECT 1", &config).unwrap();
        assert_eq!(model.materialization, Materialization::Table);
        assert_eq!(model.access, Access::Public);
    }

    #[test]
    fn invalid_materialization() {
        let err = Model::from_sql(
            "m",
            "models/m.sql",
            "{{ config(materialized='incremental') }} SELECT 1",
            &Config::default(),
        )
        .unwrap_err();

        assert!(matches!(err, ProjectError::InvalidModelConfig { .. }));
    }

    #[test]
    fn invalid_model_name() {
        let err = Model::from_sql("stg-orders", "models/stg-orders.sql", "SELECT 1", &Config::default())
            .unwrap_err();
        assert!(matches!(err, ProjectError::InvalidModelName { .. }));
    }

    #[test]
    fn duplicate_sources_rejected() {
        let source = Source {
            namespace: "raw".to_string(),
            name: "raw_orders".to_string(),
            physical_table: "raw.raw_orders".to_string(),
        };

        let err = SourceRegistry::new(vec![source.clone(), source]).unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateSource { .. }));
    }

    #[test]
    fn source_lookup() {
        let mut config = Config::default();
        config.sources.push(SourceConfig::new("raw", "raw_orders"));

        let registry = SourceRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("raw", "raw_orders").unwrap().physical_table, "raw.raw_orders");
        assert!(registry.get("raw", "missing").is_none());
    }
}
