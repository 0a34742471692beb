//! Public models of upstream projects, read from their published manifests

use meshrun_core::Config;
use std::collections::BTreeMap;
use crate::manifest::Manifest;
use crate::project::ProjectError;

/// Public models exposed by upstream projects
#[derive(Debug, Clone, Default)]
pub struct UpstreamCatalog {
    /// (project, model) -> physical relation
    relations: BTreeMap<(String, String), String>,
}

impl UpstreamCatalog {
    /// Load every `[[upstream]]` manifest listed in the config
    pub fn from_config(config: &Config) -> Result<Self, ProjectError> {
        let mut catalog = Self::default();

        for upstream in &config.upstream {
            let path = config.project_root.join(&upstream.manifest);
            let manifest = Manifest::from_file(&path).map_err(|e| ProjectError::Upstream {
                project: upstream.project.clone(),
                message: e.to_string(),
            })?;

            if manifest.metadata.project_name != upstream.project {
                tracing::warn!(
                    configured = %upstream.project,
                    manifest = %manifest.metadata.project_name,
                    "upstream manifest project name does not match configuration"
                );
            }

            catalog.add_manifest(&upstream.project, &manifest);
        }

        Ok(catalog)
    }

    /// Register the public models of `manifest` under `project`
    pub fn add_manifest(&mut self, project: &str, manifest: &Manifest) {
        let mut count = 0;
        for node in manifest.public_models() {
            let relation = node.relation_name.clone().unwrap_or_else(|| match &node.schema {
                Some(schema) => format!("{}.{}", schema, node.name),
                None => node.name.clone(),
            });
            self.relations
                .insert((project.to_string(), node.name.clone()), relation);
            count += 1;
        }
        tracing::debug!(project, public_models = count, "loaded upstream manifest");
    }

    /// Relation of a public upstream model
    pub fn relation(&self, project: &str, model: &str) -> Option<&str> {
        self.relations
            .get(&(project.to_string(), model.to_string()))
            .map(String::as_str)
    }

    /// Every `(project, model, relation)` entry, sorted by project then model
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.relations
            .iter()
            .map(|((p, m), r)| (p.as_str(), m.as_str(), r.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
