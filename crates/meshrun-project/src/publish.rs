//! Publication of a project's manifest to a local registry
//!
//! Layout:
//!
//! ```text
//! <registry>/<project>/<env>/latest/manifest.json           (overwritten)
//! <registry>/<project>/<env>/history/<timestamp>/manifest.json
//! ```

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use crate::manifest::Manifest;

/// Where a manifest was published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub latest: PathBuf,
    pub history: PathBuf,
    /// unique_ids of public models in the published manifest
    pub public_models: Vec<String>,
}

/// Publishes manifests into a registry directory
pub struct RegistryPublisher {
    registry_root: PathBuf,
}

impl RegistryPublisher {
    pub fn new(registry_root: impl Into<PathBuf>) -> Self {
        Self {
            registry_root: registry_root.into(),
        }
    }

    /// Publish the manifest at `manifest_path` for `project` in `env`
    pub fn publish(&self, manifest_path: &Path, project: &str, env: &str) -> Result<Publication, PublishError> {
        self.publish_at(manifest_path, project, env, Utc::now())
    }

    /// Publish with an explicit timestamp for the history partition
    pub fn publish_at(
        &self,
        manifest_path: &Path,
        project: &str,
        env: &str,
        at: DateTime<Utc>,
    ) -> Result<Publication, PublishError> {
        if !manifest_path.exists() {
            return Err(PublishError::ManifestNotFound(manifest_path.display().to_string()));
        }

        let manifest = Manifest::from_file(manifest_path)
            .map_err(|e| PublishError::InvalidManifest(e.to_string()))?;

        let public_models: Vec<String> = manifest
            .public_models()
            .map(|node| node.unique_id.clone())
            .collect();

        if public_models.is_empty() {
            tracing::warn!(project, "no public models found in manifest");
        }

        let timestamp = at.format("%Y%m%dT%H%M%SZ").to_string();
        let base = self.registry_root.join(project).join(env);
        let latest = base.join("latest").join("manifest.json");
        let history = base.join("history").join(timestamp).join("manifest.json");

        for target in [&latest, &history] {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PublishError::Io {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                })?;
            }
            std::fs::copy(manifest_path, target).map_err(|e| PublishError::Io {
                path: target.display().to_string(),
                message: e.to_string(),
            })?;
        }

        tracing::info!(latest = %latest.display(), history = %history.display(), "published manifest");

        Ok(Publication {
            latest,
            history,
            public_models,
        })
    }
}

/// Publication errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Manifest not found at {0}. Run 'meshrun compile' first.")]
    ManifestNotFound(String),

    #[error("Manifest is not valid: {0}")]
    InvalidManifest(String),

    #[error("Failed to write {path}: {message}")]
    Io { path: String, message: String },
}
