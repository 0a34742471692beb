//! Target directory artifacts
//!
//! ```text
//! target/
//!   compiled/<model>.sql
//!   manifest.json
//!   run_results.json
//! ```

use meshrun_core::{Config, RunReport};
use meshrun_project::{Manifest, ManifestError, Project};
use std::path::{Path, PathBuf};
use crate::compiler::CompiledProject;

/// Writes artifacts under a project's target directory
pub struct ArtifactWriter {
    target_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.target_dir())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.target_dir.join("manifest.json")
    }

    pub fn run_results_path(&self) -> PathBuf {
        self.target_dir.join("run_results.json")
    }

    pub fn compiled_path(&self, model: &str) -> PathBuf {
        self.target_dir.join("compiled").join(format!("{}.sql", model))
    }

    /// Write compiled SQL for every model plus the manifest
    pub fn write_compiled(&self, project: &Project, compiled: &CompiledProject) -> Result<Manifest, ArtifactError> {
        for model in &compiled.models {
            write_file(&self.compiled_path(&model.name), &model.sql)?;
        }

        let manifest = compiled.manifest(project);
        manifest.save_to_file(&self.manifest_path())?;

        tracing::debug!(
            models = compiled.models.len(),
            target = %self.target_dir.display(),
            "wrote compiled artifacts"
        );
        Ok(manifest)
    }

    /// Write run_results.json
    pub fn write_run_results(&self, report: &RunReport) -> Result<PathBuf, ArtifactError> {
        let path = self.run_results_path();
        report.save_to_file(&path).map_err(|e| ArtifactError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(path)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ArtifactError> {
    let io_error = |e: std::io::Error| ArtifactError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, contents).map_err(io_error)
}

/// Artifact errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to write {path}: {message}")]
    Io { path: String, message: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
