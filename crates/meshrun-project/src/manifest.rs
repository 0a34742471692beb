//! manifest.json generation and parsing
//!
//! The layout follows dbt's manifest closely enough that upstream manifests
//! produced by dbt itself can be read for cross-project refs and lineage
//! checks. Unknown fields are ignored.

use meshrun_core::{Access, Reference};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use crate::model::Model;
use crate::project::Project;

/// manifest.json structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata about the manifest
    pub metadata: ManifestMetadata,

    /// Model nodes
    #[serde(default)]
    pub nodes: BTreeMap<String, ManifestNode>,

    /// Source definitions
    #[serde(default)]
    pub sources: BTreeMap<String, ManifestSource>,

    /// Parent map (node -> list of parent nodes)
    #[serde(default)]
    pub parent_map: BTreeMap<String, Vec<String>>,

    /// Child map (node -> list of child nodes)
    #[serde(default)]
    pub child_map: BTreeMap<String, Vec<String>>,
}

/// A compiled model ready to be recorded in the manifest
#[derive(Debug, Clone, Copy)]
pub struct CompiledNode<'a> {
    pub model: &'a Model,
    pub compiled_sql: &'a str,
    pub dependencies: &'a [Reference],
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_json(&contents)
    }

    /// Parse manifest from JSON string
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(json)
            .map_err(|e| ManifestError::ParseError(e.to_string()))
    }

    /// Build the manifest of a compiled project
    pub fn build<'a>(project: &Project, compiled: impl IntoIterator<Item = CompiledNode<'a>>) -> Self {
        let project_name = project.config.name.as_str();
        let mut manifest = Self {
            metadata: ManifestMetadata::new(project_name),
            nodes: BTreeMap::new(),
            sources: BTreeMap::new(),
            parent_map: BTreeMap::new(),
            child_map: BTreeMap::new(),
        };

        for source in project.sources.iter() {
            let reference = Reference::source(&source.namespace, &source.name);
            let unique_id = reference.unique_id(project_name);
            manifest.sources.insert(
                unique_id.clone(),
                ManifestSource {
                    unique_id: unique_id.clone(),
                    source_name: source.namespace.clone(),
                    name: source.name.clone(),
                    package_name: project_name.to_string(),
                    relation_name: Some(source.physical_table.clone()),
                },
            );
            manifest.child_map.entry(unique_id.clone()).or_default();
            manifest.parent_map.entry(unique_id).or_default();
        }

        for node in compiled {
            let model = node.model;
            let unique_id = Reference::model(&model.name).unique_id(project_name);
            let parents: Vec<String> = node
                .dependencies
                .iter()
                .map(|d| d.unique_id(project_name))
                .collect();

            for parent in &parents {
                manifest
                    .child_map
                    .entry(parent.clone())
                    .or_default()
                    .push(unique_id.clone());
            }
            manifest.child_map.entry(unique_id.clone()).or_default();
            manifest.parent_map.insert(unique_id.clone(), parents.clone());

            manifest.nodes.insert(
                unique_id.clone(),
                ManifestNode {
                    unique_id,
                    name: model.name.clone(),
                    resource_type: "model".to_string(),
                    package_name: project_name.to_string(),
                    original_file_path: model.path.display().to_string(),
                    schema: Some(project.config.target_schema.clone()),
                    relation_name: Some(project.relation_for(&model.name).to_string()),
                    access: Some(model.access),
                    config: NodeConfig {
                        enabled: true,
                        materialized: Some(model.materialization.to_string()),
                    },
                    depends_on: DependsOn { nodes: parents },
                    compiled_code: Some(node.compiled_sql.to_string()),
                    checksum: Some(FileChecksum::sha256(&model.sql_template)),
                },
            );
        }

        for children in manifest.child_map.values_mut() {
            children.sort();
            children.dedup();
        }

        manifest
    }

    /// Get all model nodes (filters out tests, seeds, etc.)
    pub fn models(&self) -> impl Iterator<Item = &ManifestNode> {
        self.nodes.values().filter(|node| node.resource_type == "model")
    }

    /// Models other projects may reference
    pub fn public_models(&self) -> impl Iterator<Item = &ManifestNode> {
        self.models().filter(|node| node.access == Some(Access::Public))
    }

    /// Get a specific node by unique_id
    pub fn get_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes.get(unique_id)
    }

    /// Find a model node by short name
    pub fn find_model(&self, name: &str) -> Option<&ManifestNode> {
        self.models().find(|node| node.name == name)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(|e| ManifestError::SerializeError(e.to_string()))
    }

    /// Write to file, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<(), ManifestError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ManifestError::IoError(parent.display().to_string(), e.to_string()))?;
        }
        std::fs::write(path, json)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))
    }
}

/// Manifest metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default = "unknown_project")]
    pub project_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meshrun_version: Option<String>,

    #[serde(default)]
    pub generated_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
}

fn unknown_project() -> String {
    "unknown".to_string()
}

impl ManifestMetadata {
    fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            meshrun_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            generated_at: chrono::Utc::now().to_rfc3339(),
            invocation_id: None,
        }
    }
}

/// A node in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Unique identifier (e.g., "model.dbt_up.public_orders")
    pub unique_id: String,

    /// Node name (e.g., "public_orders")
    pub name: String,

    /// Resource type (model, test, seed, ...)
    pub resource_type: String,

    /// Package name
    #[serde(default)]
    pub package_name: String,

    /// Model file path
    #[serde(default)]
    pub original_file_path: String,

    /// Schema name
    #[serde(default)]
    pub schema: Option<String>,

    /// Physical relation (`schema.name`)
    #[serde(default)]
    pub relation_name: Option<String>,

    /// Access level
    #[serde(default)]
    pub access: Option<Access>,

    /// Node configuration
    #[serde(default)]
    pub config: NodeConfig,

    /// Dependencies
    #[serde(default)]
    pub depends_on: DependsOn,

    /// Resolved SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_code: Option<String>,

    /// Checksum of the raw template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<FileChecksum>,
}

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Whether the node is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Materialization type
    #[serde(default)]
    pub materialized: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Dependencies structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    /// List of node unique_ids this node depends on
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Template checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChecksum {
    pub name: String,
    pub checksum: String,
}

impl FileChecksum {
    pub fn sha256(contents: &str) -> Self {
        let digest = Sha256::digest(contents.as_bytes());
        Self {
            name: "sha256".to_string(),
            checksum: hex::encode(digest),
        }
    }
}

/// A source in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Unique identifier (e.g., "source.dbt_up.raw.raw_orders")
    pub unique_id: String,

    /// Source namespace (e.g., "raw")
    pub source_name: String,

    /// Table name (e.g., "raw_orders")
    pub name: String,

    /// Package name
    #[serde(default)]
    pub package_name: String,

    /// Physical table
    #[serde(default)]
    pub relation_name: Option<String>,
}

/// Manifest errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to access manifest file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest JSON: {0}")]
    ParseError(String),

    #[error("Failed to serialize manifest: {0}")]
    SerializeError(String),
}
