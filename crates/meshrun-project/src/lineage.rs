//! Cross-project lineage validation
//!
//! Checks that a downstream manifest records its dependencies on an
//! upstream project, either as model refs (`model.<upstream>.*`) or as
//! sources declared under the upstream's name (`source.*.<upstream>.*`).

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use crate::manifest::{Manifest, ManifestError};

/// How much lineage a manifest carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageStatus {
    /// `parent_map` references the upstream project
    Validated,

    /// Only `depends_on` references it
    Partial,

    /// No reference at all
    Missing,
}

impl LineageStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Result of validating one manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageReport {
    pub project_name: String,
    pub upstream_project: String,
    pub status: LineageStatus,

    /// Downstream node -> upstream parents, merged from both checks
    pub cross_refs: BTreeMap<String, Vec<String>>,
}

impl LineageReport {
    pub fn message(&self) -> String {
        match self.status {
            LineageStatus::Validated => "Cross-project lineage validated successfully".to_string(),
            LineageStatus::Partial => "Partial lineage found (depends_on only)".to_string(),
            LineageStatus::Missing => format!(
                "No cross-project references to '{}' found in manifest",
                self.upstream_project
            ),
        }
    }
}

/// Validates lineage against an upstream project
pub struct LineageValidator {
    upstream_project: String,
}

impl LineageValidator {
    pub fn new(upstream_project: impl Into<String>) -> Self {
        Self {
            upstream_project: upstream_project.into(),
        }
    }

    /// Validate a manifest file
    pub fn validate_file(&self, path: &Path) -> Result<LineageReport, ManifestError> {
        let manifest = Manifest::from_file(path)?;
        Ok(self.validate(&manifest))
    }

    /// Validate a parsed manifest
    pub fn validate(&self, manifest: &Manifest) -> LineageReport {
        let parent_refs = self.refs_in_parent_map(manifest);
        let node_refs = self.refs_in_depends_on(manifest);

        let status = if !parent_refs.is_empty() {
            LineageStatus::Validated
        } else if !node_refs.is_empty() {
            LineageStatus::Partial
        } else {
            LineageStatus::Missing
        };

        let mut cross_refs = parent_refs;
        for (node, parents) in node_refs {
            cross_refs.insert(node, parents);
        }

        LineageReport {
            project_name: manifest.metadata.project_name.clone(),
            upstream_project: self.upstream_project.clone(),
            status,
            cross_refs,
        }
    }

    fn is_upstream(&self, unique_id: &str) -> bool {
        unique_id.starts_with(&format!("model.{}.", self.upstream_project))
            || (unique_id.starts_with("source.")
                && unique_id.contains(&format!(".{}.", self.upstream_project)))
    }

    fn refs_in_parent_map(&self, manifest: &Manifest) -> BTreeMap<String, Vec<String>> {
        Self::collect(
            manifest.parent_map.iter().map(|(id, parents)| (id, parents.as_slice())),
            |p| self.is_upstream(p),
        )
    }

    fn refs_in_depends_on(&self, manifest: &Manifest) -> BTreeMap<String, Vec<String>> {
        Self::collect(
            manifest
                .nodes
                .iter()
                .map(|(id, node)| (id, node.depends_on.nodes.as_slice())),
            |p| self.is_upstream(p),
        )
    }

    fn collect<'a>(
        entries: impl Iterator<Item = (&'a String, &'a [String])>,
        is_upstream: impl Fn(&str) -> bool,
    ) -> BTreeMap<String, Vec<String>> {
        entries
            .filter_map(|(id, parents)| {
                let upstream: Vec<String> = parents
                    .iter()
                    .filter(|p| is_upstream(p.as_str()))
                    .cloned()
                    .collect();
                (!upstream.is_empty()).then(|| (id.clone(), upstream))
            })
            .collect()
    }
}
