//! What a template can see while it renders
//!
//! `ResolutionScope` is the read-only registry view shared by every render.
//! `ResolutionRecorder` collects what a single render used and why it failed.

use meshrun_core::Reference;
use meshrun_project::Project;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use crate::resolver::ResolveError;

/// Physical names of everything a marker may point at
#[derive(Debug, Clone, Default)]
pub struct ResolutionScope {
    project_name: String,

    /// Local model name -> relation
    models: HashMap<String, String>,

    /// (namespace, name) -> physical table
    sources: HashMap<(String, String), String>,

    /// (project, model) -> relation of a public upstream model
    upstream: HashMap<(String, String), String>,

    /// Normalized physical name -> every entity resolving to it
    claimants: HashMap<String, Vec<Reference>>,
}

impl ResolutionScope {
    /// Build the scope of a loaded project
    pub fn from_project(project: &Project) -> Self {
        let mut scope = Self {
            project_name: project.config.name.clone(),
            ..Self::default()
        };

        for source in project.sources.iter() {
            scope.sources.insert(
                (source.namespace.clone(), source.name.clone()),
                source.physical_table.clone(),
            );
            scope.claim(
                &source.physical_table,
                Reference::source(&source.namespace, &source.name),
            );
        }

        for model in &project.models {
            let relation = project.relation_for(&model.name).to_string();
            scope.claim(&relation, Reference::model(&model.name));
            scope.models.insert(model.name.clone(), relation);
        }

        for (upstream, model, relation) in project.upstream.iter() {
            scope
                .upstream
                .insert((upstream.to_string(), model.to_string()), relation.to_string());
            scope.claim(relation, Reference::upstream(upstream, model));
        }

        scope
    }

    fn claim(&mut self, relation: &str, reference: Reference) {
        let claimants = self.claimants.entry(normalize(relation)).or_default();
        if !claimants.contains(&reference) {
            claimants.push(reference);
        }
    }

    /// Name of the project being resolved
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Physical name a reference resolves to
    pub fn lookup(&self, reference: &Reference) -> Option<&str> {
        match reference {
            Reference::Model { name } => self.models.get(name),
            Reference::Source { namespace, name } => {
                self.sources.get(&(namespace.clone(), name.clone()))
            }
            Reference::Upstream { project, name } => {
                self.upstream.get(&(project.clone(), name.clone()))
            }
        }
        .map(String::as_str)
    }

    /// Every entity that resolves to `relation`
    pub fn claimants(&self, relation: &str) -> &[Reference] {
        self.claimants
            .get(&normalize(relation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Unquoted identifiers are case-insensitive in the warehouse
fn normalize(relation: &str) -> String {
    relation.replace('"', "").to_ascii_lowercase()
}

/// Shared record of one render
///
/// Cloned into every template function bound for that render.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRecorder {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Default)]
struct Recorded {
    dependencies: Vec<Reference>,
    failure: Option<ResolveError>,
}

impl ResolutionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a resolved dependency, keeping first-use order
    pub fn record_dependency(&self, reference: Reference) {
        let mut recorded = self.lock();
        if !recorded.dependencies.contains(&reference) {
            recorded.dependencies.push(reference);
        }
    }

    /// Record the first failure of the render
    pub fn record_failure(&self, error: ResolveError) {
        let mut recorded = self.lock();
        if recorded.failure.is_none() {
            recorded.failure = Some(error);
        }
    }

    /// Dependencies used so far
    pub fn dependencies(&self) -> Vec<Reference> {
        self.lock().dependencies.clone()
    }

    /// Take the recorded failure, if any
    pub fn take_failure(&self) -> Option<ResolveError> {
        self.lock().failure.take()
    }
}
