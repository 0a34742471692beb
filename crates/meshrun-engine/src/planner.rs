//! Execution planning
//!
//! Orders models so every model runs after the models it depends on.
//! Sources and upstream models are leaves and need no action.

use meshrun_project::{CyclicDependencyError, DependencyGraph, NodeId, Project};
use crate::compiler::CompiledProject;

/// Models in execution order plus the graph they came from
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    order: Vec<NodeId>,
    graph: DependencyGraph,
}

impl ExecutionPlan {
    /// Plan from the dependencies used while compiling
    pub fn build(compiled: &CompiledProject) -> Result<Self, CyclicDependencyError> {
        Self::from_graph(DependencyGraph::new(compiled.models.iter().map(|m| {
            (
                m.name.clone(),
                m.model_dependencies().map(str::to_string).collect::<Vec<_>>(),
            )
        })))
    }

    /// Plan from a static scan of the templates, without resolving them
    pub fn from_project(project: &Project) -> Result<Self, CyclicDependencyError> {
        Self::from_graph(DependencyGraph::new(project.models.iter().map(|m| {
            (
                m.name.clone(),
                m.model_dependencies().map(str::to_string).collect::<Vec<_>>(),
            )
        })))
    }

    fn from_graph(graph: DependencyGraph) -> Result<Self, CyclicDependencyError> {
        let order = graph.topological_sort()?;
        tracing::debug!(models = order.len(), "planned execution order");
        Ok(Self { order, graph })
    }

    /// Model names in execution order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Every model that transitively depends on `model`
    pub fn downstream(&self, model: &str) -> Vec<NodeId> {
        self.graph.downstream(model)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
