//! The runner: compile, plan, then materialize models one at a time
//!
//! Each model moves through
//! `pending -> resolving -> executing -> succeeded | failed`, or ends up
//! `skipped`. Configuration errors (resolution, validation, cycles) abort
//! the run before anything executes. A warehouse error only stops the
//! failed model's dependents.

use meshrun_core::{Diagnostic, ErrorCode, ModelResult, RunReport};
use meshrun_project::Project;
use meshrun_warehouse::Warehouse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use crate::compiler::{CompiledProject, Compiler};
use crate::planner::ExecutionPlan;

/// Lifecycle state of a model within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelState {
    Pending,
    Resolving,
    Executing,
    Succeeded,
    Failed,
    Skipped,
}

impl ModelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Whether a model in this state may move to `to`
    pub fn can_transition(&self, to: ModelState) -> bool {
        use ModelState::*;
        match (self, to) {
            (from, _) if from.is_terminal() => false,
            (_, Skipped) => true,
            (Pending, Resolving) => true,
            (Resolving, Executing) | (Resolving, Failed) => true,
            (Executing, Succeeded) | (Executing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,

    /// Present when compilation succeeded
    pub compiled: Option<CompiledProject>,

    /// Present when planning succeeded
    pub plan: Option<ExecutionPlan>,

    /// Final state of every model, all terminal
    pub states: BTreeMap<String, ModelState>,
}

impl RunOutcome {
    pub fn state(&self, model: &str) -> Option<ModelState> {
        self.states.get(model).copied()
    }
}

/// Runs a project against a warehouse
pub struct Runner<'a> {
    project: &'a Project,
    cancelled: Arc<AtomicBool>,
}

impl<'a> Runner<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag with the caller
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// The flag checked before each model starts
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Run every model
    pub fn run(&self, warehouse: &dyn Warehouse) -> RunOutcome {
        let mut states: HashMap<String, ModelState> = self
            .project
            .model_names()
            .map(|name| (name.to_string(), ModelState::Pending))
            .collect();

        tracing::info!(
            project = %self.project.config.name,
            models = states.len(),
            warehouse = warehouse.name(),
            "starting run"
        );

        for name in self.project.model_names() {
            transition(&mut states, name, ModelState::Resolving);
        }

        let compiled = match Compiler::new(self.project).compile() {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::warn!(model = %e.model, error = %e.diagnostic, "compilation failed, aborting run");
                let failed = [(e.model.clone(), e.diagnostic.clone())];
                let report = self.aborted_report(&failed, &e.model, &mut states);
                return RunOutcome {
                    report,
                    compiled: None,
                    plan: None,
                    states: states.into_iter().collect(),
                };
            }
        };

        let plan = match ExecutionPlan::build(&compiled) {
            Ok(plan) => plan,
            Err(cycle) => {
                tracing::warn!(error = %cycle, "dependency cycle, aborting run");
                let diagnostic = Diagnostic::new(ErrorCode::CyclicDependency, cycle.to_string());
                let failed: Vec<(String, Diagnostic)> = cycle
                    .members
                    .iter()
                    .map(|member| (member.clone(), diagnostic.clone()))
                    .collect();
                let first = cycle.members.first().cloned().unwrap_or_default();
                let report = self.aborted_report(&failed, &first, &mut states);
                return RunOutcome {
                    report,
                    compiled: Some(compiled),
                    plan: None,
                    states: states.into_iter().collect(),
                };
            }
        };

        let report = self.execute(warehouse, &compiled, &plan, &mut states);
        RunOutcome {
            report,
            compiled: Some(compiled),
            plan: Some(plan),
            states: states.into_iter().collect(),
        }
    }

    fn execute(
        &self,
        warehouse: &dyn Warehouse,
        compiled: &CompiledProject,
        plan: &ExecutionPlan,
        states: &mut HashMap<String, ModelState>,
    ) -> RunReport {
        let mut report = RunReport::new(&self.project.config.name);

        // Skipped model -> the failed model that blocked it
        let mut blocked: HashMap<String, String> = HashMap::new();

        for name in plan.order() {
            let Some(model) = compiled.get(name) else {
                continue;
            };

            if self.cancelled.load(Ordering::SeqCst) {
                if !report.cancelled {
                    tracing::warn!(model = %name, "run cancelled, skipping remaining models");
                }
                report.cancelled = true;
                transition(states, name, ModelState::Skipped);
                report.push(ModelResult::skipped(
                    name.clone(),
                    Diagnostic::new(ErrorCode::Cancelled, "run cancelled"),
                ));
                continue;
            }

            if let Some(root) = blocked.get(name) {
                transition(states, name, ModelState::Skipped);
                report.push(ModelResult::skipped(
                    name.clone(),
                    Diagnostic::new(
                        ErrorCode::UpstreamFailed,
                        format!("upstream model `{}` failed", root),
                    ),
                ));
                continue;
            }

            transition(states, name, ModelState::Executing);
            let started = Instant::now();
            let result = warehouse.materialize(model.materialization, &model.relation, &model.sql);
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    transition(states, name, ModelState::Succeeded);
                    tracing::info!(
                        model = %name,
                        relation = %model.relation,
                        materialization = %model.materialization,
                        duration_ms,
                        "materialized model"
                    );
                    report.push(ModelResult::succeeded(name.clone(), model.materialization, duration_ms));
                }
                Err(e) => {
                    transition(states, name, ModelState::Failed);
                    let impact = plan.downstream(name);
                    tracing::warn!(model = %name, error = %e, skipped = impact.len(), "model failed");

                    for dependent in &impact {
                        blocked.entry(dependent.clone()).or_insert_with(|| name.clone());
                    }
                    report.push(
                        ModelResult::failed(name.clone(), e.to_diagnostic().with_impact(impact))
                            .with_materialization(model.materialization)
                            .with_duration(duration_ms),
                    );
                }
            }
        }

        report
    }

    /// Report for a run stopped before execution, in declaration order
    fn aborted_report(
        &self,
        failed: &[(String, Diagnostic)],
        culprit: &str,
        states: &mut HashMap<String, ModelState>,
    ) -> RunReport {
        let mut report = RunReport::new(&self.project.config.name);
        report.aborted = true;

        for name in self.project.model_names() {
            let result = match failed.iter().find(|(model, _)| model == name) {
                Some((_, diagnostic)) => {
                    transition(states, name, ModelState::Failed);
                    ModelResult::failed(name, diagnostic.clone())
                }
                None => {
                    transition(states, name, ModelState::Skipped);
                    ModelResult::skipped(
                        name,
                        Diagnostic::new(
                            ErrorCode::RunAborted,
                            format!("run aborted: model `{}` has a configuration error", culprit),
                        ),
                    )
                }
            };
            report.push(result);
        }

        report
    }
}

fn transition(states: &mut HashMap<String, ModelState>, model: &str, to: ModelState) {
    let from = states.get(model).copied().unwrap_or(ModelState::Pending);
    if !from.can_transition(to) {
        tracing::warn!(model, %from, %to, "ignoring illegal state transition");
        return;
    }
    states.insert(model.to_string(), to);
    tracing::debug!(model, %from, %to, "model state");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ModelState::Pending.is_terminal());
        assert!(!ModelState::Executing.is_terminal());
        assert!(ModelState::Skipped.is_terminal());
        assert_eq!(ModelState::Resolving.to_string(), "resolving");
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        use ModelState::*;

        assert!(Pending.can_transition(Resolving));
        assert!(Resolving.can_transition(Executing));
        assert!(Resolving.can_transition(Failed));
        assert!(Resolving.can_transition(Skipped));
        assert!(Executing.can_transition(Succeeded));
        assert!(Executing.can_transition(Failed));

        assert!(!Pending.can_transition(Executing));
        assert!(!Resolving.can_transition(Succeeded));
        assert!(!Succeeded.can_transition(Executing));
        assert!(!Skipped.can_transition(Failed));
    }

    #[test]
    fn illegal_transition_leaves_state_unchanged() {
        let mut states = HashMap::new();
        transition(&mut states, "a", ModelState::Resolving);
        transition(&mut states, "a", ModelState::Skipped);
        transition(&mut states, "a", ModelState::Executing);

        assert_eq!(states.get("a"), Some(&ModelState::Skipped));
    }
}
