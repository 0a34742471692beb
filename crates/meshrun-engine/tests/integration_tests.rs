//! End-to-end runner tests against the mock and DuckDB warehouses

use meshrun_core::{Config, ErrorCode, Materialization, Relation, RunStatus, SourceConfig};
use meshrun_engine::{ArtifactWriter, Compiler, ExecutionPlan, ModelState, RunOutcome, Runner};
use meshrun_project::{Manifest, Model, Project};
use meshrun_warehouse::{DuckDbWarehouse, ExecutionError, MockWarehouse, Warehouse};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Every model ends in the terminal state its report entry names
fn assert_states_match_report(outcome: &RunOutcome) {
    assert_eq!(outcome.states.len(), outcome.report.results.len());
    for (model, status) in outcome.report.statuses() {
        let expected = match status {
            RunStatus::Succeeded => ModelState::Succeeded,
            RunStatus::Failed => ModelState::Failed,
            RunStatus::Skipped => ModelState::Skipped,
        };
        assert_eq!(outcome.state(model), Some(expected), "state of {}", model);
    }
}

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/mesh-project")
}

fn project(models: &[(&str, &str)]) -> Project {
    let mut config = Config::default();
    config.name = "dbt_up".to_string();
    config.sources = vec![SourceConfig::new("raw", "raw_orders")];
    let models = models
        .iter()
        .map(|(name, sql)| Model::from_sql(*name, format!("models/{}.sql", name), *sql, &config).unwrap())
        .collect();
    Project::from_parts(config, models).unwrap()
}

fn seeded_duckdb() -> DuckDbWarehouse {
    let setup = std::fs::read_to_string(fixture_dir().join("setup.sql")).unwrap();
    let warehouse = DuckDbWarehouse::open_in_memory().unwrap();
    warehouse.execute_batch(&setup).unwrap();
    warehouse
}

const STG_ORDERS: &str = "{{ config(materialized='view') }}
select id as order_id, upper(status) as status, amount
from {{ source('raw', 'raw_orders') }}";

const PUBLIC_ORDERS: &str = "{{ config(materialized='table', access='public') }}
select order_id, status, amount
from {{ ref('stg_orders') }}
where status in ('COMPLETED', 'SHIPPED', 'PENDING')";

#[test]
fn staging_then_table_succeeds_in_order() {
    let project = project(&[("public_orders", PUBLIC_ORDERS), ("stg_orders", STG_ORDERS)]);
    let warehouse = MockWarehouse::new();

    let outcome = Runner::new(&project).run(&warehouse);
    let report = outcome.report;

    assert_eq!(
        report.statuses(),
        vec![
            ("stg_orders", RunStatus::Succeeded),
            ("public_orders", RunStatus::Succeeded),
        ]
    );
    assert_eq!(report.summary.succeeded, 2);
    assert!(!report.has_failures());
    assert!(!report.aborted);

    let calls = warehouse.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].materialization, Materialization::View);
    assert_eq!(calls[0].relation, Relation::new("main", "stg_orders"));
    assert_eq!(calls[1].materialization, Materialization::Table);
    assert!(calls[1].select.contains("from main.stg_orders"));
    assert!(!calls[1].select.contains("{{"));
}

#[test]
fn unresolved_reference_makes_no_engine_calls() {
    let project = project(&[(
        "public_orders",
        "select * from {{ ref('stg_missing') }} where status = 'SHIPPED'",
    )]);
    let warehouse = MockWarehouse::new();

    let report = Runner::new(&project).run(&warehouse).report;

    assert_eq!(warehouse.call_count(), 0);
    assert!(report.aborted);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.succeeded, 0);

    let detail = report.results[0].error_detail.as_ref().unwrap();
    assert_eq!(detail.code, ErrorCode::UnresolvedReference);
    assert!(detail.message.contains("stg_missing"));
}

#[test]
fn configuration_error_skips_every_other_model() {
    let project = project(&[
        ("a_ok", "select 1 as id"),
        ("b_broken", "select * from {{ source('raw', 'customers') }}"),
        ("c_ok", "select * from {{ ref('a_ok') }}"),
    ]);
    let warehouse = MockWarehouse::new();

    let outcome = Runner::new(&project).run(&warehouse);
    assert_states_match_report(&outcome);
    let report = outcome.report;

    assert_eq!(warehouse.call_count(), 0);
    assert_eq!(
        report.statuses(),
        vec![
            ("a_ok", RunStatus::Skipped),
            ("b_broken", RunStatus::Failed),
            ("c_ok", RunStatus::Skipped),
        ]
    );
    assert_eq!(
        report.get("a_ok").unwrap().error_detail.as_ref().unwrap().code,
        ErrorCode::RunAborted
    );
}

#[test]
fn invalid_statement_aborts_before_execution() {
    let project = project(&[
        ("stg_orders", STG_ORDERS),
        ("evil", "select 1; drop table main.stg_orders"),
    ]);
    let warehouse = MockWarehouse::new();

    let report = Runner::new(&project).run(&warehouse).report;

    assert_eq!(warehouse.call_count(), 0);
    assert_eq!(
        report.get("evil").unwrap().error_detail.as_ref().unwrap().code,
        ErrorCode::SqlValidation
    );
}

#[test]
fn cycle_fails_members_with_no_engine_calls() {
    let project = project(&[
        ("a", "select * from {{ ref('b') }}"),
        ("b", "select * from {{ ref('c') }}"),
        ("c", "select * from {{ ref('a') }}"),
        ("d", "select 1 as id"),
    ]);
    let warehouse = MockWarehouse::new();

    let outcome = Runner::new(&project).run(&warehouse);

    assert_eq!(warehouse.call_count(), 0);
    assert!(outcome.plan.is_none());
    assert!(outcome.report.aborted);
    assert_eq!(
        outcome.report.statuses(),
        vec![
            ("a", RunStatus::Failed),
            ("b", RunStatus::Failed),
            ("c", RunStatus::Failed),
            ("d", RunStatus::Skipped),
        ]
    );
    let detail = outcome.report.get("a").unwrap().error_detail.as_ref().unwrap();
    assert_eq!(detail.code, ErrorCode::CyclicDependency);
    assert_eq!(detail.message, "cyclic dependency: a -> b -> c -> a");
    assert_states_match_report(&outcome);
}

#[test]
fn engine_failure_skips_dependents_only() {
    let project = project(&[
        ("stg_orders", STG_ORDERS),
        ("public_orders", PUBLIC_ORDERS),
        ("orders_report", "select count(*) as n from {{ ref('public_orders') }}"),
        ("calendar", "select 1 as day"),
    ]);
    let warehouse = MockWarehouse::new()
        .with_failure("main.public_orders", "Binder Error: column \"amount\" not found");

    let outcome = Runner::new(&project).run(&warehouse);
    assert_states_match_report(&outcome);
    let report = outcome.report;

    assert_eq!(
        report.statuses(),
        vec![
            ("stg_orders", RunStatus::Succeeded),
            ("public_orders", RunStatus::Failed),
            ("orders_report", RunStatus::Skipped),
            ("calendar", RunStatus::Succeeded),
        ]
    );

    let failed = report.get("public_orders").unwrap().error_detail.as_ref().unwrap();
    assert_eq!(failed.code, ErrorCode::EngineExecution);
    assert!(failed.message.contains("Binder Error: column \"amount\" not found"));
    assert_eq!(failed.impact, vec!["orders_report"]);

    let skipped = report.get("orders_report").unwrap().error_detail.as_ref().unwrap();
    assert_eq!(skipped.code, ErrorCode::UpstreamFailed);
    assert_eq!(skipped.message, "upstream model `public_orders` failed");

    assert_eq!(
        warehouse.called_relations(),
        vec!["main.stg_orders", "main.public_orders", "main.calendar"]
    );
    assert!(report.has_failures());
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let project = project(&[("stg_orders", STG_ORDERS), ("public_orders", PUBLIC_ORDERS)]);
    let warehouse = MockWarehouse::new();
    let flag = Arc::new(AtomicBool::new(true));

    let report = Runner::new(&project).with_cancel_flag(flag).run(&warehouse).report;

    assert_eq!(warehouse.call_count(), 0);
    assert!(report.cancelled);
    assert!(report
        .results
        .iter()
        .all(|r| r.error_detail.as_ref().unwrap().code == ErrorCode::Cancelled));
}

/// Sets the cancellation flag once the first statement has run
struct CancelAfterFirst {
    inner: MockWarehouse,
    flag: Arc<AtomicBool>,
}

impl Warehouse for CancelAfterFirst {
    fn name(&self) -> &'static str {
        "CancelAfterFirst"
    }

    fn create_view(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        let result = self.inner.create_view(relation, select);
        self.flag.store(true, Ordering::SeqCst);
        result
    }

    fn create_table(&self, relation: &Relation, select: &str) -> Result<(), ExecutionError> {
        let result = self.inner.create_table(relation, select);
        self.flag.store(true, Ordering::SeqCst);
        result
    }
}

#[test]
fn cancellation_mid_run_skips_remaining_models() {
    let project = project(&[("stg_orders", STG_ORDERS), ("public_orders", PUBLIC_ORDERS)]);
    let runner = Runner::new(&project);
    let warehouse = CancelAfterFirst {
        inner: MockWarehouse::new(),
        flag: runner.cancel_flag(),
    };

    let report = runner.run(&warehouse).report;

    assert_eq!(warehouse.inner.call_count(), 1);
    assert!(report.cancelled);
    assert_eq!(
        report.statuses(),
        vec![
            ("stg_orders", RunStatus::Succeeded),
            ("public_orders", RunStatus::Skipped),
        ]
    );
}

#[test]
fn fixture_project_runs_against_duckdb() {
    let project = Project::load(&fixture_dir()).unwrap();
    let warehouse = seeded_duckdb();

    let outcome = Runner::new(&project).run(&warehouse);

    assert_eq!(
        outcome.report.statuses(),
        vec![
            ("order_statuses", RunStatus::Succeeded),
            ("stg_orders", RunStatus::Succeeded),
            ("public_orders", RunStatus::Succeeded),
            ("orders_by_status", RunStatus::Succeeded),
        ]
    );

    assert_eq!(
        warehouse
            .query_strings("select order_id, status from main.public_orders order by order_id")
            .unwrap(),
        vec![
            vec!["1", "COMPLETED"],
            vec!["2", "SHIPPED"],
            vec!["3", "PENDING"],
            vec!["5", "COMPLETED"],
        ]
    );
    assert_eq!(
        warehouse
            .query_strings(
                "select status, order_count, cast(total_amount as varchar) \
                 from main.orders_by_status order by status"
            )
            .unwrap(),
        vec![
            vec!["COMPLETED", "2", "30.00"],
            vec!["PENDING", "1", "12.25"],
            vec!["SHIPPED", "1", "40.50"],
        ]
    );
}

#[test]
fn running_twice_yields_identical_contents() {
    let project = Project::load(&fixture_dir()).unwrap();
    let warehouse = seeded_duckdb();
    let snapshot = |w: &DuckDbWarehouse| {
        (
            w.query_strings("select * from main.public_orders order by order_id").unwrap(),
            w.query_strings("select * from main.orders_by_status order by status").unwrap(),
        )
    };

    let first = Runner::new(&project).run(&warehouse);
    let after_first = snapshot(&warehouse);
    let second = Runner::new(&project).run(&warehouse);
    let after_second = snapshot(&warehouse);

    assert!(!first.report.has_failures());
    assert!(!second.report.has_failures());
    assert_eq!(after_first, after_second);
}

#[test]
fn failed_table_rebuild_keeps_previous_contents() {
    let warehouse = seeded_duckdb();
    let good = project(&[("stg_orders", STG_ORDERS), ("public_orders", PUBLIC_ORDERS)]);
    assert!(!Runner::new(&good).run(&warehouse).report.has_failures());

    // Valid SQL the engine rejects at bind time
    let bad = project(&[
        ("stg_orders", STG_ORDERS),
        (
            "public_orders",
            "{{ config(materialized='table') }} select order_id, no_such_column from {{ ref('stg_orders') }}",
        ),
    ]);
    let report = Runner::new(&bad).run(&warehouse).report;

    let detail = report.get("public_orders").unwrap().error_detail.as_ref().unwrap();
    assert_eq!(detail.code, ErrorCode::EngineExecution);
    assert!(detail.message.contains("no_such_column"));
    assert_eq!(
        warehouse.query_strings("select count(*) from main.public_orders").unwrap(),
        vec![vec!["4"]]
    );
}

#[test]
fn compile_writes_manifest_and_compiled_sql() {
    let project = Project::load(&fixture_dir()).unwrap();
    let compiled = Compiler::new(&project).compile().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(dir.path().join("target"));
    let manifest = writer.write_compiled(&project, &compiled).unwrap();

    let stg_sql = std::fs::read_to_string(writer.compiled_path("stg_orders")).unwrap();
    assert!(stg_sql.contains("from raw.raw_orders"));
    assert!(!stg_sql.contains("{{"));

    // parent/child maps mirror the dependencies the resolver recorded
    assert_eq!(
        manifest.parent_map["model.dbt_up.orders_by_status"],
        vec!["model.dbt_up.order_statuses", "model.dbt_up.public_orders"]
    );
    assert_eq!(
        manifest.parent_map["model.dbt_up.stg_orders"],
        vec!["source.dbt_up.raw.raw_orders"]
    );
    assert_eq!(
        manifest.child_map["model.dbt_up.stg_orders"],
        vec!["model.dbt_up.public_orders"]
    );
    assert!(manifest.parent_map["model.dbt_up.order_statuses"].is_empty());

    let on_disk = Manifest::from_file(&writer.manifest_path()).unwrap();
    assert_eq!(on_disk, manifest);

    let plan = ExecutionPlan::build(&compiled).unwrap();
    assert_eq!(
        plan.order(),
        &["order_statuses", "stg_orders", "public_orders", "orders_by_status"]
    );
}
