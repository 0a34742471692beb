//! Integration tests for project loading, graphs and manifests

use meshrun_core::{Access, Config, Materialization, Reference, UpstreamConfig};
use meshrun_project::{
    CompiledNode, DependencyGraph, LineageStatus, LineageValidator, Manifest, Model, Project,
    RegistryPublisher, UpstreamCatalog,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/mesh-project")
}

fn model_graph(project: &Project) -> DependencyGraph {
    DependencyGraph::new(project.models.iter().map(|m| {
        (
            m.name.clone(),
            m.model_dependencies().map(str::to_string).collect::<Vec<_>>(),
        )
    }))
}

fn compiled(project: &Project) -> Vec<CompiledNode<'_>> {
    project
        .models
        .iter()
        .map(|m| CompiledNode {
            model: m,
            compiled_sql: &m.sql_template,
            dependencies: &m.referenced_names,
        })
        .collect()
}

#[test]
fn load_fixture_project() {
    let project = Project::load(&fixture_dir()).unwrap();

    assert_eq!(project.config.name, "dbt_up");
    assert_eq!(
        project.model_names().collect::<Vec<_>>(),
        vec!["order_statuses", "orders_by_status", "public_orders", "stg_orders"]
    );
    assert_eq!(project.sources.len(), 1);

    let stg = project.model("stg_orders").unwrap();
    assert_eq!(stg.materialization, Materialization::View);
    assert_eq!(stg.referenced_names, vec![Reference::source("raw", "raw_orders")]);

    let public = project.model("public_orders").unwrap();
    assert_eq!(public.materialization, Materialization::Table);
    assert_eq!(public.access, Access::Public);

    // No config block: falls back to [models.*] and the project default
    let mart = project.model("orders_by_status").unwrap();
    assert_eq!(mart.materialization, Materialization::View);
    assert_eq!(mart.access, Access::Public);

    // Literal UNION ALL rows: a model with no dependencies at all
    assert!(project.model("order_statuses").unwrap().referenced_names.is_empty());
}

#[test]
fn fixture_graph_orders_staging_before_marts() {
    let project = Project::load(&fixture_dir()).unwrap();
    let order = model_graph(&project).topological_sort().unwrap();

    assert_eq!(
        order,
        vec!["order_statuses", "stg_orders", "public_orders", "orders_by_status"]
    );
}

#[test]
fn manifest_maps_mirror_dependencies() {
    let project = Project::load(&fixture_dir()).unwrap();
    let manifest = Manifest::build(&project, compiled(&project));

    assert_eq!(manifest.metadata.project_name, "dbt_up");
    assert_eq!(manifest.nodes.len(), 4);
    assert!(manifest.sources.contains_key("source.dbt_up.raw.raw_orders"));

    assert_eq!(
        manifest.parent_map["model.dbt_up.public_orders"],
        vec!["model.dbt_up.stg_orders"]
    );
    assert_eq!(
        manifest.child_map["source.dbt_up.raw.raw_orders"],
        vec!["model.dbt_up.stg_orders"]
    );
    assert_eq!(
        manifest.child_map["model.dbt_up.public_orders"],
        vec!["model.dbt_up.orders_by_status"]
    );

    let node = manifest.get_node("model.dbt_up.public_orders").unwrap();
    assert_eq!(node.relation_name.as_deref(), Some("main.public_orders"));
    assert_eq!(node.config.materialized.as_deref(), Some("table"));
    assert_eq!(node.access, Some(Access::Public));

    // Survives a write/read cycle
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("target/manifest.json");
    manifest.save_to_file(&path).unwrap();
    assert_eq!(Manifest::from_file(&path).unwrap(), manifest);

    // Graph from manifest agrees with the model graph
    let graph = DependencyGraph::from_manifest(&manifest);
    assert_eq!(
        graph.downstream("model.dbt_up.stg_orders"),
        vec!["model.dbt_up.public_orders", "model.dbt_up.orders_by_status"]
    );
}

#[test]
fn publish_then_reference_from_downstream_project() {
    let upstream = Project::load(&fixture_dir()).unwrap();
    let manifest = Manifest::build(&upstream, compiled(&upstream));

    let workspace = tempfile::tempdir().unwrap();
    let manifest_path = workspace.path().join("dbt_up/target/manifest.json");
    manifest.save_to_file(&manifest_path).unwrap();

    let registry = workspace.path().join("registry");
    let publication = RegistryPublisher::new(&registry)
        .publish(&manifest_path, "dbt_up", "prod")
        .unwrap();
    assert_eq!(
        publication.public_models,
        vec!["model.dbt_up.orders_by_status", "model.dbt_up.public_orders"]
    );

    // Downstream project pointing at the published manifest
    let mut config = Config::default();
    config.name = "dbt_down".to_string();
    config.project_root = workspace.path().join("dbt_down");
    std::fs::create_dir_all(&config.project_root).unwrap();
    config.upstream.push(UpstreamConfig {
        project: "dbt_up".to_string(),
        manifest: PathBuf::from("../registry/dbt_up/prod/latest/manifest.json"),
    });

    let catalog = UpstreamCatalog::from_config(&config).unwrap();
    assert_eq!(catalog.relation("dbt_up", "public_orders"), Some("main.public_orders"));
    assert_eq!(catalog.relation("dbt_up", "stg_orders"), None);

    let report_model = Model::from_sql(
        "orders_report",
        "models/orders_report.sql",
        "select status, count(*) as n from {{ ref('dbt_up', 'public_orders') }} group by status",
        &config,
    )
    .unwrap();

    let downstream = Project::from_parts(config, vec![report_model]).unwrap();
    let downstream_manifest = Manifest::build(&downstream, compiled(&downstream));

    let lineage = LineageValidator::new("dbt_up").validate(&downstream_manifest);
    assert_eq!(lineage.project_name, "dbt_down");
    assert_eq!(lineage.status, LineageStatus::Validated);
    assert_eq!(
        lineage.cross_refs["model.dbt_down.orders_report"],
        vec!["model.dbt_up.public_orders"]
    );

    // The upstream manifest itself has no refs to a "dbt_down" project
    let reverse = LineageValidator::new("dbt_down").validate_file(&manifest_path).unwrap();
    assert_eq!(reverse.status, LineageStatus::Missing);
}
