use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshrun_core::{Config, RunReport, RunStatus, CONFIG_FILE_NAME};
use meshrun_engine::{ArtifactWriter, Compiler, ExecutionPlan, Runner};
use meshrun_project::{DependencyGraph, LineageStatus, LineageValidator, Manifest, Project, RegistryPublisher};
use meshrun_warehouse::{DuckDbWarehouse, Warehouse};

/// meshrun - build SQL models into a warehouse, in dependency order
#[derive(Parser)]
#[command(name = "meshrun")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Path to config file (default: <project-dir>/meshrun.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, plan and materialize every model
    Run {
        /// SQL script to execute against the warehouse first (e.g. seeding sources)
        #[arg(long)]
        setup: Option<PathBuf>,
    },

    /// Resolve and validate every model, write compiled SQL and the manifest
    Compile,

    /// List models in execution order
    Ls,

    /// Show downstream impact for a model
    Impact {
        /// Model name (short name or unique_id)
        model: String,

        /// Manifest to analyze (default: compile the project)
        #[arg(short = 'f', long)]
        manifest: Option<PathBuf>,
    },

    /// Publish the manifest to a registry directory
    Publish {
        /// Registry root directory
        #[arg(short, long)]
        registry: PathBuf,

        /// Environment partition (e.g. dev, prod)
        #[arg(short, long, default_value = "prod")]
        env: String,

        /// Manifest to publish (default: target/manifest.json)
        #[arg(short = 'f', long)]
        manifest: Option<PathBuf>,
    },

    /// Check that manifests record dependencies on an upstream project
    Lineage {
        /// Upstream project name
        #[arg(short, long)]
        upstream: String,

        /// Downstream manifest files
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        project_dir,
        config,
        verbose,
        command,
    } = Cli::parse();

    init_tracing(verbose);
    dotenvy::from_path(project_dir.join(".env")).ok();
    dotenvy::dotenv().ok();

    match command {
        Commands::Run { setup } => {
            let config = load_config(&project_dir, config.as_deref(), verbose)?;
            run_command(config, setup.as_deref(), verbose).await
        }
        Commands::Compile => {
            let config = load_config(&project_dir, config.as_deref(), verbose)?;
            compile_command(config, verbose)
        }
        Commands::Ls => {
            let config = load_config(&project_dir, config.as_deref(), verbose)?;
            ls_command(config)
        }
        Commands::Impact { model, manifest } => {
            let config = load_config(&project_dir, config.as_deref(), verbose)?;
            impact_command(config, &model, manifest.as_deref(), verbose)
        }
        Commands::Publish {
            registry,
            env,
            manifest,
        } => {
            let config = load_config(&project_dir, config.as_deref(), verbose)?;
            publish_command(&config, &registry, &env, manifest.as_deref())
        }
        Commands::Lineage {
            upstream,
            manifests,
        } => lineage_command(&upstream, &manifests),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(project_dir: &Path, config_path: Option<&Path>, verbose: bool) -> Result<Config> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.join(CONFIG_FILE_NAME));

    if verbose {
        eprintln!("{} {}", "Loading config from:".cyan(), path.display());
    }

    let mut config = Config::from_file(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config
        .apply_env_overrides(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;

    Ok(config)
}

fn load_project(config: Config, verbose: bool) -> Result<Project> {
    let project = Project::from_config(config).context("Failed to load project")?;

    if verbose {
        eprintln!(
            "{} {} ({} models, {} sources)",
            "Loaded project".cyan(),
            project.config.name,
            project.models.len(),
            project.sources.len()
        );
    }

    Ok(project)
}

/// Run command - materialize every model
async fn run_command(config: Config, setup: Option<&Path>, verbose: bool) -> Result<()> {
    let project = load_project(config, verbose)?;

    let location = project.config.warehouse_location();
    let warehouse = DuckDbWarehouse::open(&location)
        .with_context(|| format!("Failed to open warehouse at {}", location))?;

    if verbose {
        eprintln!("{} {} ({})", "Using warehouse".cyan(), warehouse.name(), location);
    }

    if let Some(script) = setup {
        let sql = std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read {}", script.display()))?;
        warehouse
            .execute_batch(&sql)
            .with_context(|| format!("Setup script {} failed", script.display()))?;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted: finishing the current model, then stopping".yellow());
            interrupt.store(true, Ordering::SeqCst);
        }
    });

    let (project, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = Runner::new(&project).with_cancel_flag(cancel).run(&warehouse);
        (project, outcome)
    })
    .await
    .context("Runner task failed")?;

    let writer = ArtifactWriter::from_config(&project.config);
    if let Some(compiled) = &outcome.compiled {
        writer.write_compiled(&project, compiled)?;
    }
    let results_path = writer.write_run_results(&outcome.report)?;

    print_run_report(&outcome.report);

    if verbose {
        eprintln!("{} {}", "Run results saved to:".green(), results_path.display());
    }

    if outcome.report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// Compile command - resolve and validate without touching the warehouse
fn compile_command(config: Config, verbose: bool) -> Result<()> {
    let project = load_project(config, verbose)?;

    let compiled = match Compiler::new(&project).compile() {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red().bold(), e.model.bold(), e.diagnostic);
            std::process::exit(1);
        }
    };

    let writer = ArtifactWriter::from_config(&project.config);
    writer.write_compiled(&project, &compiled)?;

    for model in &compiled.models {
        println!(
            "  {} {} -> {}",
            "✓".green(),
            model.name,
            writer.compiled_path(&model.name).display()
        );
    }
    println!(
        "{} {} models, manifest written to {}",
        "Compiled".green().bold(),
        compiled.models.len(),
        writer.manifest_path().display()
    );

    Ok(())
}

/// Ls command - models in execution order
fn ls_command(config: Config) -> Result<()> {
    let project = load_project(config, false)?;
    let plan = ExecutionPlan::from_project(&project).context("Cannot order models")?;

    for (i, name) in plan.order().iter().enumerate() {
        let Some(model) = project.model(name) else {
            continue;
        };
        println!(
            "{:>3}. {} {} {}",
            i + 1,
            name.bold(),
            format!("[{}]", model.materialization).cyan(),
            project.relation_for(name).to_string().dimmed()
        );
    }

    Ok(())
}

/// Impact command - show downstream dependencies
fn impact_command(config: Config, model: &str, manifest_path: Option<&Path>, verbose: bool) -> Result<()> {
    let manifest = match manifest_path {
        Some(path) => {
            if verbose {
                eprintln!("{} {}", "Loading manifest from:".cyan(), path.display());
            }
            Manifest::from_file(path).context("Failed to load manifest")?
        }
        None => {
            let project = load_project(config, verbose)?;
            let compiled = Compiler::new(&project)
                .compile()
                .map_err(|e| anyhow::anyhow!("Failed to compile project: {}", e))?;
            compiled.manifest(&project)
        }
    };

    let dag = DependencyGraph::from_manifest(&manifest);
    let node_id = find_node_id(&manifest, model)?;
    let downstream = dag.downstream(&node_id);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Downstream Impact Analysis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Model:".bold(), node_id.green());
    println!("{} {}", "Downstream models:".bold(), downstream.len());
    println!();

    if downstream.is_empty() {
        println!("{}", "✓ No downstream dependencies".green());
    } else {
        for (i, dep) in downstream.iter().enumerate() {
            println!("  {}. {}", i + 1, dep.yellow());
        }
        println!();
        println!("{}", "⚠ A failure here skips every model listed above".yellow().bold());
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());

    Ok(())
}

/// Find node ID from short name or unique_id
fn find_node_id(manifest: &Manifest, name: &str) -> Result<String> {
    if manifest.get_node(name).is_some() || manifest.sources.contains_key(name) {
        return Ok(name.to_string());
    }

    if let Some(node) = manifest.find_model(name) {
        return Ok(node.unique_id.clone());
    }

    Err(anyhow::anyhow!(
        "Model '{}' not found. Try the full unique_id (e.g., 'model.{}.{}')",
        name,
        manifest.metadata.project_name,
        name
    ))
}

/// Publish command - copy the manifest into a registry
fn publish_command(config: &Config, registry: &Path, env: &str, manifest_path: Option<&Path>) -> Result<()> {
    let manifest_path = manifest_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.manifest_path());

    let publication = RegistryPublisher::new(registry)
        .publish(&manifest_path, &config.name, env)
        .context("Publish failed")?;

    println!("{} {}", "Published".green().bold(), publication.latest.display());
    println!("  {} {}", "history:".dimmed(), publication.history.display());

    if publication.public_models.is_empty() {
        println!("{}", "⚠ No public models: downstream projects cannot ref anything".yellow());
    } else {
        println!("{} {}", "Public models:".bold(), publication.public_models.len());
        for model in &publication.public_models {
            println!("  - {}", model);
        }
    }

    Ok(())
}

/// Lineage command - validate cross-project lineage in each manifest
fn lineage_command(upstream: &str, manifests: &[PathBuf]) -> Result<()> {
    let validator = LineageValidator::new(upstream);
    let mut all_ok = true;

    for path in manifests {
        match validator.validate_file(path) {
            Ok(report) => {
                let marker = match report.status {
                    LineageStatus::Validated => "✓".green(),
                    LineageStatus::Partial => "~".yellow(),
                    LineageStatus::Missing => "✗".red(),
                };
                println!("{} {} ({}): {}", marker, report.project_name.bold(), path.display(), report.message());
                for (node, parents) in &report.cross_refs {
                    println!("    {} <- {}", node, parents.join(", ").cyan());
                }
                all_ok &= report.status.is_success();
            }
            Err(e) => {
                println!("{} {}: {}", "✗".red(), path.display(), e);
                all_ok = false;
            }
        }
    }

    if !all_ok {
        std::process::exit(1);
    }

    Ok(())
}

fn status_label(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Succeeded => "OK".green().bold(),
        RunStatus::Failed => "FAIL".red().bold(),
        RunStatus::Skipped => "SKIP".yellow(),
    }
}

fn print_run_report(report: &RunReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", format!("Run Report: {}", report.project_name).bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    for result in &report.results {
        let materialization = result
            .materialization
            .map(|m| format!(" [{}]", m))
            .unwrap_or_default();
        println!(
            "  {:<5} {}{} {}",
            status_label(result.status),
            result.model_name,
            materialization.cyan(),
            format!("({} ms)", result.duration_ms).dimmed()
        );
        if let Some(detail) = &result.error_detail {
            println!("        {}", detail.to_string().dimmed());
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  Succeeded: {}", report.summary.succeeded.to_string().green());
    if report.summary.failed > 0 {
        println!("  Failed:    {}", report.summary.failed.to_string().red().bold());
    } else {
        println!("  Failed:    {}", report.summary.failed.to_string().green());
    }
    println!("  Skipped:   {}", report.summary.skipped);

    if report.aborted {
        println!("{}", "Run aborted before execution: fix the configuration error above".red());
    }
    if report.cancelled {
        println!("{}", "Run cancelled".yellow());
    }
    println!("{}", "=".repeat(60).bright_blue());
}
