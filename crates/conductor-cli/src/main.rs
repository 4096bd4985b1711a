//! Conductor CLI - dependency-aware work distribution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use conductor_core::config::Config;
use conductor_core::domain::distribution::{
    DistributionEvent, DistributionEventType, DistributionResult, WorkDistributor,
};
use conductor_core::domain::graph::DependencyAnalyzer;
use conductor_core::domain::planning::{ExecutionPlan, ExecutionPlanner, Worker};
use conductor_core::domain::progress::{FeatureStatus, ProgressSnapshot, read_snapshot};
use conductor_core::infrastructure::{
    EventLog, Manifest, SimulatedWorkerPool, SimulationConfig,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(author, version, about = "Dependency-aware work distribution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and show its batches
    Analyze {
        /// Manifest file (JSON or TOML)
        manifest: PathBuf,
    },

    /// Build an execution plan without running it
    Plan {
        /// Manifest file (JSON or TOML)
        manifest: PathBuf,
        /// Number of workers when the manifest declares none
        #[arg(short, long, default_value_t = 3)]
        workers: usize,
        /// Skip the rebalancing pass
        #[arg(long)]
        no_optimize: bool,
    },

    /// Run a manifest against a simulated worker pool
    Run {
        /// Manifest file (JSON or TOML)
        manifest: PathBuf,
        /// Number of workers when the manifest declares none
        #[arg(short, long, default_value_t = 3)]
        workers: usize,
        /// Fraction of each estimated time the simulated workers sleep
        #[arg(long, default_value_t = 0.001)]
        time_scale: f64,
        /// Probability that a simulated call fails
        #[arg(long, default_value_t = 0.0)]
        failure_rate: f64,
        /// Override the configured retry count
        #[arg(long)]
        max_retries: Option<u32>,
        /// Override the configured retry delay
        #[arg(long)]
        retry_delay_ms: Option<u64>,
        /// Execute each batch one feature at a time
        #[arg(long)]
        sequential: bool,
        /// Progress snapshot file
        #[arg(long)]
        progress: Option<PathBuf>,
        /// Append every event to this JSONL file
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Show a saved progress snapshot
    Progress {
        /// Snapshot file (defaults to progress.path from the config)
        path: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        "conductor=debug"
    } else if cli.quiet {
        "conductor=warn"
    } else {
        "conductor=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .init();

    match cli.command {
        Commands::Analyze { manifest } => cmd_analyze(&manifest, cli.format),

        Commands::Plan {
            manifest,
            workers,
            no_optimize,
        } => cmd_plan(&manifest, workers, !no_optimize, cli.format),

        Commands::Run {
            manifest,
            workers,
            time_scale,
            failure_rate,
            max_retries,
            retry_delay_ms,
            sequential,
            progress,
            events,
        } => {
            let options = RunOptions {
                workers,
                simulation: SimulationConfig::default()
                    .with_time_scale(time_scale)
                    .with_failure_rate(failure_rate),
                max_retries,
                retry_delay_ms,
                sequential,
                progress,
                events,
            };
            cmd_run(&manifest, options, cli.format, cli.quiet).await
        }

        Commands::Progress { path } => cmd_progress(path, cli.format),

        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

fn cmd_analyze(manifest_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let manifest = Manifest::load(manifest_path)?;

    let mut analyzer = DependencyAnalyzer::new();
    let mut errors = match analyzer.add_features(manifest.features) {
        Ok(()) => Vec::new(),
        Err(conductor_core::Error::Validation(errors)) => errors,
        Err(e) => return Err(e.into()),
    };
    errors.extend(analyzer.validate().errors);
    let cycles = analyzer.detect_cycles().cycles;

    let batches = if errors.is_empty() && cycles.is_empty() {
        analyzer.generate_batches()?
    } else {
        Vec::new()
    };
    let statistics = if errors.is_empty() && cycles.is_empty() {
        Some(analyzer.statistics()?)
    } else {
        None
    };
    let valid = errors.is_empty() && cycles.is_empty();

    match format {
        OutputFormat::Json => {
            let batch_ids: Vec<Vec<&str>> = batches
                .iter()
                .map(|b| b.iter().map(|f| f.id.as_str()).collect())
                .collect();
            let report = serde_json::json!({
                "valid": valid,
                "errors": errors,
                "cycles": cycles,
                "batches": batch_ids,
                "statistics": statistics,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for error in &errors {
                println!("[!!] {}", error);
            }
            for cycle in &cycles {
                println!("[!!] Cycle: {}", cycle.join(" -> "));
            }
            if let Some(stats) = &statistics {
                println!(
                    "Features: {} ({} roots, {} leaves)",
                    stats.total_features, stats.root_features, stats.leaf_features
                );
                println!(
                    "Batches: {} (max parallelism {}, avg size {:.1})",
                    stats.batch_count, stats.max_parallelism, stats.avg_batch_size
                );
                for (index, batch) in batches.iter().enumerate() {
                    let ids: Vec<&str> = batch.iter().map(|f| f.id.as_str()).collect();
                    println!("  Batch {}: {}", index, ids.join(", "));
                }
            }
        }
    }

    if valid {
        Ok(())
    } else {
        Err(anyhow!(
            "Manifest is invalid: {} error(s), {} cycle(s)",
            errors.len(),
            cycles.len()
        ))
    }
}

fn cmd_plan(
    manifest_path: &Path,
    worker_count: usize,
    optimize: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let manifest = Manifest::load(manifest_path)?;
    let roster = roster_for(&manifest, worker_count);

    let mut analyzer = DependencyAnalyzer::new();
    analyzer.add_features(manifest.features)?;
    let report = analyzer.validate();
    if !report.valid {
        return Err(conductor_core::Error::Validation(report.errors).into());
    }
    let batches = analyzer.generate_batches()?;

    let planner = ExecutionPlanner::new(config.planner);
    let mut plan = planner.create_execution_plan(&batches, &roster);
    if optimize {
        plan = planner.optimize_plan(&plan, &roster);
    }
    let statistics = ExecutionPlanner::plan_statistics(&plan);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "plan": plan, "statistics": statistics });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            print_plan(&plan);
            println!();
            for (worker_id, stats) in &statistics.workers {
                println!(
                    "  {}: {} feature(s), {} ({:.0}% of plan)",
                    worker_id,
                    stats.features,
                    format_ms(stats.estimated_time_ms),
                    stats.utilization_percent
                );
            }
        }
    }
    Ok(())
}

struct RunOptions {
    workers: usize,
    simulation: SimulationConfig,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    sequential: bool,
    progress: Option<PathBuf>,
    events: Option<PathBuf>,
}

async fn cmd_run(
    manifest_path: &Path,
    options: RunOptions,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(max_retries) = options.max_retries {
        config.distribution.max_retries = max_retries;
    }
    if let Some(delay) = options.retry_delay_ms {
        config.distribution.retry_delay_ms = delay;
    }
    if options.sequential {
        config.distribution.sequential = true;
    }
    if options.progress.is_some() {
        config.progress.path = options.progress;
    }

    let manifest = Manifest::load(manifest_path)?;
    let roster = roster_for(&manifest, options.workers);
    let pool = SimulatedWorkerPool::new(roster.clone(), options.simulation);

    let distributor = WorkDistributor::new(Arc::new(pool), config.distribution)
        .with_planner(config.planner)
        .with_progress(config.progress);

    if let Some(path) = &options.events {
        let log = Arc::new(
            EventLog::open(path)
                .with_context(|| format!("Failed to open event log: {}", path.display()))?,
        );
        distributor.events().subscribe(log.handler());
    }
    if format == OutputFormat::Text && !quiet {
        distributor.events().subscribe(Arc::new(print_event));
    }

    let run = distributor.distribute_work(manifest.features, Some(roster));
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping distribution");
            distributor.stop().await;
            run.await?
        }
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_result(&result),
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(
            "Distribution finished with {} failed and {} unassigned feature(s)",
            result.failed,
            result.unassigned.len()
        ))
    }
}

fn cmd_progress(path: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::load()?.progress.path.ok_or_else(|| {
            anyhow!("No snapshot path given and progress.path is not configured")
        })?,
    };
    let snapshot = read_snapshot(&path)
        .with_context(|| format!("Failed to read progress snapshot: {}", path.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => print_snapshot(&snapshot),
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            let path = config.save()?;
            info!(path = %path.display(), key = %key, "Configuration saved");
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn roster_for(manifest: &Manifest, worker_count: usize) -> Vec<Worker> {
    manifest.roster().unwrap_or_else(|| {
        (1..=worker_count.max(1))
            .map(|i| Worker::new(format!("worker-{}", i)))
            .collect()
    })
}

fn print_plan(plan: &ExecutionPlan) {
    println!("Execution plan {}", plan.id);
    println!(
        "  Batches: {}  Assignments: {}  Unassigned: {}",
        plan.batches.len(),
        plan.assignment_count(),
        plan.unassigned.len()
    );
    println!("  Estimated time: {}", format_ms(plan.total_estimated_time_ms));
    if plan.optimized {
        println!("  Rebalanced: {} move(s)", plan.reassignments.len());
    }

    for batch in &plan.batches {
        println!(
            "Batch {} ({} - {})",
            batch.index,
            format_ms(batch.start_time_ms),
            format_ms(batch.end_time_ms)
        );
        for assignment in &batch.assignments {
            println!(
                "  {} -> {} ({}, {}, {})",
                assignment.feature_id,
                assignment.worker_id,
                assignment.agent_type,
                assignment.priority,
                format_ms(assignment.estimate.time_ms)
            );
        }
    }
    for unassigned in &plan.unassigned {
        println!("  [!!] {} not assigned: {}", unassigned.feature_id, unassigned.reason);
    }
}

fn print_event(event: &DistributionEvent) {
    let data = event.data.clone().unwrap_or_default();
    let field = |key: &str| data.get(key).map(|v| v.to_string().trim_matches('"').to_string());
    let feature = event.feature_id().unwrap_or("?");

    match event.event_type {
        DistributionEventType::BatchStarted => {
            println!(
                "Batch {} started ({} assignment(s))",
                field("batch").unwrap_or_default(),
                field("assignments").unwrap_or_default()
            );
        }
        DistributionEventType::FeatureComplete => {
            println!(
                "  [OK] {} on {}",
                feature,
                field("worker_id").unwrap_or_default()
            );
        }
        DistributionEventType::FeatureRetry => {
            println!(
                "  [..] {} retry {}: {}",
                feature,
                field("retry").unwrap_or_default(),
                field("error").unwrap_or_default()
            );
        }
        DistributionEventType::FeatureFailed => {
            println!(
                "  [!!] {} failed: {}",
                feature,
                field("error").unwrap_or_default()
            );
        }
        DistributionEventType::BackpressureWait => {
            println!(
                "  Waiting for capacity ({} outstanding)",
                field("outstanding").unwrap_or_default()
            );
        }
        DistributionEventType::Warning => {
            println!("  [!!] {}", field("message").unwrap_or_default());
        }
        _ => {}
    }
}

fn print_result(result: &DistributionResult) {
    println!();
    println!(
        "Run {}: {}/{} succeeded, {} failed, {} retried ({})",
        result.run_id,
        result.successful,
        result.total,
        result.failed,
        result.retried,
        format_ms(result.duration_ms)
    );
    if result.stopped {
        println!("  Stopped before all batches ran");
    }
    for (feature_id, outcome) in result.results.iter().filter(|(_, o)| !o.success) {
        println!(
            "  failed: {} after {} attempt(s): {}",
            feature_id,
            outcome.attempts,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    for feature_id in &result.unassigned {
        println!("  unassigned: {}", feature_id);
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    let overall = &snapshot.overall;
    println!(
        "Progress: {}/{} complete ({:.0}%), {} failed",
        overall.completed, overall.total, overall.percent_complete, overall.failed
    );
    println!("  Started: {}", overall.start_time.to_rfc3339());
    println!("  Saved:   {}", snapshot.saved_at.to_rfc3339());

    for worker in snapshot.workers.values() {
        println!(
            "  {}: {} assigned, {} complete, {} failed{}",
            worker.worker_id,
            worker.assigned_features.len(),
            worker.completed,
            worker.failed,
            worker
                .active_feature
                .as_ref()
                .map(|f| format!(", running {}", f))
                .unwrap_or_default()
        );
    }
    for record in snapshot
        .features
        .values()
        .filter(|f| f.status == FeatureStatus::Failed)
    {
        println!(
            "  [!!] {}: {}",
            record.feature_id,
            record.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn format_ms(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }
    let secs = ms / 1000;
    match (secs / 60, secs % 60) {
        (0, s) => format!("{}.{}s", s, (ms % 1000) / 100),
        (m, s) => format!("{}m {}s", m, s),
    }
}
