use anyhow::{Context, Result};
use jobgraph::cli::commands::{GraphCommand, HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use jobgraph::cli::output::*;
use jobgraph::cli::{Cli, Command};
use jobgraph::core::{config::PipelineConfig, ExecutionStatus, PipelineContext, StepStatus};
use jobgraph::execution::{ExecutionEngine, ExecutionEvent};
use jobgraph::persistence::{create_summary, ExecutionSummary, InMemoryPersistence, PersistenceBackend};
use jobgraph::runner::ShellTaskRunner;
use jobgraph::store::{CacheStore, FsArtifactStore, FsCacheStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Graph(cmd) => show_graph(cmd)?,
        Command::List(cmd) => list_pipelines(cmd).await?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    let store = jobgraph::persistence::SqliteExecutionStore::with_default_path()
        .await
        .context("Failed to open execution history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without the sqlite feature; history is not kept between runs");
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut pipeline = config.to_pipeline();

    // Apply variable overrides
    for (key, value) in &cmd.variable {
        pipeline.variables.insert(key.clone(), value.clone());
        println!(
            "{} Variable override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let workspace = match &cmd.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let mut context = PipelineContext::new(&workspace);
    for name in context.load_secrets_from_env(&pipeline.secrets) {
        warn!("Secret {} is not set in the environment", name);
        println!("{} Secret {} is not set", WARN, style(name).yellow());
    }

    // Stores
    let cache = match &cmd.cache_dir {
        Some(dir) => FsCacheStore::new(dir),
        None => FsCacheStore::with_default_path(),
    };
    let cache: Arc<dyn CacheStore> =
        Arc::new(cache.with_max_age(chrono::Duration::days(i64::from(cmd.cache_max_age_days))));
    let artifact_root = cmd
        .artifact_dir
        .clone()
        .unwrap_or_else(FsArtifactStore::default_root)
        .join(pipeline.state.execution_id.to_string());
    let artifacts = Arc::new(FsArtifactStore::new(&artifact_root));

    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        open_history().await?
    };

    // Create execution engine
    let runner = ShellTaskRunner::new(cmd.runner_config());
    info!("Running steps with {}", runner.shell());
    let mut engine = ExecutionEngine::new(Arc::new(runner), cmd.scheduling_strategy())
        .with_cache_store(cache)
        .with_artifact_store(artifacts);

    // Set up event handler for console output
    let progress = create_progress_bar(pipeline.jobs.len());
    let bar = progress.clone();
    let show_output = cmd.show_output;
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::JobStarted { job_id } => bar.set_message(job_id.clone()),
            ExecutionEvent::JobFinished { .. } | ExecutionEvent::JobSkipped { .. } => bar.inc(1),
            _ => {}
        }
        bar.println(format_execution_event(&event));

        if show_output {
            if let ExecutionEvent::StepFinished { status, output, .. } = &event {
                if matches!(status, StepStatus::Failed | StepStatus::Tolerated) && !output.is_empty() {
                    bar.println(format_output(output, 20));
                }
            }
        }
    });

    // Execute pipeline
    println!();
    let result = engine.execute(&mut pipeline, &context).await;
    progress.finish_and_clear();

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&pipeline);
        store.save_execution(&summary).await?;
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }
    if artifact_root.exists() {
        println!("{} Artifacts: {}", INFO, style(artifact_root.display()).dim());
    }

    // Print final status
    match result {
        Ok(result) if result.is_success() => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Ok(result) => {
            println!("\n{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            for (job_id, status) in &result.jobs {
                println!("  {} {}", style(job_id).bold(), format_job_status(*status));
            }
            std::process::exit(1);
        }
        Err(e) => {
            println!("\n{} {} {}", CROSS, style(&pipeline.name).bold(), style("failed").red());
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            println!(
                "  Steps: {}",
                style(config.jobs.iter().map(|j| j.steps.len()).sum::<usize>()).cyan()
            );
            println!("  Variables: {}", style(config.variables_as_string_map().len()).cyan());
            if !config.secrets.is_empty() {
                println!("  Secrets: {}", style(config.secrets.join(", ")).dim());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn show_graph(cmd: &GraphCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;
    let pipeline = config.to_pipeline();

    println!("{} {}\n", INFO, style(&pipeline.name).bold());
    print!("{}", format_graph(&pipeline));
    Ok(())
}

async fn list_pipelines(cmd: &ListCommand) -> Result<()> {
    let store = open_history().await?;
    let pipelines = store.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{} No pipelines found in history", INFO);
        return Ok(());
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len(),
                "succeeded": executions.iter().filter(|e| e.is_success()).count(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let succeeded = executions.iter().filter(|e| e.is_success()).count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<()> {
    let store = open_history().await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_execution_details(&summary, verbose)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    // List executions for pipeline or all
    let executions = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut executions = store.list_executions(pipeline_name).await?;
            executions.truncate(cmd.limit);
            executions
        }
        None => store.list_recent(cmd.limit).await?,
    };

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({} succeeded, {} failed, {} skipped of {})",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.succeeded_jobs,
        summary.failed_jobs,
        summary.skipped_jobs,
        summary.total_jobs
    );
    println!("  Jobs:");
    for (job_id, status) in &summary.jobs {
        println!("    {} {}", style(job_id).bold(), format_job_status(*status));
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
