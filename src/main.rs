use anyhow::{anyhow, Context, Result};
use pipeline_engine::cli::commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use pipeline_engine::cli::output::*;
use pipeline_engine::cli::{Cli, Command};
use pipeline_engine::persistence::{InMemoryPersistence, PersistenceBackend};
use pipeline_engine::{
    Engine, EngineConfig, ExecutionStatus, ExecutionSummary, HealState, ShellExecutor,
    StatusReport,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "sqlite")]
use pipeline_engine::persistence::SqliteExecutionStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_filter = if cli.verbose { "pipeline_engine=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config_path();
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &config_path).await?,
        Command::Validate(cmd) => validate_config(cmd, &config_path)?,
        Command::List(cmd) => list_pipelines(cmd, &config_path)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    EngineConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

#[cfg(feature = "sqlite")]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(SqliteExecutionStore::with_default_path().await?))
}

#[cfg(not(feature = "sqlite"))]
async fn history_store() -> Result<Arc<dyn PersistenceBackend>> {
    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn run_pipeline(cmd: &RunCommand, config_path: &Path) -> Result<()> {
    let mut config = load_config(config_path)?;
    if cmd.no_heal {
        config.settings.auto_heal = false;
    }
    if let Some(strategy) = cmd.strategy {
        config.settings.strategy = strategy.to_strategy(cmd.max_parallel);
    }

    let params: HashMap<String, String> = cmd.param.iter().cloned().collect();
    for (key, value) in &params {
        println!(
            "{} Parameter: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        history_store().await?
    };

    let engine = Engine::from_config(&config, ShellExecutor::new());

    let spinner = create_spinner(format!("Running {}", cmd.pipeline));
    if !cmd.json {
        let printer = spinner.clone();
        engine.subscribe(move |event| printer.println(format_execution_event(&event)));
    }

    engine.start().await;
    let first = engine
        .execute(&cmd.pipeline, cmd.id.clone(), params)
        .await
        .context("Failed to submit pipeline")?;

    // Follow the chain of auto-heal resubmissions
    let wait = Duration::from_secs(cmd.wait_secs);
    let mut chain: Vec<StatusReport> = Vec::new();
    let mut current = first;
    loop {
        let report = engine
            .wait_until_settled(&current, wait)
            .await
            .ok_or_else(|| anyhow!("Timed out waiting for execution {}", current))?;
        chain.push(report.clone());
        match report.heal {
            Some(HealState::Resubmitted { execution_id, .. }) => current = execution_id,
            _ => break,
        }
    }
    spinner.finish_and_clear();
    engine.stop().await;

    // Save to history
    let mut summaries: Vec<ExecutionSummary> = Vec::new();
    for report in &chain {
        if let Some(record) = engine.tracker().get(&report.id).await {
            summaries.push(record.summary());
        }
    }
    if !cmd.no_history {
        for summary in &summaries {
            store.save_execution(summary).await?;
        }
    }

    let Some(last) = chain.last() else {
        return Err(anyhow!("No execution was recorded"));
    };
    let succeeded = last.status == ExecutionStatus::Success;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
    } else {
        for report in &chain {
            if cmd.logs || report.status != ExecutionStatus::Success {
                let logs = engine.logs(&report.id).await.unwrap_or_default();
                println!("\n{} Logs for {}:", INFO, style(&report.id).dim());
                println!("{}", format_logs(&logs, 50));
            }
            println!("{} {}", INFO, format_report(report));
        }

        if !cmd.no_history {
            println!(
                "\n{} {} execution(s) saved to history",
                INFO,
                style(summaries.len()).cyan()
            );
        }

        if succeeded {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&last.pipeline_name).bold(),
                style("successfully").green()
            );
        } else {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&last.pipeline_name).bold(),
                style("failed").red()
            );
        }
    }

    if !succeeded {
        error!(
            "{}",
            last.error_message.as_deref().unwrap_or("pipeline did not succeed")
        );
        std::process::exit(1);
    }

    Ok(())
}

fn validate_config(cmd: &ValidateCommand, config_path: &Path) -> Result<()> {
    println!("{} Validating {}...", INFO, config_path.display());

    match load_config(config_path) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
            println!(
                "  Error patterns: {}",
                style(config.to_registry().len()).cyan()
            );

            for pipeline in config.to_pipelines() {
                for (step, dep) in pipeline.dangling_dependencies() {
                    println!(
                        "  {} {}: step {} depends on unknown step {}",
                        WARN,
                        style(&pipeline.name).bold(),
                        style(step).cyan(),
                        style(dep).red()
                    );
                }
                if pipeline.has_cycle() {
                    println!(
                        "  {} {}: dependency cycle, will never complete",
                        WARN,
                        style(&pipeline.name).bold()
                    );
                }
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {:#}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn list_pipelines(cmd: &ListCommand, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipelines = config.to_pipelines();

    if cmd.json {
        let data: Vec<_> = pipelines
            .iter()
            .map(|p| serde_json::json!({ "name": p.name, "steps": p.steps }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if pipelines.is_empty() {
        println!("{} No pipelines configured", INFO);
        return Ok(());
    }

    println!("{} Pipelines:", INFO);
    for pipeline in &pipelines {
        println!(
            "  {} ({} steps)",
            style(&pipeline.name).bold(),
            style(pipeline.steps.len()).cyan()
        );
        if cmd.steps {
            for step in &pipeline.steps {
                let deps = if step.dependencies.is_empty() {
                    String::new()
                } else {
                    format!(" <- {}", step.dependencies.join(", "))
                };
                println!(
                    "    {} [{:?}]{}",
                    style(&step.name).cyan(),
                    step.stage,
                    style(deps).dim()
                );
            }
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = history_store().await?;

    if let Some(execution_id) = &cmd.execution_id {
        match store.load_execution(execution_id).await? {
            Some(summary) => print_execution_details(&summary, cmd.verbose)?,
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let executions = match &cmd.pipeline {
        Some(pipeline_name) => {
            let mut execs = store.list_executions(pipeline_name).await?;
            execs.truncate(cmd.limit);
            execs
        }
        None => store.recent(cmd.limit).await?,
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
    println!("  ID: {}", style(&summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(ended) = summary.ended_at {
        println!("  Ended: {}", style(ended.to_rfc3339()).dim());
        if let Ok(duration) = ended.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!("  Steps: {}", summary.steps_total);
    if let Some(error) = &summary.error_message {
        println!("  Error: {}", style(error).red());
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
