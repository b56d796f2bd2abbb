//! convoy - rehearse operation pipelines without touching any host.
//!
//! Usage:
//!   convoy rehearse <plan.yaml>     Run a plan of scripted steps with live progress
//!   convoy validate <plan.yaml>...  Validate plans without running them

use clap::{Parser, Subcommand};
use convoy::{EventBus, EventHandler, ExecEnv, Journal, Serial, Task, YamlLoader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// convoy - task execution engine for cluster lifecycle operations
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a rehearsal plan and render its progress
    Rehearse {
        /// Path to the plan YAML file
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Progress refresh interval in milliseconds
        #[arg(long, default_value = "500")]
        poll_ms: u64,

        /// Roll back on failure even if the plan does not ask for it
        #[arg(long)]
        rollback: bool,

        /// Write the checkpoint journal as JSON to this file
        #[arg(long, value_name = "FILE")]
        trace_out: Option<PathBuf>,
    },

    /// Validate plans without running them
    Validate {
        /// Paths to plan YAML files
        #[arg(value_name = "PLAN", required = true)]
        plans: Vec<PathBuf>,
    },
}

/// Event handler that logs task and operation events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &convoy::Event) {
        match event {
            convoy::Event::TaskBegin { task, branch, .. } => {
                info!("  [{}] begin: {}", branch, first_line(task));
            }
            convoy::Event::TaskFinish {
                task,
                branch,
                error: None,
                duration,
                ..
            } => {
                info!("  [{}] done in {:?}: {}", branch, duration, first_line(task));
            }
            convoy::Event::TaskFinish {
                task,
                branch,
                error: Some(err),
                ..
            } => {
                warn!("  [{}] failed: {}: {}", branch, first_line(task), err);
            }
            convoy::Event::OperationStarted { kind, cluster, .. } => {
                info!("Operation {} on {} started", kind, cluster);
            }
            convoy::Event::OperationFinished {
                kind,
                cluster,
                success,
                duration,
                ..
            } => {
                if *success {
                    info!("Operation {} on {} finished in {:?}", kind, cluster, duration);
                } else {
                    error!("Operation {} on {} failed after {:?}", kind, cluster, duration);
                }
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rehearse {
            plan,
            poll_ms,
            rollback,
            trace_out,
        } => {
            rehearse(plan, Duration::from_millis(poll_ms), rollback, trace_out).await?;
        }
        Commands::Validate { plans } => {
            validate_plans(plans)?;
        }
    }

    Ok(())
}

/// Run a plan, printing progress until it finishes.
async fn rehearse(
    plan_path: PathBuf,
    poll: Duration,
    force_rollback: bool,
    trace_out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = YamlLoader::load_plan(&plan_path)?;
    info!(
        "Rehearsing plan '{}': {} step(s), {} leaf task(s)",
        plan.name,
        plan.steps.len(),
        plan.leaf_count()
    );

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let journal = Arc::new(Journal::new());
    let cancel = CancellationToken::new();
    let env = ExecEnv::new(Arc::clone(&event_bus))
        .with_journal(Arc::clone(&journal))
        .with_cancellation(cancel.clone());

    let pipeline = Arc::new(plan.build());
    let mut run = tokio::spawn(run_pipeline(Arc::clone(&pipeline), env));
    let mut ticker = tokio::time::interval(poll);

    let (mut env, result) = loop {
        tokio::select! {
            joined = &mut run => break joined?,
            _ = ticker.tick() => render_progress(&pipeline),
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!("Interrupted, no further steps will be started");
                cancel.cancel();
            }
        }
    };
    render_progress(&pipeline);

    println!();
    println!("Steps:");
    for line in pipeline.step_log() {
        println!("  {}", line);
    }

    if let Err(e) = &result {
        error!("Plan '{}' failed: {}", plan.name, e);
        if plan.rollback_on_failure || force_rollback {
            info!("Rolling back plan '{}'...", plan.name);
            match pipeline.rollback(&mut env).await {
                Ok(()) => info!("Rollback finished"),
                Err(e) if e.is_rollback_unsupported() => {
                    warn!("Rollback stopped at a step that cannot be undone")
                }
                Err(e) => error!("Rollback failed: {}", e),
            }
        }
    } else {
        info!("Plan '{}' finished successfully", plan.name);
    }

    if let Some(path) = trace_out {
        std::fs::write(&path, journal.to_json()?)?;
        info!("Checkpoint journal written to {}", path.display());
    }

    result.map_err(Into::into)
}

async fn run_pipeline(
    pipeline: Arc<Serial>,
    mut env: ExecEnv,
) -> (ExecEnv, Result<(), convoy::TaskError>) {
    let result = pipeline.execute(&mut env).await;
    (env, result)
}

fn render_progress(pipeline: &Serial) {
    let snapshot = pipeline.compute_progress();
    println!("Progress: {}% (pipeline {}%)", snapshot.percent, pipeline.progress());
    for line in &snapshot.lines {
        println!("  {}", line);
    }
    for line in pipeline.current_steps() {
        println!("  {}", line);
    }
}

/// Validate plans without running them.
fn validate_plans(plans: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut failed = 0;

    for path in &plans {
        match YamlLoader::load_plan(path) {
            Ok(plan) => info!(
                "  - {} ({}): OK, {} step(s)",
                path.display(),
                plan.name,
                plan.steps.len()
            ),
            Err(e) => {
                error!("  - {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} plan(s) failed validation", failed, plans.len()).into());
    }
    info!("All {} plan(s) are valid", plans.len());
    Ok(())
}
