mod config;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use events::EventBus;
use opwatch_core::{OperationCatalog, OperationParams};
use orchestrator::{CommandScript, OperationController, ScriptedExecutor};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::render::StepPrinter;

const DEFAULT_STEP_DELAY_MS: u64 = 400;
const DEFAULT_FAILURE: &str = "scripted failure";

#[derive(Parser)]
#[command(name = "opwatch")]
#[command(about = "Run multi-step backend operations and watch their progress", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./opwatch.toml, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known operations and their steps
    List,
    /// Run an operation against the scripted backend
    Run {
        operation: String,

        /// Extra command parameter, KEY=VALUE. VALUE is read as JSON when it parses.
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// JSON file with the updates the backend should report
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Pause between generated updates when no script is given
        #[arg(long, default_value_t = DEFAULT_STEP_DELAY_MS)]
        delay_ms: u64,

        /// Make the generated script fail at this step
        #[arg(long, conflicts_with = "script")]
        fail_at: Option<String>,

        /// Root cause reported by the failing step
        #[arg(long, default_value = DEFAULT_FAILURE, requires = "fail_at")]
        error: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).await;
    let catalog = config
        .catalog()
        .context("Invalid operations in config")?;

    match cli.command {
        Commands::List => {
            list(&catalog);
            Ok(())
        }
        Commands::Run {
            operation,
            params,
            script,
            delay_ms,
            fail_at,
            error,
        } => {
            let source = match (script, fail_at) {
                (Some(path), _) => ScriptSource::File(path),
                (None, Some(step)) => ScriptSource::FailAt { step, error },
                (None, None) => ScriptSource::AllSucceed,
            };
            run(&config, &catalog, &operation, params, source, delay_ms).await
        }
    }
}

/// Where the scripted backend's behaviour comes from.
enum ScriptSource {
    File(PathBuf),
    FailAt { step: String, error: String },
    AllSucceed,
}

fn list(catalog: &OperationCatalog) {
    for operation in catalog.iter() {
        println!("{} {}", operation.id.bold(), operation.title.dimmed());
        for step in &operation.steps {
            println!("  {:<12} {}", step.id, step.label);
        }
    }
}

async fn run(
    config: &AppConfig,
    catalog: &OperationCatalog,
    operation_id: &str,
    params: Vec<(String, Value)>,
    source: ScriptSource,
    delay_ms: u64,
) -> Result<()> {
    let operation = catalog.get(operation_id)?.clone();
    let delay = Duration::from_millis(delay_ms);

    let script = match source {
        ScriptSource::File(path) => CommandScript::load(&path)
            .await
            .with_context(|| format!("Failed to load script {}", path.display()))?,
        ScriptSource::FailAt { step, error } => {
            if operation.step(&step).is_none() {
                bail!("{} has no step named {}", operation.id, step);
            }
            CommandScript::fails_at(&operation, &step, error).with_delay(delay)
        }
        ScriptSource::AllSucceed => CommandScript::all_succeed(&operation).with_delay(delay),
    };

    let bus = EventBus::with_capacity(config.controller.channel_capacity);
    let executor = ScriptedExecutor::new(bus.clone()).with_operation_script(&operation, script);
    let controller =
        OperationController::new(bus, Arc::new(executor)).with_config(config.controller.clone());

    let params: OperationParams = params.into_iter().collect();
    println!("{}", operation.title.bold());

    let run = controller.start(operation, params)?;
    let mut progress = run.progress();
    let mut printer = StepPrinter::new();

    let watch = async {
        loop {
            let lines = printer.changes(&progress.borrow_and_update());
            for line in lines {
                println!("{}", line);
            }
            if progress.changed().await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = watch => {}
        _ = tokio::signal::ctrl_c() => {
            run.abandon();
        }
    }

    let outcome = run.wait().await;
    let state = progress.borrow().clone();

    println!();
    println!("{}", render::summary(&state));

    if let Err(e) = outcome {
        eprintln!("{} {}", "error:".red().bold(), e);
        return Err(e).context("Operation did not settle cleanly");
    }
    if !state.verdict().succeeded {
        bail!("{} did not succeed", state.operation.id);
    }
    Ok(())
}

fn parse_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "opwatch=debug,orchestrator=debug,events=debug"
    } else {
        "opwatch=info,orchestrator=warn,events=warn"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
