mod config;
mod demos;
mod task;

use anyhow::{Context, Result};
use clap::Parser;
use rxlite::Schedulers;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{DemoConfig, LogFormat, LoggingConfig};
use crate::demos::{Screen, Selection};

#[derive(Parser, Debug)]
#[command(name = "rxlite-demo")]
#[command(about = "rxlite demo - reactive pipelines over a task list", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tasks file (JSON array); the built-in list is used otherwise
    #[arg(short, long)]
    tasks: Option<PathBuf>,

    /// Pipeline to run: filter, take-while, repeat, interval, timer, create,
    /// just, from-array, or all
    #[arg(short, long, default_value = "all")]
    demo: Selection,

    /// Screen lifetime in milliseconds, overriding the config file
    #[arg(long)]
    run_for_ms: Option<u64>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    match logging.format {
        LogFormat::Json => {
            colored::control::set_override(false);
            subscriber.json().init();
        }
        LogFormat::Text => subscriber.with_target(false).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DemoConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DemoConfig::default(),
    };
    if let Some(run_for_ms) = args.run_for_ms {
        config.demo.run_for_ms = run_for_ms;
    }

    init_tracing(&config.logging);
    info!("Starting rxlite-demo v{}", env!("CARGO_PKG_VERSION"));

    let tasks = match &args.tasks {
        Some(path) => task::load_tasks(path)?,
        None => task::builtin_tasks(),
    };
    info!("Loaded {} tasks", tasks.len());

    let schedulers = Schedulers::new(&config.scheduler).context("Failed to start schedulers")?;
    let screen = Screen::new(schedulers);

    for demo in args.demo.demos() {
        screen.show(demo, demos::pipeline(demo, &tasks, &config.demo));
    }

    tokio::select! {
        _ = tokio::time::sleep(config.demo.run_for()) => {
            info!("Screen lifetime of {}ms elapsed", config.demo.run_for_ms);
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    let running = screen.tracked();
    screen.teardown();
    info!("Disposed {} running subscriptions, shutting down", running);

    Ok(())
}
