//! confgraph command-line tool
//!
//! Loads layered configuration the same way an embedding application
//! would, against a container that constructs nothing, so problems in the
//! sources show up without running the application.

use anyhow::{Context, Result};
use clap::Parser;
use confgraph::cli::{Cli, Command, OutputFormat};
use confgraph::config::FactorySettings;
use confgraph::config::watcher::WatcherConfig;
use confgraph::reloader::watch_and_reload;
use confgraph::{ConfigurationFactory, DryRunContainer};
use std::fs::OpenOptions;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let settings = cli.settings();
    info!(
        base = %settings.base_name,
        profiles = ?settings.profiles,
        dirs = ?settings.search_dirs,
        "Resolved factory settings"
    );

    match cli.command.unwrap_or(Command::Check) {
        Command::Check => run_check(settings, cli.format),
        Command::Tree => run_tree(settings, cli.format),
        Command::Watch { debounce_ms } => {
            run_watch(settings, Duration::from_millis(debounce_ms)).await
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    // RUST_LOG, when set, takes over from --verbose.
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)
                .with_context(|| format!("cannot open log file {}", filename))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter())
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn dry_run_factory(settings: FactorySettings) -> ConfigurationFactory<DryRunContainer> {
    ConfigurationFactory::builder(DryRunContainer::new())
        .settings(settings)
        .build()
}

fn run_check(settings: FactorySettings, format: OutputFormat) -> Result<()> {
    let mut factory = dry_run_factory(settings);
    if let Err(e) = factory.load_configuration() {
        eprintln!("error [{:?}]: {}", e.code(), e);
        std::process::exit(1);
    }
    print!("{}", format.render(factory.specs())?);
    Ok(())
}

fn run_tree(settings: FactorySettings, format: OutputFormat) -> Result<()> {
    let factory = dry_run_factory(settings);
    let tree = factory
        .merged_tree()
        .context("failed to merge configuration sources")?;
    print!("{}", format.render(&tree)?);
    Ok(())
}

async fn run_watch(settings: FactorySettings, debounce: Duration) -> Result<()> {
    let mut factory = dry_run_factory(settings.clone());
    if let Err(e) = factory.load_configuration() {
        warn!(code = ?e.code(), "Initial load failed: {}", e);
    }
    let shared = factory.into_shared();

    let config = WatcherConfig {
        debounce_duration: debounce,
    };
    let reloader = watch_and_reload(shared, &settings, config)
        .context("failed to start source watcher")?;

    info!("Watching for changes; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    reloader.abort();
    Ok(())
}
