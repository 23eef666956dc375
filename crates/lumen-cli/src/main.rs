use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use lumen_core::Engine;
use lumen_db::Database;
use tracing_subscriber::EnvFilter;

use lumen_cli::commands::{award, evaluate, freeze, log_time, progress, record, status, sweep};
use lumen_cli::{Cli, Commands, Config, Service};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

fn open_service(config_path: Option<&Path>) -> Result<Service> {
    let (db, config) = open_database(config_path)?;
    Ok(Service::new(db, Engine::new(config.engine)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Some(Commands::Record(args)) => {
            let mut service = open_service(config_path)?;
            record::run(&mut stdout, args, &mut service, Utc::now())?;
        }
        Some(Commands::LogTime(args)) => {
            let mut service = open_service(config_path)?;
            let today = service.today();
            log_time::run(&mut stdout, args, &mut service, today)?;
        }
        Some(Commands::Evaluate(args)) => {
            let mut service = open_service(config_path)?;
            let today = service.today();
            evaluate::run(&mut stdout, args, &mut service, today)?;
        }
        Some(Commands::Sweep(args)) => {
            let mut service = open_service(config_path)?;
            let today = service.today();
            sweep::run(&mut stdout, args, &mut service, today)?;
        }
        Some(Commands::Freeze(args)) => {
            let mut service = open_service(config_path)?;
            let today = service.today();
            freeze::run(&mut stdout, args, &mut service, today)?;
        }
        Some(Commands::Award(args)) => {
            let mut service = open_service(config_path)?;
            award::run(&mut stdout, args, &mut service)?;
        }
        Some(Commands::Progress(args)) => {
            let service = open_service(config_path)?;
            let today = service.today();
            progress::run(&mut stdout, args, &service, today)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(config_path)?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
