use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use engage_cli::commands::{compute, course, import, status};
use engage_cli::{Cli, Commands, Config, CourseAction};

/// Load config, ensuring the database's parent directory exists.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Ok(config)
}

fn open_database(config: &Config) -> Result<engage_db::Database> {
    engage_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
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

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(cli.config.as_deref())?;
    // Invalid engagement parameters are fatal before any work starts.
    config
        .engagement_config()
        .context("invalid engagement configuration")?;

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Import => {
            let inserted = import::run(&config)?;
            writeln!(stdout, "Imported {inserted} events")?;
        }
        Commands::Course(CourseAction::Add { course: id, start, end }) => {
            let db = open_database(&config)?;
            let runtime = course::add(&db, id, start, end.as_deref())?;
            writeln!(stdout, "Recorded {} starting {}", runtime.course, runtime.start)?;
        }
        Commands::Course(CourseAction::List) => {
            let db = open_database(&config)?;
            course::list(&mut stdout, &db)?;
        }
        Commands::Compute(args) => compute::run(&mut stdout, args, &config)?,
        Commands::Status => status::run(&mut stdout, &config)?,
    }

    Ok(())
}
