use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use farmsubsidy::{
    aggregations,
    config::AppConfig,
    driver::{self, AccessMode, ConnectionRegistry, Driver},
    import::{self, ImportOptions},
    lookup::Predicates,
    output, telemetry,
};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, warn};

/// Farm subsidy payments API and database tooling
#[derive(Parser)]
#[command(name = "farmsubsidy", version, propagate_version = true)]
struct Cli {
    /// Backend driver (clickhouse, duckdb)
    #[arg(long, global = true)]
    driver: Option<String>,

    /// Database uri: ClickHouse host or url, DuckDB file path or :memory:
    #[arg(long, global = true)]
    uri: Option<String>,

    /// Payments table name
    #[arg(long, global = true)]
    table: Option<String>,

    #[arg(long, global = true, env = "FARMSUBSIDY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Database administration
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Subcommand)]
enum DbCommand {
    /// Create the payments table
    Init {
        /// Drop existing tables first
        #[arg(long)]
        recreate: bool,
    },
    /// Load cleaned payment CSV files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Skip malformed rows and failed batches
        #[arg(long)]
        ignore_errors: bool,
    },
    /// Run raw SQL and print the result as CSV
    Query { sql: String },
    /// Print per-country and per-year totals as JSON
    Aggregations,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level);

    let mut config = AppConfig::from_env()?;
    config.override_backend(cli.driver.as_deref(), cli.uri, cli.table)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => farmsubsidy::run(config).await,
        Command::Db(command) => run_db(&config, command).await,
    }
}

async fn run_db(config: &AppConfig, command: DbCommand) -> Result<()> {
    let mode = match command {
        DbCommand::Init { .. } | DbCommand::Import { .. } => AccessMode::ReadWrite,
        DbCommand::Query { .. } | DbCommand::Aggregations => AccessMode::ReadOnly,
    };
    let registry = ConnectionRegistry::new();
    let descriptor = config.driver_descriptor(mode);
    let driver: Arc<dyn Driver> = driver::connect(&registry, &descriptor)
        .with_context(|| format!("failed to connect to {}", descriptor.target))?;

    match command {
        DbCommand::Init { recreate } => {
            if let Err(err) = driver.init(recreate).await {
                error!(error = %err, "failed to initialize database");
                if !recreate {
                    warn!("tables may already exist, try `db init --recreate`");
                }
                return Err(err.into());
            }
            info!(table = %descriptor.table, recreate, "database initialized");
        }
        DbCommand::Import {
            files,
            ignore_errors,
        } => {
            let options = ImportOptions {
                ignore_errors,
                ..ImportOptions::default()
            };
            let report = import::import_files(driver.as_ref(), &files, options).await?;
            info!(
                rows = report.inserted,
                errors = report.errors.len(),
                "import finished"
            );
        }
        DbCommand::Query { sql } => {
            let rows = driver.execute(&sql).await?;
            let records: Vec<Value> = rows.records().into_iter().map(Value::Object).collect();
            print!("{}", output::to_csv(&records)?);
        }
        DbCommand::Aggregations => {
            let result = aggregations::collect(driver.as_ref(), &Predicates::default()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
