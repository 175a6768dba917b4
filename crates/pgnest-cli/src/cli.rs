//! pgnest command line: run statements through the resilient connection layer

mod config;
mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use pgnest_connection::ConnectionService;
use pgnest_driver_postgres::PostgresConnector;

use crate::config::CliConfig;
use crate::logging::LoggingConfig;

#[derive(Parser, Debug)]
#[command(name = "pgnest", version, about = "Pooled, self-healing Postgres access")]
struct Cli {
    /// Settings file (defaults to <config dir>/pgnest/config.toml)
    #[arg(long, global = true, env = "PGNEST_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging with source locations
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Do not write the JSON log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one statement and print its rows as JSON
    Query(QueryArgs),
    /// Check that `SELECT 1` succeeds
    Test(TestArgs),
    /// Check every pool opened during this run
    Health(HealthArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    sql: String,
    /// Positional parameter as JSON, bound to $1, $2, ... in order
    #[arg(long = "param", value_name = "JSON")]
    params: Vec<String>,
    #[arg(long)]
    database: Option<String>,
}

#[derive(Args, Debug)]
struct TestArgs {
    #[arg(long)]
    database: Option<String>,
}

#[derive(Args, Debug)]
struct HealthArgs {
    /// Databases to open pools for before probing (defaults to the selected one)
    #[arg(long = "database", value_name = "DATABASE")]
    databases: Vec<String>,
    /// Include latency, status and pool occupancy
    #[arg(long, default_value_t = false)]
    detailed: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new(cli.verbose);
    if cli.no_log_file {
        logging = logging.without_file();
    }
    if let Err(e) = logging::init(logging) {
        eprintln!("warning: logging disabled: {e:#}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let service = ConnectionService::new(
        &config.service,
        config.session.to_session(),
        Arc::new(PostgresConnector::new()),
    )?;

    let outcome = match cli.command {
        Command::Query(args) => run_query(&service, args).await,
        Command::Test(args) => run_test(&service, args).await,
        Command::Health(args) => run_health(&service, args).await,
    };

    service.close_all().await;
    outcome
}

async fn run_query(service: &ConnectionService, args: QueryArgs) -> anyhow::Result<ExitCode> {
    let params = output::parse_params(&args.params)?;
    let result = service
        .execute_query(&args.sql, &params, args.database.as_deref())
        .await?;

    output::print_json(&output::query_body(&result))?;
    Ok(ExitCode::SUCCESS)
}

async fn run_test(service: &ConnectionService, args: TestArgs) -> anyhow::Result<ExitCode> {
    let ok = service.test_connection(args.database.as_deref()).await;
    output::print_json(&serde_json::json!({ "ok": ok }))?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_health(service: &ConnectionService, args: HealthArgs) -> anyhow::Result<ExitCode> {
    // Pools are per process, so open the requested ones first
    if args.databases.is_empty() {
        service.test_connection(None).await;
    }
    for database in &args.databases {
        service.test_connection(Some(database)).await;
    }

    if args.detailed {
        let report = service.health_report().await;
        let healthy = !report.is_empty() && report.values().all(|health| health.reachable);
        output::print_json(&report)?;
        Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    } else {
        let health = service.health_check().await;
        let healthy = !health.is_empty() && health.values().all(|reachable| *reachable);
        output::print_json(&health)?;
        Ok(if healthy { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}
