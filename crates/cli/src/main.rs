//! ODC Harness CLI - Main Entry Point
//!
//! Lists the trigger catalog, generates scenario plans and runs them against
//! the banking application, writing JSON and JUnit reports for CI.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

use commands::{catalog, plan, run, Status};
use odc_common::HarnessConfig;

/// ODC defect-trigger test harness
#[derive(Parser)]
#[command(name = "odc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to ./odc.toml when present)
    #[arg(short, long, global = true, env = "ODC_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List defect triggers
    Catalog(catalog::CatalogArgs),

    /// Generate and prioritize scenarios without running them
    Plan(plan::PlanArgs),

    /// Execute scenarios and write reports
    Run(run::RunArgs),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<Status> {
    if let Commands::Version = cli.command {
        println!("odc v{}", odc_common::VERSION);
        println!("ODC defect-trigger harness for banking workflows");
        return Ok(Status::Success);
    }

    let config = HarnessConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Catalog(args) => catalog::execute(args, &config, cli.format),
        Commands::Plan(args) => plan::execute(args, config, cli.format),
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Version => Ok(Status::Success),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match dispatch(cli).await {
        Ok(status) => status.into(),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            Status::Fatal.into()
        }
    }
}
