//! Run Commands - execute scenarios and write report artifacts

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use odc_common::{HarnessConfig, Outcome, TriggerCategory};
use odc_e2e::{CategorySummary, Report, ScenarioPlan, TestRunner};

use super::{FilterArgs, Status};
use crate::output::{print_info, print_list, print_value, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Execute a previously written plan (file, or directory of plans) instead of generating one
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Run identifier (defaults to GITHUB_RUN_ID, then a random UUID)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Report output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker pool size
    #[arg(short, long)]
    pub parallelism: Option<usize>,
}

/// Per-category summary row
#[derive(Serialize)]
pub struct SummaryRow {
    pub category: TriggerCategory,
    #[serde(flatten)]
    pub counts: CategorySummary,
}

impl TableDisplay for SummaryRow {
    fn headers() -> Vec<&'static str> {
        vec![
            "Category", "Total", "Pass", "Fail", "Error", "Fatal", "Cancelled", "Skipped",
            "Gen. failures",
        ]
    }

    fn row(&self) -> Vec<String> {
        let c = &self.counts;
        vec![
            self.category.to_string(),
            c.total.to_string(),
            c.passed.to_string(),
            c.failed.to_string(),
            c.errored.to_string(),
            c.fatal.to_string(),
            c.cancelled.to_string(),
            c.skipped.to_string(),
            c.generation_failures.to_string(),
        ]
    }
}

/// Explicit id, then the CI run id, then a fresh UUID
pub fn resolve_run_id(explicit: Option<String>) -> String {
    explicit
        .filter(|id| !id.trim().is_empty())
        .or_else(|| std::env::var("GITHUB_RUN_ID").ok().filter(|id| !id.is_empty()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses
fn watch_for_cancellation(token: &CancellationToken, timeout: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    if let Some(timeout) = timeout {
        let on_timeout = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    warn!("Run exceeded {} s timeout, cancelling", timeout.as_secs());
                    on_timeout.cancel();
                }
                _ = on_timeout.cancelled() => {}
            }
        });
    }
}

pub async fn execute(args: RunArgs, mut config: HarnessConfig, format: OutputFormat) -> Result<Status> {
    if let Some(output) = args.output {
        config.report.output_dir = output;
    }
    if let Some(parallelism) = args.parallelism {
        config.execution.parallelism = parallelism;
        config.validate()?;
    }

    let run_id = resolve_run_id(args.run_id);
    info!("Run {}", run_id);

    let token = CancellationToken::new();
    watch_for_cancellation(&token, args.timeout.map(Duration::from_secs));

    let runner = TestRunner::new(config)
        .with_filter(args.filter.clone().into())
        .with_cancellation(token.clone());

    let plan = match &args.plan {
        Some(path) => {
            let mut plan = ScenarioPlan::load(path)?;
            if let Some(category) = args.filter.category {
                plan.retain_category(category);
            }
            if !args.filter.triggers.is_empty() {
                plan.retain_triggers(&args.filter.triggers);
            }
            if !args.filter.tags.is_empty() {
                print_warning("--tag is ignored with --plan; plans do not carry trigger tags");
            }
            plan
        }
        None => runner.plan()?,
    };

    let report = runner.run_plan(&run_id, &plan).await?;
    token.cancel();

    let written = runner.write_report(&report)?;
    print_report(&report, format)?;
    for path in &written {
        print_info(&format!("Report written to {}", path.display()));
    }

    Ok(status_of(&report))
}

fn status_of(report: &Report) -> Status {
    if report.aborted() {
        Status::Fatal
    } else if report.passed() {
        Status::Success
    } else {
        Status::Failures
    }
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_value(report, format);
    }

    let rows: Vec<SummaryRow> = report
        .summary
        .iter()
        .map(|(category, counts)| SummaryRow {
            category: *category,
            counts: *counts,
        })
        .collect();
    print_list(&rows, format)?;

    for result in report.failures() {
        let glyph = match result.outcome {
            Outcome::Fail => "✗".red(),
            Outcome::Error | Outcome::Fatal => "!".red().bold(),
            _ => "-".yellow(),
        };
        println!(
            "{} {} [{}] {}",
            glyph,
            result.scenario_id,
            result.outcome,
            result.diagnostics.join("; ")
        );
    }
    for failure in &report.generation_failures {
        println!("{} {} [generation] {}", "!".red().bold(), failure.trigger_id, failure.reason);
    }

    let verdict = if report.passed() {
        "PASSED".green().bold()
    } else if report.aborted() {
        "ABORTED".red().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "\n{} {}: {} passed, {} not passed, {} generation failure(s)",
        verdict,
        report.run_id,
        report.count(Outcome::Pass),
        report.total() - report.count(Outcome::Pass),
        report.generation_failures.len()
    );

    Ok(())
}
