//! CLI Commands

pub mod catalog;
pub mod plan;
pub mod run;

use clap::Args;
use std::process::ExitCode;

use odc_common::TriggerCategory;
use odc_e2e::TriggerFilter;

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Everything passed
    Success,
    /// Scenario failures or generation failures
    Failures,
    /// Configuration error or unreachable target
    Fatal,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::Failures => ExitCode::from(1),
            Status::Fatal => ExitCode::from(2),
        }
    }
}

/// Trigger selection shared by `plan` and `run`
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only triggers of this category (input-validation, timing, data-mapping, other)
    #[arg(long)]
    pub category: Option<TriggerCategory>,

    /// Only triggers carrying this tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Only these trigger ids (repeatable)
    #[arg(long = "trigger")]
    pub triggers: Vec<String>,
}

impl From<FilterArgs> for TriggerFilter {
    fn from(args: FilterArgs) -> Self {
        TriggerFilter {
            category: args.category,
            tags: args.tags,
            ids: args.triggers,
        }
    }
}
