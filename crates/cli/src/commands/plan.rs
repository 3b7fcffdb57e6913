//! Plan Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use odc_common::{HarnessConfig, Scenario};
use odc_e2e::{ScenarioPlan, TestRunner};

use super::{FilterArgs, Status};
use crate::output::{print_list, print_success, print_value, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Write the plan as YAML instead of printing it
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct ScenarioRow {
    pub id: String,
    pub trigger: String,
    pub step: String,
    pub label: String,
    pub expected: String,
    pub timing: String,
}

impl From<&Scenario> for ScenarioRow {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            trigger: scenario.trigger_id.clone(),
            step: scenario.step.to_string(),
            label: scenario.label.clone(),
            expected: scenario.expected.to_string(),
            timing: scenario
                .timing
                .map(|t| format!("{} x <= {} ms", t.repetitions, t.budget_ms))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Trigger", "Step", "Label", "Expected", "Timing"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.trigger.clone(),
            self.step.clone(),
            self.label.clone(),
            self.expected.clone(),
            self.timing.clone(),
        ]
    }
}

pub fn execute(args: PlanArgs, config: HarnessConfig, format: OutputFormat) -> Result<Status> {
    let runner = TestRunner::new(config).with_filter(args.filter.into());
    let plan = runner.plan()?;

    match &args.out {
        Some(path) => {
            plan.write(path)?;
            print_success(&format!(
                "Wrote {} scenario(s) to {} (fingerprint {})",
                plan.len(),
                path.display(),
                plan.fingerprint.get(..12).unwrap_or(&plan.fingerprint)
            ));
        }
        None => match format {
            OutputFormat::Json | OutputFormat::Yaml => print_value(&plan, format)?,
            OutputFormat::Table | OutputFormat::Plain => {
                let rows: Vec<ScenarioRow> = plan.scenarios.iter().map(ScenarioRow::from).collect();
                print_list(&rows, format)?;
            }
        },
    }

    for failure in &plan.generation_failures {
        print_warning(&format!("{}: {}", failure.trigger_id, failure.reason));
    }

    if plan.is_empty() && plan.generation_failures.is_empty() {
        print_warning("No scenarios match the selected triggers");
    }

    Ok(plan_status(&plan))
}

fn plan_status(plan: &ScenarioPlan) -> Status {
    if plan.is_empty() || !plan.generation_failures.is_empty() {
        Status::Failures
    } else {
        Status::Success
    }
}
