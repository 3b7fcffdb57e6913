//! Catalog Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use odc_common::{HarnessConfig, Trigger, TriggerCatalog, TriggerCategory};

use super::Status;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only triggers of this category
    #[arg(long)]
    pub category: Option<TriggerCategory>,
}

/// Trigger display wrapper for serialization
#[derive(Serialize)]
pub struct TriggerRow {
    pub id: String,
    pub category: TriggerCategory,
    pub workflow: String,
    pub field: Option<String>,
    pub severity_weight: u32,
    pub tags: Vec<String>,
    pub description: String,
}

impl From<&Trigger> for TriggerRow {
    fn from(trigger: &Trigger) -> Self {
        Self {
            id: trigger.id.clone(),
            category: trigger.category,
            workflow: trigger.workflow.clone(),
            field: trigger.field.clone(),
            severity_weight: trigger.severity_weight,
            tags: trigger.tags.clone(),
            description: trigger.description.clone(),
        }
    }
}

impl TableDisplay for TriggerRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Category", "Workflow", "Field", "Weight", "Tags", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.category.to_string(),
            self.workflow.clone(),
            self.field.clone().unwrap_or_else(|| "-".to_string()),
            self.severity_weight.to_string(),
            self.tags.join(", "),
            self.description.clone(),
        ]
    }
}

pub fn execute(args: CatalogArgs, config: &HarnessConfig, format: OutputFormat) -> Result<Status> {
    let catalog = TriggerCatalog::load(&config.catalog)?;

    let rows: Vec<TriggerRow> = catalog
        .triggers()
        .iter()
        .filter(|t| args.category.map_or(true, |c| t.category == c))
        .map(TriggerRow::from)
        .collect();

    print_list(&rows, format)?;
    Ok(Status::Success)
}
