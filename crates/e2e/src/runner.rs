//! Pipeline runner: catalog, generation, execution, report

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use odc_common::{
    prioritize, HarnessConfig, ScenarioGenerator, Trigger, TriggerCatalog, TriggerCategory,
};

use crate::engine::ExecutionEngine;
use crate::error::{E2eError, E2eResult};
use crate::plan::ScenarioPlan;
use crate::report::{aggregate, Report};
use crate::target::{build_target, TargetApplication};

/// Narrows the catalog before generation
#[derive(Debug, Clone, Default)]
pub struct TriggerFilter {
    pub category: Option<TriggerCategory>,
    /// Trigger must carry at least one of these tags
    pub tags: Vec<String>,
    pub ids: Vec<String>,
}

impl TriggerFilter {
    pub fn matches(&self, trigger: &Trigger) -> bool {
        self.category.map_or(true, |c| trigger.category == c)
            && (self.tags.is_empty() || trigger.tags.iter().any(|t| self.tags.contains(t)))
            && (self.ids.is_empty() || self.ids.contains(&trigger.id))
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tags.is_empty() && self.ids.is_empty()
    }
}

impl std::fmt::Display for TriggerFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(category) = self.category {
            parts.push(format!("category {}", category));
        }
        if !self.tags.is_empty() {
            parts.push(format!("tags [{}]", self.tags.join(", ")));
        }
        if !self.ids.is_empty() {
            parts.push(format!("triggers [{}]", self.ids.join(", ")));
        }
        if parts.is_empty() {
            f.write_str("any trigger")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// End-to-end harness run
pub struct TestRunner {
    config: HarnessConfig,
    /// Built from `config.target` on first execution when not supplied
    target: Option<Arc<dyn TargetApplication>>,
    filter: TriggerFilter,
    cancel: CancellationToken,
}

impl TestRunner {
    /// Runner using the driver selected in `config`
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            target: None,
            filter: TriggerFilter::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Runner against a caller-supplied target
    pub fn with_target(config: HarnessConfig, target: Arc<dyn TargetApplication>) -> Self {
        Self {
            target: Some(target),
            ..Self::new(config)
        }
    }

    pub fn with_filter(mut self, filter: TriggerFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Load the catalog and apply the trigger filter
    pub fn load_catalog(&self) -> E2eResult<TriggerCatalog> {
        let mut catalog = TriggerCatalog::load(&self.config.catalog)?;
        if !self.filter.is_empty() {
            catalog.retain(|t| self.filter.matches(t));
            info!("{} trigger(s) match the filter", catalog.len());
        }
        Ok(catalog)
    }

    /// Generate (and optionally prioritize) the scenarios for this run
    pub fn plan(&self) -> E2eResult<ScenarioPlan> {
        let catalog = self.load_catalog()?;
        let generator = ScenarioGenerator::new(self.config.generation.clone());
        let outcome = generator.generate_all(&catalog);

        let mut scenarios = outcome.scenarios.clone();
        if self.config.execution.prioritize {
            prioritize(&mut scenarios, &catalog);
        }

        let plan = ScenarioPlan::new(self.config.generation.seed, &outcome, scenarios);
        info!(
            "Generated {} scenario(s) from {} trigger(s)",
            plan.len(),
            catalog.len()
        );
        if !plan.generation_failures.is_empty() {
            warn!(
                "{} trigger(s) produced no scenarios",
                plan.generation_failures.len()
            );
        }
        Ok(plan)
    }

    fn target(&self) -> E2eResult<Arc<dyn TargetApplication>> {
        match &self.target {
            Some(target) => Ok(Arc::clone(target)),
            None => build_target(&self.config),
        }
    }

    /// Execute a plan and aggregate the results.
    ///
    /// A plan with neither scenarios nor generation failures is an error:
    /// a filter that matches nothing must not produce a passing run.
    pub async fn run_plan(&self, run_id: &str, plan: &ScenarioPlan) -> E2eResult<Report> {
        if plan.is_empty() && plan.generation_failures.is_empty() {
            return Err(E2eError::EmptyPlan(if self.filter.is_empty() {
                "the plan has no scenarios".to_string()
            } else {
                format!("no scenarios match {}", self.filter)
            }));
        }

        let engine = ExecutionEngine::new(self.target()?, &self.config.execution)
            .with_cancellation(self.cancel.clone());
        let results = engine.run(&plan.scenarios).await;
        let report = aggregate(run_id, &results, &plan.generation_failures);

        info!("");
        for (category, summary) in &report.summary {
            if summary.total > 0 || summary.generation_failures > 0 {
                info!(
                    "{:<17} {} passed, {} not passed, {} generation failure(s)",
                    category.as_str(),
                    summary.passed,
                    summary.not_passed(),
                    summary.generation_failures
                );
            }
        }

        Ok(report)
    }

    /// Generate and execute in one step
    pub async fn run(&self, run_id: &str) -> E2eResult<Report> {
        let plan = self.plan()?;
        self.run_plan(run_id, &plan).await
    }

    /// Write configured report artifacts
    pub fn write_report(&self, report: &Report) -> E2eResult<Vec<PathBuf>> {
        report.write(&self.config.report.output_dir, &self.config.report.formats)
    }
}
