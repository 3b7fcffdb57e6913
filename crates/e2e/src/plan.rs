//! Scenario plans
//!
//! A plan is the generator's output frozen to YAML, so a run can be
//! reviewed before execution and replayed later against the same scenarios.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use odc_common::{GenerationFailure, GenerationOutcome, Scenario, TriggerCategory};

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioPlan {
    /// Seed the scenarios were generated with
    pub seed: u64,

    /// SHA-256 over the generated scenarios
    pub fingerprint: String,

    /// Scenarios in execution order
    pub scenarios: Vec<Scenario>,

    /// Triggers that produced no scenarios
    #[serde(default)]
    pub generation_failures: Vec<GenerationFailure>,
}

impl ScenarioPlan {
    /// Freeze a generation pass; `scenarios` may have been reordered since
    pub fn new(seed: u64, outcome: &GenerationOutcome, scenarios: Vec<Scenario>) -> Self {
        Self {
            seed,
            fingerprint: outcome.fingerprint(),
            scenarios,
            generation_failures: outcome.failures.clone(),
        }
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let plan: Self = serde_yaml::from_str(yaml)?;
        plan.check_unique_ids()?;
        Ok(plan)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::PlanParse(format!("{}: {}", path.display(), e)))
    }

    /// Load a plan file, or every plan under a directory merged into one
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.is_dir() {
            let plans = Self::load_all(path)?;
            if plans.is_empty() {
                return Err(E2eError::PlanParse(format!(
                    "{}: no .yaml or .yml plan files",
                    path.display()
                )));
            }
            Self::merge(plans)
        } else {
            Self::from_file(path)
        }
    }

    /// Every plan file under a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut plans = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            debug!("Loading plan: {}", entry.path().display());
            plans.push(Self::from_file(entry.path())?);
        }

        Ok(plans)
    }

    /// Concatenate plans in order. Scenario ids must stay unique.
    pub fn merge(plans: Vec<Self>) -> E2eResult<Self> {
        let seed = plans.first().map(|p| p.seed).unwrap_or_default();
        if plans.iter().any(|p| p.seed != seed) {
            warn!("Merging plans generated with different seeds; keeping seed {}", seed);
        }

        let mut outcome = GenerationOutcome::default();
        for plan in plans {
            outcome.scenarios.extend(plan.scenarios);
            outcome.failures.extend(plan.generation_failures);
        }

        let merged = Self {
            seed,
            fingerprint: outcome.fingerprint(),
            scenarios: outcome.scenarios,
            generation_failures: outcome.failures,
        };
        merged.check_unique_ids()?;
        Ok(merged)
    }

    pub fn to_yaml(&self) -> E2eResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Keep only scenarios (and failures) of one category
    pub fn retain_category(&mut self, category: TriggerCategory) {
        self.scenarios.retain(|s| s.category == category);
        self.generation_failures.retain(|f| f.category == category);
    }

    /// Keep only scenarios generated from the given triggers
    pub fn retain_triggers(&mut self, trigger_ids: &[String]) {
        self.scenarios
            .retain(|s| trigger_ids.iter().any(|id| *id == s.trigger_id));
        self.generation_failures
            .retain(|f| trigger_ids.iter().any(|id| *id == f.trigger_id));
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    fn check_unique_ids(&self) -> E2eResult<()> {
        let mut seen = std::collections::HashSet::new();
        for scenario in &self.scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(E2eError::PlanParse(format!(
                    "duplicate scenario id '{}'",
                    scenario.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odc_common::{GenerationConfig, ScenarioGenerator, TriggerCatalog, TriggerDef};

    fn plan() -> ScenarioPlan {
        let catalog = TriggerCatalog::from_defs(&[
            TriggerDef {
                id: Some("loan-amount".into()),
                category: Some("input-validation".into()),
                workflow: Some("loan-application".into()),
                field: Some("amount".into()),
                ..Default::default()
            },
            TriggerDef {
                id: Some("transfer-burst".into()),
                category: Some("timing".into()),
                workflow: Some("account-transfer".into()),
                ..Default::default()
            },
        ])
        .unwrap();
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        let outcome = generator.generate_all(&catalog);
        ScenarioPlan::new(generator.config().seed, &outcome, outcome.scenarios.clone())
    }

    #[test]
    fn test_yaml_roundtrip_keeps_scenarios() {
        let plan = plan();
        let parsed = ScenarioPlan::from_yaml(&plan.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_retain_category() {
        let mut plan = plan();
        plan.retain_category(TriggerCategory::Timing);
        assert!(!plan.is_empty());
        assert!(plan.scenarios.iter().all(|s| s.trigger_id == "transfer-burst"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut plan = plan();
        let first = plan.scenarios[0].clone();
        plan.scenarios.push(first);
        let yaml = plan.to_yaml().unwrap();
        assert!(matches!(
            ScenarioPlan::from_yaml(&yaml),
            Err(E2eError::PlanParse(_))
        ));
    }

    #[test]
    fn test_load_merges_plan_directory() {
        let mut timing = plan();
        timing.retain_category(TriggerCategory::Timing);
        let mut validation = plan();
        validation.retain_category(TriggerCategory::InputValidation);

        let dir = tempfile::tempdir().unwrap();
        validation.write(&dir.path().join("01-validation.yaml")).unwrap();
        timing.write(&dir.path().join("02-timing.yml")).unwrap();

        let merged = ScenarioPlan::load(dir.path()).unwrap();
        assert_eq!(merged.len(), validation.len() + timing.len());
        assert_eq!(merged.scenarios[0].trigger_id, "loan-amount");
        assert_eq!(merged.scenarios.last().unwrap().trigger_id, "transfer-burst");
        assert_eq!(merged.fingerprint, plan().fingerprint);

        let single = dir.path().join("02-timing.yml");
        assert_eq!(ScenarioPlan::load(&single).unwrap(), timing);
    }

    #[test]
    fn test_merge_rejects_overlapping_plans() {
        let dir = tempfile::tempdir().unwrap();
        plan().write(&dir.path().join("a.yaml")).unwrap();
        plan().write(&dir.path().join("b.yaml")).unwrap();
        assert!(matches!(
            ScenarioPlan::load(dir.path()),
            Err(E2eError::PlanParse(_))
        ));
    }

    #[test]
    fn test_load_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ScenarioPlan::load(dir.path()),
            Err(E2eError::PlanParse(_))
        ));
    }

    #[test]
    fn test_load_all_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        plan().write(&dir.path().join("a.yaml")).unwrap();
        plan().write(&dir.path().join("nested/b.yml")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let plans = ScenarioPlan::load_all(dir.path()).unwrap();
        assert_eq!(plans.len(), 2);
    }
}
