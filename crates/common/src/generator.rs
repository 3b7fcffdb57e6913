//! Scenario generation
//!
//! Expands each trigger into concrete scenarios. Output depends only on the
//! trigger and [`GenerationConfig`]: each trigger gets its own RNG seeded
//! from `SHA-256(seed || trigger id)`, so adding or reordering triggers never
//! changes another trigger's scenarios.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use tracing::{debug, warn};

use crate::catalog::TriggerCatalog;
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::types::{
    normalize_name, AccountTransferInput, Expectation, FieldKind, GenerationFailure,
    LoanApplicationInput, LoginInput, ProfileUpdateInput, Scenario, TimingConstraint, Trigger,
    TriggerCategory, Workflow, WorkflowInput, WorkflowStep,
};

/// Scenarios and per-trigger failures from one generation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub scenarios: Vec<Scenario>,
    pub failures: Vec<GenerationFailure>,
}

impl GenerationOutcome {
    /// Hex SHA-256 over the generated scenarios, for comparing plans across runs
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for scenario in &self.scenarios {
            // Serializing plain data cannot fail
            if let Ok(bytes) = serde_json::to_vec(scenario) {
                hasher.update(&bytes);
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// A scenario before it gets an id
struct Candidate {
    label: String,
    input: WorkflowInput,
    expected: Expectation,
    timing: Option<TimingConstraint>,
}

impl Candidate {
    fn new(label: impl Into<String>, input: WorkflowInput, expected: Expectation) -> Self {
        Self {
            label: label.into(),
            input,
            expected,
            timing: None,
        }
    }
}

/// Expands triggers into scenarios
#[derive(Debug, Clone)]
pub struct ScenarioGenerator {
    config: GenerationConfig,
}

impl ScenarioGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Expand one trigger. Always yields at least one scenario on success.
    pub fn generate(&self, trigger: &Trigger) -> Result<Vec<Scenario>, GenerationError> {
        let workflow =
            Workflow::parse(&trigger.workflow).ok_or_else(|| GenerationError::UnknownWorkflow {
                trigger: trigger.id.clone(),
                workflow: trigger.workflow.clone(),
            })?;

        let field = match &trigger.field {
            Some(raw) => {
                let name = normalize_name(raw).replace('-', "_");
                if workflow.field_kind(&name).is_none() {
                    return Err(GenerationError::UnknownField {
                        trigger: trigger.id.clone(),
                        workflow: workflow.to_string(),
                        field: raw.clone(),
                    });
                }
                Some(name)
            }
            None => None,
        };

        let mut rng = self.rng_for(trigger);
        let base = self.valid_input(workflow, &mut rng);

        let candidates = match trigger.category {
            TriggerCategory::InputValidation => {
                let target = field.as_deref().unwrap_or(workflow.default_field());
                self.input_validation(workflow, target, &base)
            }
            TriggerCategory::Timing => self.timing(&base),
            TriggerCategory::DataMapping => self.data_mapping(workflow, &base),
            TriggerCategory::Other => vec![Candidate::new(
                "baseline submission",
                base.clone(),
                Expectation::Accept,
            )],
        };

        let limit = self
            .config
            .max_scenarios_per_trigger
            .unwrap_or(usize::MAX)
            .max(1);

        let scenarios: Vec<Scenario> = candidates
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, candidate)| Scenario {
                id: format!("{}-{:02}", trigger.id, i + 1),
                trigger_id: trigger.id.clone(),
                category: trigger.category,
                step: WorkflowStep {
                    workflow,
                    field: field.clone(),
                },
                label: candidate.label,
                input: candidate.input,
                expected: candidate.expected,
                timing: candidate.timing,
            })
            .collect();

        if scenarios.is_empty() {
            return Err(GenerationError::NoCandidates(trigger.id.clone()));
        }

        debug!(
            "Generated {} scenario(s) for trigger {}",
            scenarios.len(),
            trigger.id
        );
        Ok(scenarios)
    }

    /// Expand every trigger; failing triggers are recorded, others proceed
    pub fn generate_all(&self, catalog: &TriggerCatalog) -> GenerationOutcome {
        let mut outcome = GenerationOutcome::default();

        for trigger in catalog.triggers() {
            match self.generate(trigger) {
                Ok(scenarios) => outcome.scenarios.extend(scenarios),
                Err(e) => {
                    warn!("Skipping trigger {}: {}", trigger.id, e);
                    outcome.failures.push(GenerationFailure {
                        trigger_id: trigger.id.clone(),
                        category: trigger.category,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    fn rng_for(&self, trigger: &Trigger) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.config.seed.to_le_bytes());
        hasher.update(trigger.id.as_bytes());
        let digest = hasher.finalize();

        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(seed))
    }

    /// A payload the application should accept
    fn valid_input(&self, workflow: Workflow, rng: &mut StdRng) -> WorkflowInput {
        let fixtures = &self.config.fixtures;
        let first_account = fixtures.accounts.first().cloned().unwrap_or_default();
        let second_account = fixtures
            .accounts
            .get(1)
            .cloned()
            .unwrap_or_else(|| first_account.clone());

        match workflow {
            Workflow::Login => WorkflowInput::Login(LoginInput {
                username: fixtures.username.clone(),
                password: fixtures.password.clone(),
            }),
            Workflow::LoanApplication => {
                let amount_cents = rng.gen_range(10_000..=500_000u64);
                WorkflowInput::LoanApplication(LoanApplicationInput {
                    customer_id: fixtures.customer_id.clone(),
                    amount: format_cents(amount_cents),
                    down_payment: format_cents(amount_cents / 10),
                    from_account: first_account,
                })
            }
            Workflow::AccountTransfer => WorkflowInput::AccountTransfer(AccountTransferInput {
                from_account: first_account,
                to_account: second_account,
                amount: format_cents(rng.gen_range(100..=10_000u64)),
            }),
            Workflow::ProfileUpdate => WorkflowInput::ProfileUpdate(ProfileUpdateInput {
                customer_id: fixtures.customer_id.clone(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                address: format!("{} Test Street", rng.gen_range(1..=999u32)),
                city: "Test City".to_string(),
                state: "CA".to_string(),
                zip_code: format!("{:05}", rng.gen_range(10_000..=99_999u32)),
                phone: random_phone(rng),
            }),
        }
    }

    fn input_validation(
        &self,
        workflow: Workflow,
        field: &str,
        base: &WorkflowInput,
    ) -> Vec<Candidate> {
        let kind = workflow.field_kind(field).unwrap_or(FieldKind::Text);
        let display = field.replace('_', " ");

        let mut candidates: Vec<Candidate> = invalid_values(kind)
            .into_iter()
            .filter_map(|(what, value)| {
                let mut input = base.clone();
                input
                    .set_field(field, value)
                    .then(|| Candidate::new(format!("{} {}", what, display), input, Expectation::Reject))
            })
            .collect();

        if self.config.include_baseline {
            candidates.push(Candidate::new(
                format!("valid {}", display),
                base.clone(),
                Expectation::Accept,
            ));
        }

        candidates
    }

    fn timing(&self, base: &WorkflowInput) -> Vec<Candidate> {
        let budget_ms = self.config.timing_budget_ms;
        let mut repetitions = vec![1, 2, self.config.burst_size.max(1)];
        repetitions.sort_unstable();
        repetitions.dedup();

        repetitions
            .into_iter()
            .map(|count| {
                let label = match count {
                    1 => "single submission".to_string(),
                    2 => "double submission".to_string(),
                    n => format!("burst of {} submissions", n),
                };
                Candidate {
                    timing: Some(TimingConstraint {
                        budget_ms,
                        repetitions: count,
                    }),
                    ..Candidate::new(label, base.clone(), Expectation::Accept)
                }
            })
            .collect()
    }

    fn data_mapping(&self, workflow: Workflow, base: &WorkflowInput) -> Vec<Candidate> {
        let mut candidates = vec![Candidate::new("ascii values", base.clone(), Expectation::RoundTrip)];

        let variants: Vec<(&str, Vec<(&str, &str)>)> = match workflow {
            Workflow::Login => vec![],
            Workflow::LoanApplication | Workflow::AccountTransfer => vec![
                ("amount with cents", vec![("amount", "1234.56")]),
                ("whole amount", vec![("amount", "1000")]),
            ],
            Workflow::ProfileUpdate => vec![
                (
                    "unicode values",
                    vec![
                        ("first_name", "Zoë"),
                        ("last_name", "Ørsted"),
                        ("city", "São Paulo"),
                    ],
                ),
                (
                    "boundary-length values",
                    vec![(
                        "address",
                        "1234567890 Boundary Length Avenue Suite 1234567890",
                    )],
                ),
            ],
        };

        for (label, overrides) in variants {
            let mut input = base.clone();
            for (field, value) in overrides {
                input.set_field(field, value);
            }
            candidates.push(Candidate::new(label, input, Expectation::RoundTrip));
        }

        candidates
    }
}

/// Invalid inputs per field kind, most telling first
fn invalid_values(kind: FieldKind) -> Vec<(&'static str, String)> {
    let pairs: Vec<(&'static str, String)> = match kind {
        FieldKind::Amount => vec![
            ("negative", "-500.00".into()),
            ("zero", "0".into()),
            ("non-numeric", "abc".into()),
            ("empty", String::new()),
            ("excess precision", "10.999".into()),
            ("overflow", "99999999999999999999".into()),
        ],
        FieldKind::Account => vec![
            ("unknown", "0".into()),
            ("non-numeric", "acct-x".into()),
            ("empty", String::new()),
        ],
        FieldKind::Text => vec![
            ("empty", String::new()),
            ("overlong", "A".repeat(256)),
            ("markup", "<script>alert(1)</script>".into()),
            ("sql injection", "' OR '1'='1".into()),
        ],
        FieldKind::Zip => vec![
            ("alphabetic", "ABCDE".into()),
            ("short", "1234".into()),
            ("empty", String::new()),
        ],
        FieldKind::Phone => vec![
            ("alphabetic", "not-a-phone".into()),
            ("empty", String::new()),
        ],
        FieldKind::Credential => vec![
            ("empty", String::new()),
            ("sql injection", "' OR '1'='1".into()),
            ("overlong", "x".repeat(256)),
        ],
    };
    pairs
}

fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

fn random_phone(rng: &mut StdRng) -> String {
    format!(
        "({}) {}-{}",
        rng.gen_range(200..=999u32),
        rng.gen_range(200..=999u32),
        rng.gen_range(1000..=9999u32)
    )
}

/// Stable sort by descending trigger severity weight
pub fn prioritize(scenarios: &mut [Scenario], catalog: &TriggerCatalog) {
    scenarios.sort_by_key(|s| {
        Reverse(
            catalog
                .get(&s.trigger_id)
                .map(|t| t.severity_weight)
                .unwrap_or(0),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerDef;

    fn trigger(id: &str, category: TriggerCategory, workflow: &str, field: Option<&str>) -> Trigger {
        Trigger {
            id: id.to_string(),
            category,
            description: String::new(),
            workflow: workflow.to_string(),
            field: field.map(String::from),
            severity_weight: 1,
            tags: vec![],
        }
    }

    #[test]
    fn test_loan_amount_leads_with_negative() {
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        let t = trigger(
            "loan-amount",
            TriggerCategory::InputValidation,
            "loan-application",
            Some("amount"),
        );
        let scenarios = generator.generate(&t).unwrap();

        let first = &scenarios[0];
        assert_eq!(first.id, "loan-amount-01");
        assert_eq!(first.label, "negative amount");
        assert_eq!(first.expected, Expectation::Reject);
        assert_eq!(first.input.fields()["amount"], "-500.00");

        let last = scenarios.last().unwrap();
        assert_eq!(last.expected, Expectation::Accept);
    }

    #[test]
    fn test_every_category_yields_scenarios() {
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        for category in TriggerCategory::ALL {
            for workflow in Workflow::ALL {
                let t = trigger("t", category, workflow.as_str(), None);
                let scenarios = generator.generate(&t).unwrap();
                assert!(!scenarios.is_empty(), "{} / {}", category, workflow);
                assert!(scenarios.iter().all(|s| s.trigger_id == "t" && s.category == category));
                assert!(scenarios.iter().all(|s| s.input.workflow() == workflow));
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = GenerationConfig {
            seed: 7,
            ..Default::default()
        };
        let t = trigger("transfer", TriggerCategory::DataMapping, "account-transfer", None);
        let a = ScenarioGenerator::new(config.clone()).generate(&t).unwrap();
        let b = ScenarioGenerator::new(config).generate(&t).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seed_changes_payload() {
        let t = trigger("profile", TriggerCategory::Other, "profile-update", None);
        let a = ScenarioGenerator::new(GenerationConfig {
            seed: 1,
            ..Default::default()
        })
        .generate(&t)
        .unwrap();
        let b = ScenarioGenerator::new(GenerationConfig {
            seed: 2,
            ..Default::default()
        })
        .generate(&t)
        .unwrap();
        assert_ne!(a[0].input, b[0].input);
    }

    #[test]
    fn test_limit_keeps_at_least_one() {
        let generator = ScenarioGenerator::new(GenerationConfig {
            max_scenarios_per_trigger: Some(2),
            ..Default::default()
        });
        let t = trigger("t", TriggerCategory::InputValidation, "account-transfer", None);
        assert_eq!(generator.generate(&t).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_workflow() {
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        let err = generator
            .generate(&trigger("t", TriggerCategory::Timing, "bill-pay", None))
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnknownWorkflow { .. }));
    }

    #[test]
    fn test_unknown_field() {
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        let err = generator
            .generate(&trigger(
                "t",
                TriggerCategory::InputValidation,
                "login",
                Some("zip code"),
            ))
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnknownField { .. }));
    }

    #[test]
    fn test_timing_scenarios_carry_budget() {
        let generator = ScenarioGenerator::new(GenerationConfig {
            timing_budget_ms: 500,
            burst_size: 3,
            ..Default::default()
        });
        let scenarios = generator
            .generate(&trigger("t", TriggerCategory::Timing, "transfer", None))
            .unwrap();
        let reps: Vec<u32> = scenarios
            .iter()
            .map(|s| s.timing.unwrap().repetitions)
            .collect();
        assert_eq!(reps, vec![1, 2, 3]);
        assert!(scenarios.iter().all(|s| s.timing.unwrap().budget_ms == 500));
    }

    #[test]
    fn test_generate_all_isolates_failures() {
        let catalog = TriggerCatalog::from_defs(&[
            TriggerDef {
                id: Some("bad".into()),
                category: Some("other".into()),
                workflow: Some("bill-pay".into()),
                ..Default::default()
            },
            TriggerDef {
                id: Some("good".into()),
                category: Some("other".into()),
                workflow: Some("login".into()),
                ..Default::default()
            },
        ])
        .unwrap();

        let outcome = ScenarioGenerator::new(GenerationConfig::default()).generate_all(&catalog);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].trigger_id, "bad");
        assert_eq!(outcome.scenarios.len(), 1);
        assert_eq!(outcome.fingerprint().len(), 64);
    }

    #[test]
    fn test_prioritize_is_stable_by_weight() {
        let catalog = TriggerCatalog::from_defs(&[
            TriggerDef {
                id: Some("low".into()),
                category: Some("other".into()),
                workflow: Some("login".into()),
                severity_weight: Some(1),
                ..Default::default()
            },
            TriggerDef {
                id: Some("high".into()),
                category: Some("timing".into()),
                workflow: Some("login".into()),
                severity_weight: Some(5),
                ..Default::default()
            },
        ])
        .unwrap();
        let generator = ScenarioGenerator::new(GenerationConfig::default());
        let mut scenarios = generator.generate_all(&catalog).scenarios;
        prioritize(&mut scenarios, &catalog);

        assert_eq!(scenarios[0].trigger_id, "high");
        assert_eq!(scenarios.last().unwrap().trigger_id, "low");
        let high_ids: Vec<&str> = scenarios
            .iter()
            .filter(|s| s.trigger_id == "high")
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(high_ids, vec!["high-01", "high-02", "high-03"]);
    }
}
