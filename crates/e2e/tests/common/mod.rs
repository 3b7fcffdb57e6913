//! In-process stand-in for the banking application
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use odc_common::{
    AccountTransferInput, CatalogConfig, Expectation, FieldKind, HarnessConfig, Scenario,
    TriggerCategory, TriggerDef, Workflow, WorkflowInput, WorkflowStep,
};
use odc_e2e::{TargetApplication, TargetError, TargetResponse};

pub const ACCOUNTS: [&str; 2] = ["13344", "13455"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Validates every field and echoes accepted submissions
    Strict,
    /// Like `Strict` but lets negative amounts through
    AcceptsNegativeAmounts,
    /// Validates like `Strict` but answers with a plain confirmation; stored
    /// values are only visible through read-back
    ConfirmsOnly,
    /// Refuses every connection
    Unreachable,
    /// Never answers
    Hang,
}

pub struct StubBank {
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submitted: Mutex<Vec<WorkflowInput>>,
    stored: Mutex<Vec<WorkflowInput>>,
    read_backs: AtomicUsize,
}

impl StubBank {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
            read_backs: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn read_backs(&self) -> usize {
        self.read_backs.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn validate(&self, input: &WorkflowInput) -> Result<(), String> {
        let workflow = input.workflow();
        for (field, value) in input.fields() {
            let kind = workflow.field_kind(field).unwrap_or(FieldKind::Text);
            let ok = match kind {
                FieldKind::Amount => valid_amount(value, self.behaviour),
                FieldKind::Account => ACCOUNTS.contains(&value),
                FieldKind::Text => {
                    !value.trim().is_empty()
                        && value.chars().count() <= 100
                        && !value.contains(['<', '>', '\''])
                }
                FieldKind::Zip => value.len() == 5 && value.chars().all(|c| c.is_ascii_digit()),
                FieldKind::Phone => {
                    value.chars().any(|c| c.is_ascii_digit())
                        && !value.chars().any(|c| c.is_alphabetic())
                }
                FieldKind::Credential => match field {
                    "username" => value == "john",
                    _ => value == "demo",
                },
            };
            if !ok {
                return Err(format!("invalid {}", field));
            }
        }
        Ok(())
    }
}

fn valid_amount(value: &str, behaviour: Behaviour) -> bool {
    let Ok(amount) = value.parse::<f64>() else {
        return false;
    };
    let decimals = value.split_once('.').map(|(_, d)| d.len()).unwrap_or(0);
    let positive = amount > 0.0 || (behaviour == Behaviour::AcceptsNegativeAmounts && amount < 0.0);
    positive && decimals <= 2 && amount.abs() < 1e9
}

#[async_trait]
impl TargetApplication for StubBank {
    fn name(&self) -> &str {
        "stub-bank"
    }

    async fn submit(&self, input: &WorkflowInput) -> Result<TargetResponse, TargetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let response = match self.behaviour {
            Behaviour::Unreachable => Err(TargetError::Connection("connection refused".into())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TargetError::Protocol("no answer".into()))
            }
            Behaviour::Strict | Behaviour::AcceptsNegativeAmounts | Behaviour::ConfirmsOnly => {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.submitted.lock().unwrap().push(input.clone());
                Ok(match self.validate(input) {
                    Ok(()) if self.behaviour == Behaviour::ConfirmsOnly => {
                        self.stored.lock().unwrap().push(input.clone());
                        let mut response = TargetResponse::accepted();
                        response.detail = Some(format!("Successfully processed {}", input.workflow()));
                        response
                    }
                    Ok(()) => input
                        .echo_fields()
                        .into_iter()
                        .fold(TargetResponse::accepted(), |r, (k, v)| r.with_echo(k, v)),
                    Err(reason) => TargetResponse::rejected(reason),
                })
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn read_back(&self, input: &WorkflowInput) -> Result<BTreeMap<String, String>, TargetError> {
        self.read_backs.fetch_add(1, Ordering::SeqCst);
        let stored = self.stored.lock().unwrap();
        Ok(stored
            .iter()
            .rev()
            .find(|s| s.workflow() == input.workflow())
            .map(|s| {
                s.echo_fields()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn trigger(id: &str, category: &str, workflow: &str, field: Option<&str>, weight: u32) -> TriggerDef {
    TriggerDef {
        id: Some(id.to_string()),
        category: Some(category.to_string()),
        workflow: Some(workflow.to_string()),
        field: field.map(String::from),
        severity_weight: Some(weight),
        ..Default::default()
    }
}

/// Config with an inline catalog and near-zero backoff
pub fn config(triggers: Vec<TriggerDef>) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.catalog = CatalogConfig::inline(triggers);
    config.generation.fixtures.accounts = ACCOUNTS.iter().map(|a| a.to_string()).collect();
    config.execution.backoff_base_ms = 1;
    config.execution.backoff_max_ms = 2;
    config
}

/// `n` valid transfer scenarios
pub fn transfer_scenarios(n: usize) -> Vec<Scenario> {
    (1..=n)
        .map(|i| Scenario {
            id: format!("transfer-{:02}", i),
            trigger_id: "transfer".to_string(),
            category: TriggerCategory::Other,
            step: WorkflowStep {
                workflow: Workflow::AccountTransfer,
                field: None,
            },
            label: "baseline submission".to_string(),
            input: WorkflowInput::AccountTransfer(AccountTransferInput {
                from_account: ACCOUNTS[0].to_string(),
                to_account: ACCOUNTS[1].to_string(),
                amount: format!("{}.00", i * 10),
            }),
            expected: Expectation::Accept,
            timing: None,
        })
        .collect()
}
