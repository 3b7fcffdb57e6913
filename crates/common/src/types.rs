//! Core types for the ODC harness

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// ODC trigger category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerCategory {
    InputValidation,
    Timing,
    DataMapping,
    Other,
}

impl TriggerCategory {
    pub const ALL: [TriggerCategory; 4] = [
        TriggerCategory::InputValidation,
        TriggerCategory::Timing,
        TriggerCategory::DataMapping,
        TriggerCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCategory::InputValidation => "input-validation",
            TriggerCategory::Timing => "timing",
            TriggerCategory::DataMapping => "data-mapping",
            TriggerCategory::Other => "other",
        }
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "input-validation" => Ok(TriggerCategory::InputValidation),
            "timing" => Ok(TriggerCategory::Timing),
            "data-mapping" => Ok(TriggerCategory::DataMapping),
            "other" => Ok(TriggerCategory::Other),
            _ => Err(format!("unknown trigger category '{}'", s)),
        }
    }
}

/// Lowercase a name and fold `_` and spaces into `-`.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// A defect trigger from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub category: TriggerCategory,
    #[serde(default)]
    pub description: String,
    /// Workflow name as written in the catalog; resolved by the generator
    pub workflow: String,
    #[serde(default)]
    pub field: Option<String>,
    pub severity_weight: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Banking workflow under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Workflow {
    Login,
    LoanApplication,
    AccountTransfer,
    ProfileUpdate,
}

/// Shape of a form field, used to pick invalid inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Amount,
    Account,
    Text,
    Zip,
    Phone,
    Credential,
}

impl Workflow {
    pub const ALL: [Workflow; 4] = [
        Workflow::Login,
        Workflow::LoanApplication,
        Workflow::AccountTransfer,
        Workflow::ProfileUpdate,
    ];

    /// Resolve a catalog workflow name
    pub fn parse(name: &str) -> Option<Self> {
        match normalize_name(name).as_str() {
            "login" => Some(Workflow::Login),
            "loan-application" | "loan" | "request-loan" => Some(Workflow::LoanApplication),
            "account-transfer" | "transfer" | "transfer-funds" => Some(Workflow::AccountTransfer),
            "profile-update" | "update-profile" | "update-contact-info" => {
                Some(Workflow::ProfileUpdate)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::Login => "login",
            Workflow::LoanApplication => "loan-application",
            Workflow::AccountTransfer => "account-transfer",
            Workflow::ProfileUpdate => "profile-update",
        }
    }

    /// Form fields of this workflow, in form order
    pub fn fields(&self) -> &'static [(&'static str, FieldKind)] {
        match self {
            Workflow::Login => &[
                ("username", FieldKind::Credential),
                ("password", FieldKind::Credential),
            ],
            Workflow::LoanApplication => &[
                ("amount", FieldKind::Amount),
                ("down_payment", FieldKind::Amount),
                ("from_account", FieldKind::Account),
            ],
            Workflow::AccountTransfer => &[
                ("amount", FieldKind::Amount),
                ("from_account", FieldKind::Account),
                ("to_account", FieldKind::Account),
            ],
            Workflow::ProfileUpdate => &[
                ("first_name", FieldKind::Text),
                ("last_name", FieldKind::Text),
                ("address", FieldKind::Text),
                ("city", FieldKind::Text),
                ("state", FieldKind::Text),
                ("zip_code", FieldKind::Zip),
                ("phone", FieldKind::Phone),
            ],
        }
    }

    pub fn default_field(&self) -> &'static str {
        self.fields()[0].0
    }

    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields()
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApplicationInput {
    pub customer_id: String,
    pub amount: String,
    pub down_payment: String,
    pub from_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTransferInput {
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdateInput {
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub phone: String,
}

/// Input payload of a scenario, one variant per workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum WorkflowInput {
    Login(LoginInput),
    LoanApplication(LoanApplicationInput),
    AccountTransfer(AccountTransferInput),
    ProfileUpdate(ProfileUpdateInput),
}

impl WorkflowInput {
    pub fn workflow(&self) -> Workflow {
        match self {
            WorkflowInput::Login(_) => Workflow::Login,
            WorkflowInput::LoanApplication(_) => Workflow::LoanApplication,
            WorkflowInput::AccountTransfer(_) => Workflow::AccountTransfer,
            WorkflowInput::ProfileUpdate(_) => Workflow::ProfileUpdate,
        }
    }

    /// Submitted form values keyed by field name
    pub fn fields(&self) -> BTreeMap<&'static str, &str> {
        let mut map = BTreeMap::new();
        match self {
            WorkflowInput::Login(input) => {
                map.insert("username", input.username.as_str());
                map.insert("password", input.password.as_str());
            }
            WorkflowInput::LoanApplication(input) => {
                map.insert("amount", input.amount.as_str());
                map.insert("down_payment", input.down_payment.as_str());
                map.insert("from_account", input.from_account.as_str());
            }
            WorkflowInput::AccountTransfer(input) => {
                map.insert("amount", input.amount.as_str());
                map.insert("from_account", input.from_account.as_str());
                map.insert("to_account", input.to_account.as_str());
            }
            WorkflowInput::ProfileUpdate(input) => {
                map.insert("first_name", input.first_name.as_str());
                map.insert("last_name", input.last_name.as_str());
                map.insert("address", input.address.as_str());
                map.insert("city", input.city.as_str());
                map.insert("state", input.state.as_str());
                map.insert("zip_code", input.zip_code.as_str());
                map.insert("phone", input.phone.as_str());
            }
        }
        map
    }

    /// Fields the target is expected to echo back; secrets are never echoed.
    pub fn echo_fields(&self) -> BTreeMap<&'static str, &str> {
        let mut fields = self.fields();
        fields.remove("password");
        fields
    }

    /// Overwrite one form field. Returns false if the workflow has no such field.
    pub fn set_field(&mut self, field: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        let slot = match (self, field) {
            (WorkflowInput::Login(i), "username") => &mut i.username,
            (WorkflowInput::Login(i), "password") => &mut i.password,
            (WorkflowInput::LoanApplication(i), "amount") => &mut i.amount,
            (WorkflowInput::LoanApplication(i), "down_payment") => &mut i.down_payment,
            (WorkflowInput::LoanApplication(i), "from_account") => &mut i.from_account,
            (WorkflowInput::AccountTransfer(i), "amount") => &mut i.amount,
            (WorkflowInput::AccountTransfer(i), "from_account") => &mut i.from_account,
            (WorkflowInput::AccountTransfer(i), "to_account") => &mut i.to_account,
            (WorkflowInput::ProfileUpdate(i), "first_name") => &mut i.first_name,
            (WorkflowInput::ProfileUpdate(i), "last_name") => &mut i.last_name,
            (WorkflowInput::ProfileUpdate(i), "address") => &mut i.address,
            (WorkflowInput::ProfileUpdate(i), "city") => &mut i.city,
            (WorkflowInput::ProfileUpdate(i), "state") => &mut i.state,
            (WorkflowInput::ProfileUpdate(i), "zip_code") => &mut i.zip_code,
            (WorkflowInput::ProfileUpdate(i), "phone") => &mut i.phone,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// What the target should do with a scenario's input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Target accepts the submission
    Accept,
    /// Target rejects the submission
    Reject,
    /// Target accepts and echoes every submitted field unchanged
    RoundTrip,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Accept => write!(f, "accept"),
            Expectation::Reject => write!(f, "reject"),
            Expectation::RoundTrip => write!(f, "round_trip"),
        }
    }
}

/// Latency constraint for timing scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConstraint {
    pub budget_ms: u64,
    pub repetitions: u32,
}

/// Workflow step a scenario targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub workflow: Workflow,
    #[serde(default)]
    pub field: Option<String>,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.workflow, field),
            None => write!(f, "{}", self.workflow),
        }
    }
}

/// A concrete test case derived from one trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub trigger_id: String,
    pub category: TriggerCategory,
    pub step: WorkflowStep,
    /// Short human label, e.g. "negative amount"
    pub label: String,
    pub input: WorkflowInput,
    pub expected: Expectation,
    #[serde(default)]
    pub timing: Option<TimingConstraint>,
}

/// Outcome of executing one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
    Fatal,
    Cancelled,
    Skipped,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Fail => write!(f, "fail"),
            Outcome::Error => write!(f, "error"),
            Outcome::Fatal => write!(f, "fatal"),
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Terminal record of one scenario execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub scenario_id: String,
    pub trigger_id: String,
    pub category: TriggerCategory,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl ExecutionResult {
    pub fn new(scenario: &Scenario, outcome: Outcome) -> Self {
        Self {
            scenario_id: scenario.id.clone(),
            trigger_id: scenario.trigger_id.clone(),
            category: scenario.category,
            outcome,
            duration_ms: 0,
            attempts: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Result for a scenario that was never dispatched
    pub fn skipped(scenario: &Scenario, reason: impl Into<String>) -> Self {
        Self::new(scenario, Outcome::Skipped).with_diagnostic(reason)
    }

    pub fn with_diagnostic(mut self, message: impl Into<String>) -> Self {
        self.diagnostics.push(message.into());
        self
    }
}

/// A trigger the generator could not expand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub trigger_id: String,
    pub category: TriggerCategory,
    pub reason: String,
}
