//! Harness configuration
//!
//! Loaded from a TOML file (default `odc.toml`), then overridden by
//! `ODC_*` environment variables so CI can inject the target URL and
//! credentials without touching the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "odc.toml";

/// Harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Application under test
    pub target: TargetConfig,

    /// Trigger catalog source
    pub catalog: CatalogConfig,

    /// Scenario generation policy
    pub generation: GenerationConfig,

    /// Execution engine settings
    pub execution: ExecutionConfig,

    /// Report artifacts
    pub report: ReportConfig,
}

/// How scenarios reach the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// REST service calls
    #[default]
    Http,
    /// Browser automation through Playwright
    Playwright,
}

impl std::str::FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "api" => Ok(DriverKind::Http),
            "playwright" | "ui" | "browser" => Ok(DriverKind::Playwright),
            other => Err(format!("unknown driver '{}'", other)),
        }
    }
}

/// Target application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub driver: DriverKind,

    /// Base URL of the REST service
    pub base_url: String,

    /// Base URL of the web UI (Playwright driver)
    pub ui_url: String,

    /// Login used by the Playwright driver before each workflow
    pub username: Option<String>,
    pub password: Option<String>,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// chromium, firefox or webkit
    pub browser: String,

    pub headless: bool,

    /// Playwright: capture the page under `report.output_dir/screenshots`
    /// when a submission is rejected or the script fails
    pub screenshot_on_failure: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Http,
            base_url: "http://localhost:8080/parabank/services/bank".to_string(),
            ui_url: "http://localhost:8080/parabank".to_string(),
            username: None,
            password: None,
            request_timeout_ms: 10_000,
            browser: "chromium".to_string(),
            headless: true,
            screenshot_on_failure: true,
        }
    }
}

/// Raw trigger definition as written in a catalog source.
///
/// Every field is optional so that the catalog loader, not serde, decides
/// what counts as malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerDef {
    pub id: Option<String>,
    pub category: Option<String>,
    pub description: String,
    pub workflow: Option<String>,
    pub field: Option<String>,
    pub severity_weight: Option<u32>,
    pub tags: Vec<String>,
}

/// Catalog file layout (YAML or TOML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub triggers: Vec<TriggerDef>,
}

/// Where the trigger catalog comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog file; relative paths resolve against the config file's directory
    pub path: Option<PathBuf>,

    /// Inline trigger definitions, appended after the file's triggers
    pub triggers: Vec<TriggerDef>,
}

impl CatalogConfig {
    /// Inline-only catalog
    pub fn inline(triggers: Vec<TriggerDef>) -> Self {
        Self {
            path: None,
            triggers,
        }
    }

    /// Collect trigger definitions from the file (if any) and the inline list
    pub fn resolve(&self) -> Result<Vec<TriggerDef>, ConfigError> {
        let mut defs = Vec::new();

        if let Some(path) = &self.path {
            let content = std::fs::read_to_string(path)
                .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
            let file = parse_catalog_file(path, &content)?;
            debug!("Read {} trigger(s) from {}", file.triggers.len(), path.display());
            defs.extend(file.triggers);
        }

        defs.extend(self.triggers.iter().cloned());
        Ok(defs)
    }
}

fn parse_catalog_file(path: &Path, content: &str) -> Result<CatalogFile, ConfigError> {
    let is_toml = path
        .extension()
        .map(|ext| ext == "toml")
        .unwrap_or(false);

    let parse_err = |reason: String| ConfigError::Parse {
        source_name: path.display().to_string(),
        reason,
    };

    if is_toml {
        toml::from_str(content).map_err(|e| parse_err(e.to_string()))
    } else {
        serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))
    }
}

/// Known-good data used to build valid payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub customer_id: String,
    pub accounts: Vec<String>,
    pub username: String,
    pub password: String,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            customer_id: "12212".to_string(),
            accounts: vec!["13344".to_string(), "13455".to_string()],
            username: "john".to_string(),
            password: "demo".to_string(),
        }
    }
}

/// Scenario generation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub seed: u64,

    /// Cap on scenarios per trigger; `None` keeps every candidate
    pub max_scenarios_per_trigger: Option<usize>,

    /// Add a valid control submission to input-validation triggers
    pub include_baseline: bool,

    /// Latency budget for timing scenarios
    pub timing_budget_ms: u64,

    /// Submissions in the burst timing scenario
    pub burst_size: u32,

    pub fixtures: Fixtures,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_scenarios_per_trigger: None,
            include_baseline: true,
            timing_budget_ms: 2_000,
            burst_size: 5,
            fixtures: Fixtures::default(),
        }
    }
}

/// Execution engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker pool size (1 = sequential)
    pub parallelism: usize,

    /// Total attempts per submission on connection errors
    pub max_attempts: u32,

    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Run high-severity triggers first
    pub prioritize: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            max_attempts: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 4_000,
            prioritize: true,
        }
    }
}

/// Report artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Junit,
}

/// Report artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-results"),
            formats: vec![ReportFormat::Json, ReportFormat::Junit],
        }
    }
}

impl HarnessConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `odc.toml` in the working
    /// directory is used if present, otherwise defaults. Environment
    /// overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without env overrides or validation
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let mut config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                source_name: path.display().to_string(),
                reason,
            },
            other => other,
        })?;

        if let (Some(catalog), Some(parent)) = (&config.catalog.path, path.parent()) {
            if catalog.is_relative() {
                config.catalog.path = Some(parent.join(catalog));
            }
        }

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            source_name: "config".to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `ODC_*` overrides from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ODC_TARGET_URL") {
            self.target.base_url = url;
        }
        if let Some(url) = lookup("ODC_TARGET_UI_URL") {
            self.target.ui_url = url;
        }
        if let Some(username) = lookup("ODC_TARGET_USERNAME") {
            self.target.username = Some(username);
        }
        if let Some(password) = lookup("ODC_TARGET_PASSWORD") {
            self.target.password = Some(password);
        }
        if let Some(driver) = lookup("ODC_DRIVER") {
            self.target.driver = driver.parse().map_err(|reason| ConfigError::InvalidValue {
                field: "ODC_DRIVER".to_string(),
                reason,
            })?;
        }
        if let Some(value) = lookup("ODC_SCREENSHOT_ON_FAILURE") {
            self.target.screenshot_on_failure = parse_env("ODC_SCREENSHOT_ON_FAILURE", &value)?;
        }
        if let Some(value) = lookup("ODC_PARALLELISM") {
            self.execution.parallelism = parse_env("ODC_PARALLELISM", &value)?;
        }
        if let Some(value) = lookup("ODC_MAX_ATTEMPTS") {
            self.execution.max_attempts = parse_env("ODC_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("ODC_SEED") {
            self.generation.seed = parse_env("ODC_SEED", &value)?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.target.base_url.trim().is_empty() {
            return Err(invalid("target.base_url", "must not be empty"));
        }
        if self.execution.parallelism == 0 {
            return Err(invalid("execution.parallelism", "must be at least 1"));
        }
        if self.execution.max_attempts == 0 {
            return Err(invalid("execution.max_attempts", "must be at least 1"));
        }
        if self.execution.backoff_max_ms < self.execution.backoff_base_ms {
            return Err(invalid(
                "execution.backoff_max_ms",
                "must not be below backoff_base_ms",
            ));
        }
        if self.generation.max_scenarios_per_trigger == Some(0) {
            return Err(invalid(
                "generation.max_scenarios_per_trigger",
                "must be at least 1",
            ));
        }
        if self.generation.fixtures.accounts.is_empty() {
            return Err(invalid("generation.fixtures.accounts", "needs at least one account"));
        }
        if self.report.formats.is_empty() {
            return Err(invalid("report.formats", "needs at least one format"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: key.to_string(),
        reason: e.to_string(),
    })
}
