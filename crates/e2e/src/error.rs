//! Error types for scenario execution

use odc_common::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Scenario plan parse error: {0}")]
    PlanParse(String),

    #[error("Nothing to run: {0}")]
    EmptyPlan(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Failure while talking to the target application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// Transient: refused connection, timeout, gateway errors. Retried.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The target answered with something the driver cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TargetError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TargetError::Connection(_))
    }
}
