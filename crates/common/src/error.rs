//! Error types for the ODC harness

use thiserror::Error;

/// Malformed catalog or configuration. Aborts the run before execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Trigger #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Duplicate trigger id: {0}")]
    DuplicateTrigger(String),

    #[error("Trigger '{id}' has unknown category '{category}'")]
    UnknownCategory { id: String, category: String },

    #[error("Catalog defines no triggers")]
    EmptyCatalog,

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A trigger that cannot be expanded into scenarios. Fatal for that trigger only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Trigger '{trigger}' targets unrecognized workflow '{workflow}'")]
    UnknownWorkflow { trigger: String, workflow: String },

    #[error("Trigger '{trigger}' targets field '{field}' which workflow '{workflow}' does not have")]
    UnknownField {
        trigger: String,
        workflow: String,
        field: String,
    },

    #[error("Trigger '{0}' produced no scenarios")]
    NoCandidates(String),
}
