//! ODC Harness Common Library
//!
//! Data model, error taxonomy, configuration, trigger catalog and scenario
//! generator shared by the execution engine and the CLI.

pub mod catalog;
pub mod config;
pub mod error;
pub mod generator;
pub mod types;

// Re-export commonly used types
pub use catalog::TriggerCatalog;
pub use config::{
    CatalogConfig, DriverKind, ExecutionConfig, GenerationConfig, HarnessConfig, ReportConfig,
    ReportFormat, TargetConfig, TriggerDef,
};
pub use error::{ConfigError, GenerationError};
pub use generator::{prioritize, GenerationOutcome, ScenarioGenerator};
pub use types::*;

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
