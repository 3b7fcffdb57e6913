//! ODC Harness Execution
//!
//! Drives generated scenarios against the banking application and turns the
//! results into report artifacts:
//! - Talks to the application through a [`TargetApplication`] driver
//!   (REST via reqwest, or a browser via Playwright)
//! - Runs scenarios on a bounded worker pool with retry and cancellation
//! - Aggregates results into a per-category [`Report`] written as JSON and
//!   JUnit XML
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TestRunner                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TriggerCatalog::load() -> ScenarioGenerator::generate_all()│
//! │    └── prioritize() -> ScenarioPlan                         │
//! │  ExecutionEngine::run(scenarios)                            │
//! │    ├── Semaphore(parallelism) + JoinSet                     │
//! │    ├── retry Connection errors with backoff, then Fatal     │
//! │    └── CancellationToken: in flight -> Cancelled,           │
//! │                           undispatched -> Skipped           │
//! │  aggregate(run_id, results, failures) -> Report             │
//! │    └── report.json, junit.xml                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod plan;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod target;

pub use engine::{ExecutionEngine, RetryPolicy};
pub use error::{E2eError, E2eResult, TargetError};
pub use plan::ScenarioPlan;
pub use report::{aggregate, CategorySummary, Report};
pub use runner::{TestRunner, TriggerFilter};
pub use target::{build_target, HttpTarget, ResponseStatus, TargetApplication, TargetResponse};
