//! Scenario execution engine
//!
//! Runs scenarios against a [`TargetApplication`] with a bounded worker
//! pool. Transient connection failures are retried with exponential
//! backoff; once retries are exhausted the outcome is fatal and no further
//! scenarios are dispatched. Every scenario handed to [`ExecutionEngine::run`]
//! comes back with exactly one result, in input order.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use odc_common::{ExecutionConfig, ExecutionResult, Expectation, Outcome, Scenario};

use crate::error::TargetError;
use crate::target::{TargetApplication, TargetResponse};

/// Attempt bound and backoff schedule for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per submission, first try included
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Mutable state of one scenario while it runs
#[derive(Debug)]
struct Progress {
    outcome: Outcome,
    attempts: u32,
    diagnostics: Vec<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            outcome: Outcome::Error,
            attempts: 0,
            diagnostics: Vec::new(),
        }
    }

    fn finish(&mut self, outcome: Outcome, diagnostic: Option<String>) {
        self.outcome = outcome;
        self.diagnostics.extend(diagnostic);
    }

    /// Exhausted connection retries are fatal, anything else is an error
    fn fail_on(&mut self, error: TargetError) {
        match error {
            TargetError::Connection(reason) => {
                let message = format!(
                    "target unreachable after {} attempt(s): {}",
                    self.attempts, reason
                );
                self.finish(Outcome::Fatal, Some(message));
            }
            TargetError::Protocol(reason) => self.finish(Outcome::Error, Some(reason)),
        }
    }
}

pub struct ExecutionEngine {
    target: Arc<dyn TargetApplication>,
    parallelism: usize,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ExecutionEngine {
    pub fn new(target: Arc<dyn TargetApplication>, config: &ExecutionConfig) -> Self {
        Self {
            target,
            parallelism: config.parallelism.max(1),
            policy: RetryPolicy::from_config(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Execute one scenario
    pub async fn execute(&self, scenario: &Scenario) -> ExecutionResult {
        execute_scenario(self.target.as_ref(), scenario, &self.policy, &self.cancel).await
    }

    /// Execute scenarios in order, at most `parallelism` at a time
    pub async fn run(&self, scenarios: &[Scenario]) -> Vec<ExecutionResult> {
        info!(
            "Running {} scenario(s) against {} target with {} worker(s)...",
            scenarios.len(),
            self.target.name(),
            self.parallelism
        );

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let halt = CancellationToken::new();
        let mut slots: Vec<Option<ExecutionResult>> = vec![None; scenarios.len()];
        let mut workers = JoinSet::new();

        for (index, scenario) in scenarios.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                _ = halt.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else { break };
            if self.cancel.is_cancelled() || halt.is_cancelled() {
                break;
            }

            let target = Arc::clone(&self.target);
            let policy = self.policy;
            let cancel = self.cancel.clone();
            let halt = halt.clone();
            let scenario = scenario.clone();

            workers.spawn(async move {
                let result = execute_scenario(target.as_ref(), &scenario, &policy, &cancel).await;
                if result.outcome == Outcome::Fatal {
                    halt.cancel();
                }
                drop(permit);
                (index, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => {
                    log_result(&result);
                    slots[index] = Some(result);
                }
                Err(e) => error!("Scenario worker failed: {}", e),
            }
        }

        let cancelled = self.cancel.is_cancelled();
        let halted = halt.is_cancelled();
        let results: Vec<ExecutionResult> = scenarios
            .iter()
            .zip(slots)
            .map(|(scenario, slot)| {
                slot.unwrap_or_else(|| {
                    if cancelled {
                        ExecutionResult::skipped(scenario, "run cancelled before dispatch")
                    } else if halted {
                        ExecutionResult::skipped(scenario, "run aborted: target unreachable")
                    } else {
                        ExecutionResult::new(scenario, Outcome::Error)
                            .with_diagnostic("worker terminated without a result")
                    }
                })
            })
            .collect();

        let passed = results.iter().filter(|r| r.outcome.is_pass()).count();
        info!("");
        info!(
            "Execution finished: {} passed, {} not passed ({} ms)",
            passed,
            results.len() - passed,
            start.elapsed().as_millis()
        );

        results
    }
}

fn log_result(result: &ExecutionResult) {
    match result.outcome {
        Outcome::Pass => info!("✓ {} ({} ms)", result.scenario_id, result.duration_ms),
        Outcome::Cancelled | Outcome::Skipped => {
            warn!("- {} {}", result.scenario_id, result.outcome)
        }
        _ => error!(
            "✗ {} {} - {}",
            result.scenario_id,
            result.outcome,
            result.diagnostics.last().map(String::as_str).unwrap_or("no diagnostic")
        ),
    }
}

/// Run one scenario to a terminal outcome
pub async fn execute_scenario(
    target: &dyn TargetApplication,
    scenario: &Scenario,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ExecutionResult {
    let start = Instant::now();
    let mut progress = Progress::new();

    if cancel.is_cancelled() {
        return ExecutionResult::skipped(scenario, "run cancelled before dispatch");
    }

    debug!("Executing {} ({})", scenario.id, scenario.label);

    let cancelled = {
        let checks = run_checks(target, scenario, policy, &mut progress);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            () = checks => false,
        }
    };

    if cancelled {
        progress.finish(Outcome::Cancelled, Some("cancelled while in flight".to_string()));
    }

    ExecutionResult {
        duration_ms: start.elapsed().as_millis() as u64,
        attempts: progress.attempts,
        diagnostics: progress.diagnostics,
        ..ExecutionResult::new(scenario, progress.outcome)
    }
}

async fn run_checks(
    target: &dyn TargetApplication,
    scenario: &Scenario,
    policy: &RetryPolicy,
    progress: &mut Progress,
) {
    let repetitions = scenario.timing.map(|t| t.repetitions).unwrap_or(1).max(1);

    for repetition in 1..=repetitions {
        let started = Instant::now();
        let submitted = with_retry(policy, &mut progress.attempts, || target.submit(&scenario.input)).await;
        let mut response = match submitted {
            Ok(response) => response,
            Err(e) => {
                progress.fail_on(e);
                return;
            }
        };
        let elapsed = started.elapsed();

        if let Some(timing) = scenario.timing {
            if elapsed > Duration::from_millis(timing.budget_ms) {
                progress.finish(
                    Outcome::Fail,
                    Some(format!(
                        "submission {}/{} took {} ms, budget is {} ms",
                        repetition,
                        repetitions,
                        elapsed.as_millis(),
                        timing.budget_ms
                    )),
                );
                return;
            }
        }

        if scenario.expected == Expectation::RoundTrip && response.is_accepted() {
            let mut reads = 0;
            match with_retry(policy, &mut reads, || target.read_back(&scenario.input)).await {
                Ok(stored) => response.echo.extend(stored),
                Err(e) => {
                    progress.fail_on(e);
                    return;
                }
            }
        }

        if let Err(reason) = check_expectation(scenario, &response) {
            let reason = if repetitions > 1 {
                format!("submission {}/{}: {}", repetition, repetitions, reason)
            } else {
                reason
            };
            progress.finish(Outcome::Fail, Some(reason));
            if let Some(path) = &response.screenshot {
                progress.diagnostics.push(format!("screenshot: {}", path.display()));
            }
            return;
        }
    }

    progress.finish(Outcome::Pass, None);
}

/// Run `op` until it succeeds, fails for good, or the attempt bound is hit
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, attempts: &mut u32, mut op: F) -> Result<T, TargetError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TargetError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        *attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {} (retrying in {} ms)",
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Compare a response against what the scenario expects
pub fn check_expectation(scenario: &Scenario, response: &TargetResponse) -> Result<(), String> {
    match scenario.expected {
        Expectation::Accept if response.is_accepted() => Ok(()),
        Expectation::Accept => Err(format!(
            "expected {} to be accepted, target rejected it: {}",
            scenario.label,
            response.detail.as_deref().unwrap_or("no message")
        )),
        Expectation::Reject if response.is_accepted() => Err(format!(
            "{} was accepted by {}, validation should have rejected it",
            scenario.label, scenario.step
        )),
        Expectation::Reject => Ok(()),
        Expectation::RoundTrip if !response.is_accepted() => Err(format!(
            "expected {} to round-trip, target rejected it: {}",
            scenario.label,
            response.detail.as_deref().unwrap_or("no message")
        )),
        Expectation::RoundTrip => {
            let mismatches = echo_mismatches(&scenario.input.echo_fields(), &response.echo);
            if mismatches.is_empty() {
                Ok(())
            } else {
                Err(mismatches.join("; "))
            }
        }
    }
}

fn echo_mismatches(sent: &BTreeMap<&'static str, &str>, echoed: &BTreeMap<String, String>) -> Vec<String> {
    sent.iter()
        .filter_map(|(field, value)| match echoed.get(*field) {
            None => Some(format!("{} was not echoed", field)),
            Some(actual) if !values_match(value, actual) => {
                Some(format!("{}: sent '{}', got '{}'", field, value, actual))
            }
            Some(_) => None,
        })
        .collect()
}

/// Textual equality, with numbers compared by value ("1000" == "1000.00")
fn values_match(sent: &str, echoed: &str) -> bool {
    let (sent, echoed) = (sent.trim(), echoed.trim());
    if sent == echoed {
        return true;
    }
    match (parse_number(sent), parse_number(echoed)) {
        (Some(a), Some(b)) => (a - b).abs() < 0.005,
        _ => false,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
