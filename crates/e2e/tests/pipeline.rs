//! Catalog-to-report runs against the stub bank

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{config, trigger, Behaviour, StubBank};
use odc_common::{Outcome, ReportFormat, TriggerCategory};
use odc_e2e::{E2eError, Report, TestRunner, TriggerFilter};

fn full_catalog() -> Vec<odc_common::TriggerDef> {
    vec![
        trigger("loan-amount", "input-validation", "loan-application", Some("amount"), 5),
        trigger("login-username", "input-validation", "login", Some("username"), 4),
        trigger("profile-zip", "input-validation", "profile-update", Some("zip_code"), 2),
        trigger("transfer-burst", "timing", "account-transfer", None, 3),
        trigger("profile-roundtrip", "data-mapping", "profile-update", None, 2),
        trigger("transfer-roundtrip", "data-mapping", "account-transfer", None, 2),
        trigger("login-smoke", "other", "login", None, 1),
    ]
}

#[tokio::test]
async fn negative_loan_amount_is_reported_under_input_validation() {
    let runner = TestRunner::with_target(
        config(vec![trigger(
            "loan-amount",
            "input-validation",
            "loan-application",
            Some("amount"),
            5,
        )]),
        Arc::new(StubBank::new(Behaviour::AcceptsNegativeAmounts)),
    );

    let plan = runner.plan().unwrap();
    let negative = plan
        .scenarios
        .iter()
        .find(|s| s.label == "negative amount")
        .unwrap();

    let report = runner.run_plan("run-negative", &plan).await.unwrap();
    let result = report
        .results
        .iter()
        .find(|r| r.scenario_id == negative.id)
        .unwrap();

    assert_eq!(result.outcome, Outcome::Fail);
    assert!(result.diagnostics[0].contains("negative amount"));
    assert_eq!(report.summary[&TriggerCategory::InputValidation].failed, 1);
    assert!(!report.passed());
}

#[tokio::test]
async fn strict_bank_passes_every_category() {
    let bank = Arc::new(StubBank::new(Behaviour::Strict));
    let runner = TestRunner::with_target(config(full_catalog()), bank.clone());

    let report = runner.run("run-strict").await.unwrap();

    let failures: Vec<_> = report.failures().collect();
    assert!(failures.is_empty(), "unexpected failures: {:?}", failures);
    assert!(report.passed());
    for category in TriggerCategory::ALL {
        assert!(report.summary[&category].total > 0, "{} had no scenarios", category);
    }
}

#[tokio::test]
async fn every_scenario_has_exactly_one_result() {
    let mut cfg = config(full_catalog());
    cfg.execution.parallelism = 4;
    let runner = TestRunner::with_target(cfg, Arc::new(StubBank::new(Behaviour::Strict)));

    let plan = runner.plan().unwrap();
    let report = runner.run_plan("run-once", &plan).await.unwrap();

    let planned: Vec<&str> = plan.scenarios.iter().map(|s| s.id.as_str()).collect();
    let reported: Vec<&str> = report.results.iter().map(|r| r.scenario_id.as_str()).collect();
    assert_eq!(planned, reported);

    let unique: HashSet<&str> = reported.iter().copied().collect();
    assert_eq!(unique.len(), reported.len());

    let summed: usize = report.summary.values().map(|s| s.total).sum();
    assert_eq!(summed, report.total());
}

#[tokio::test]
async fn unknown_workflow_is_recorded_without_blocking_others() {
    let runner = TestRunner::with_target(
        config(vec![
            trigger("bill-pay", "other", "bill-pay", None, 1),
            trigger("login-smoke", "other", "login", None, 1),
        ]),
        Arc::new(StubBank::new(Behaviour::Strict)),
    );

    let report = runner.run("run-unknown").await.unwrap();

    assert_eq!(report.generation_failures.len(), 1);
    assert_eq!(report.generation_failures[0].trigger_id, "bill-pay");
    assert_eq!(report.total(), 1);
    assert_eq!(report.count(Outcome::Pass), 1);
    assert!(!report.passed());
}

#[test]
fn plans_are_reproducible_per_seed() {
    let bank = Arc::new(StubBank::new(Behaviour::Strict));
    let first = TestRunner::with_target(config(full_catalog()), bank.clone());
    let second = TestRunner::with_target(config(full_catalog()), bank.clone());
    assert_eq!(first.plan().unwrap(), second.plan().unwrap());

    let mut reseeded = config(full_catalog());
    reseeded.generation.seed = 7;
    let third = TestRunner::with_target(reseeded, bank);
    assert_ne!(
        first.plan().unwrap().fingerprint,
        third.plan().unwrap().fingerprint
    );
}

#[test]
fn prioritized_plan_runs_heaviest_triggers_first() {
    let runner = TestRunner::with_target(
        config(full_catalog()),
        Arc::new(StubBank::new(Behaviour::Strict)),
    );
    let plan = runner.plan().unwrap();
    assert_eq!(plan.scenarios[0].trigger_id, "loan-amount");
    assert_eq!(plan.scenarios.last().unwrap().trigger_id, "login-smoke");
}

#[tokio::test]
async fn category_filter_limits_the_run() {
    let runner = TestRunner::with_target(
        config(full_catalog()),
        Arc::new(StubBank::new(Behaviour::Strict)),
    )
    .with_filter(TriggerFilter {
        category: Some(TriggerCategory::Timing),
        ..Default::default()
    });

    let report = runner.run("run-timing").await.unwrap();
    assert!(report.total() > 0);
    assert!(report
        .results
        .iter()
        .all(|r| r.category == TriggerCategory::Timing));
}

#[tokio::test]
async fn report_artifacts_match_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(full_catalog());
    cfg.report.output_dir = dir.path().join("results");
    cfg.report.formats = vec![ReportFormat::Json, ReportFormat::Junit];

    let runner = TestRunner::with_target(cfg, Arc::new(StubBank::new(Behaviour::AcceptsNegativeAmounts)));
    let report = runner.run("run-artifacts").await.unwrap();
    let written = runner.write_report(&report).unwrap();
    assert_eq!(written.len(), 2);

    let json = std::fs::read_to_string(dir.path().join("results/report.json")).unwrap();
    assert_eq!(Report::from_json(&json).unwrap(), report);

    let junit = std::fs::read_to_string(dir.path().join("results/junit.xml")).unwrap();
    assert_eq!(junit.matches("<testcase ").count(), report.total());
    assert_eq!(junit.matches("<failure ").count(), report.count(Outcome::Fail));
}

#[tokio::test]
async fn data_mapping_passes_when_values_are_only_read_back() {
    let bank = Arc::new(StubBank::new(Behaviour::ConfirmsOnly));
    let runner = TestRunner::with_target(config(full_catalog()), bank.clone()).with_filter(TriggerFilter {
        category: Some(TriggerCategory::DataMapping),
        ..Default::default()
    });

    let report = runner.run("run-read-back").await.unwrap();
    assert!(report.total() > 0);
    assert!(report.passed(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(bank.read_backs(), report.total());
}

#[tokio::test]
async fn mistyped_trigger_id_does_not_pass() {
    let bank = Arc::new(StubBank::new(Behaviour::Strict));
    let runner = TestRunner::with_target(config(full_catalog()), bank.clone()).with_filter(TriggerFilter {
        ids: vec!["login-smok".into()],
        ..Default::default()
    });

    let err = runner.run("run-typo").await.unwrap_err();
    assert!(matches!(err, E2eError::EmptyPlan(_)));
    assert!(err.to_string().contains("login-smok"));
    assert_eq!(bank.calls(), 0);
}
