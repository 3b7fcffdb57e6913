//! Run report: aggregation and artifact writers

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use odc_common::{ExecutionResult, GenerationFailure, Outcome, ReportFormat, TriggerCategory};

use crate::error::{E2eError, E2eResult};

pub const JSON_REPORT_FILE: &str = "report.json";
pub const JUNIT_REPORT_FILE: &str = "junit.xml";

/// Per-category outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub fatal: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub generation_failures: usize,
}

impl CategorySummary {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::Fail => self.failed += 1,
            Outcome::Error => self.errored += 1,
            Outcome::Fatal => self.fatal += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Skipped => self.skipped += 1,
        }
    }

    pub fn not_passed(&self) -> usize {
        self.total - self.passed
    }
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub summary: BTreeMap<TriggerCategory, CategorySummary>,
    pub results: Vec<ExecutionResult>,
    #[serde(default)]
    pub generation_failures: Vec<GenerationFailure>,
}

/// Build a report from execution results.
///
/// Pure: the same inputs always yield the same report. Every category
/// appears in the summary, with zero counts when it had no scenarios.
pub fn aggregate(
    run_id: &str,
    results: &[ExecutionResult],
    generation_failures: &[GenerationFailure],
) -> Report {
    let mut summary: BTreeMap<TriggerCategory, CategorySummary> = TriggerCategory::ALL
        .iter()
        .map(|c| (*c, CategorySummary::default()))
        .collect();

    for result in results {
        summary.entry(result.category).or_default().record(result.outcome);
    }
    for failure in generation_failures {
        summary.entry(failure.category).or_default().generation_failures += 1;
    }

    Report {
        run_id: run_id.to_string(),
        summary,
        results: results.to_vec(),
        generation_failures: generation_failures.to_vec(),
    }
}

impl Report {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// True when every scenario passed and every trigger generated
    pub fn passed(&self) -> bool {
        self.generation_failures.is_empty() && self.results.iter().all(|r| r.outcome.is_pass())
    }

    /// True when the run stopped on an unreachable target
    pub fn aborted(&self) -> bool {
        self.results.iter().any(|r| r.outcome == Outcome::Fatal)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.outcome.is_pass())
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }

    pub fn to_json(&self) -> E2eResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> E2eResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Render JUnit XML: one suite per category with scenarios
    pub fn to_junit(&self) -> E2eResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let total = self.total() + self.generation_failures.len();
        let failures = self.count(Outcome::Fail);
        let errors = self.count(Outcome::Error)
            + self.count(Outcome::Fatal)
            + self.generation_failures.len();
        let skipped = self.count(Outcome::Cancelled) + self.count(Outcome::Skipped);
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();

        let mut root = BytesStart::new("testsuites");
        root.push_attribute(("name", self.run_id.as_str()));
        root.push_attribute(("tests", total.to_string().as_str()));
        root.push_attribute(("failures", failures.to_string().as_str()));
        root.push_attribute(("errors", errors.to_string().as_str()));
        root.push_attribute(("skipped", skipped.to_string().as_str()));
        root.push_attribute(("time", seconds(self.total_duration_ms()).as_str()));
        writer.write_event(Event::Start(root)).map_err(xml_err)?;

        for (category, summary) in &self.summary {
            if summary.total == 0 {
                continue;
            }
            let mut suite = BytesStart::new("testsuite");
            suite.push_attribute(("name", category.as_str()));
            suite.push_attribute(("tests", summary.total.to_string().as_str()));
            suite.push_attribute(("failures", summary.failed.to_string().as_str()));
            suite.push_attribute((
                "errors",
                (summary.errored + summary.fatal).to_string().as_str(),
            ));
            suite.push_attribute((
                "skipped",
                (summary.cancelled + summary.skipped).to_string().as_str(),
            ));
            suite.push_attribute(("timestamp", timestamp.as_str()));
            writer.write_event(Event::Start(suite)).map_err(xml_err)?;

            for result in self.results.iter().filter(|r| r.category == *category) {
                write_testcase(&mut writer, result)?;
            }

            writer
                .write_event(Event::End(BytesEnd::new("testsuite")))
                .map_err(xml_err)?;
        }

        if !self.generation_failures.is_empty() {
            let count = self.generation_failures.len().to_string();
            let mut suite = BytesStart::new("testsuite");
            suite.push_attribute(("name", "generation"));
            suite.push_attribute(("tests", count.as_str()));
            suite.push_attribute(("failures", "0"));
            suite.push_attribute(("errors", count.as_str()));
            suite.push_attribute(("skipped", "0"));
            suite.push_attribute(("timestamp", timestamp.as_str()));
            writer.write_event(Event::Start(suite)).map_err(xml_err)?;

            for failure in &self.generation_failures {
                let mut case = BytesStart::new("testcase");
                case.push_attribute(("name", failure.trigger_id.as_str()));
                case.push_attribute(("classname", format!("generation.{}", failure.category).as_str()));
                case.push_attribute(("time", "0.000"));
                writer.write_event(Event::Start(case)).map_err(xml_err)?;
                write_detail(&mut writer, "error", "generation", &failure.reason)?;
                writer
                    .write_event(Event::End(BytesEnd::new("testcase")))
                    .map_err(xml_err)?;
            }

            writer
                .write_event(Event::End(BytesEnd::new("testsuite")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("testsuites")))
            .map_err(xml_err)?;

        String::from_utf8(writer.into_inner()).map_err(xml_err)
    }

    /// Write the configured artifacts into `dir`
    pub fn write(&self, dir: &Path, formats: &[ReportFormat]) -> E2eResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for format in formats {
            let (path, content) = match format {
                ReportFormat::Json => (dir.join(JSON_REPORT_FILE), self.to_json()?),
                ReportFormat::Junit => (dir.join(JUNIT_REPORT_FILE), self.to_junit()?),
            };
            std::fs::write(&path, content)?;
            info!("Report written to: {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

fn write_testcase(writer: &mut Writer<Vec<u8>>, result: &ExecutionResult) -> E2eResult<()> {
    let mut case = BytesStart::new("testcase");
    case.push_attribute(("name", result.scenario_id.as_str()));
    case.push_attribute((
        "classname",
        format!("{}.{}", result.category, result.trigger_id).as_str(),
    ));
    case.push_attribute(("time", seconds(result.duration_ms).as_str()));

    let message = result.diagnostics.join("; ");
    let child = match result.outcome {
        Outcome::Pass => None,
        Outcome::Fail => Some(("failure", "fail")),
        Outcome::Error => Some(("error", "error")),
        Outcome::Fatal => Some(("error", "fatal")),
        Outcome::Cancelled => Some(("skipped", "cancelled")),
        Outcome::Skipped => Some(("skipped", "skipped")),
    };

    match child {
        None => writer.write_event(Event::Empty(case)).map_err(xml_err)?,
        Some((tag, kind)) => {
            writer.write_event(Event::Start(case)).map_err(xml_err)?;
            write_detail(writer, tag, kind, &message)?;
            writer
                .write_event(Event::End(BytesEnd::new("testcase")))
                .map_err(xml_err)?;
        }
    }

    Ok(())
}

fn write_detail(writer: &mut Writer<Vec<u8>>, tag: &str, kind: &str, message: &str) -> E2eResult<()> {
    let mut element = BytesStart::new(tag);
    element.push_attribute(("type", kind));
    element.push_attribute(("message", message));

    if message.is_empty() {
        writer.write_event(Event::Empty(element)).map_err(xml_err)?;
    } else {
        writer.write_event(Event::Start(element)).map_err(xml_err)?;
        writer
            .write_event(Event::Text(BytesText::new(message)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml_err)?;
    }
    Ok(())
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn xml_err(e: impl std::fmt::Display) -> E2eError {
    E2eError::Report(e.to_string())
}
