//! Handles all user-facing output of a run.
//!
//! Failure messages list the full expected and found sets (sorted, so output
//! is deterministic) plus the missing strings. Everything is written through
//! `termcolor::WriteColor` so callers pick the stream and color policy.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use difference::{Changeset, Difference};
use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::comparison::{CasePhase, ComparisonOutcome};
use crate::diagnostics::HarnessError;
use crate::ground_truth::GroundTruthSource;
use crate::runner::{CaseResult, SuiteCounts, SuiteReport, Verdict};

// ============================================================================
// MISMATCH RENDERING
// ============================================================================

/// Readable expected/found message for a failed comparison.
pub fn render_mismatch(expected: &BTreeSet<String>, found: &BTreeSet<String>) -> String {
    let missing: BTreeSet<&String> = expected.difference(found).collect();
    [
        "string extraction failed:".to_string(),
        format!("   expected: {:?}", expected),
        format!("   found: {:?}", found),
        format!("   missing: {:?}", missing),
    ]
    .join("\n")
}

/// Line diff from the expected set to the found set, one string per line.
/// `-` lines were expected but not found, `+` lines are extras.
pub fn render_diff(expected: &BTreeSet<String>, found: &BTreeSet<String>) -> String {
    let expected = join_lines(expected);
    let found = join_lines(found);
    let changeset = Changeset::new(&expected, &found, "\n");
    let mut out = Vec::new();
    for diff in &changeset.diffs {
        let (prefix, chunk) = match diff {
            Difference::Same(x) => (' ', x),
            Difference::Rem(x) => ('-', x),
            Difference::Add(x) => ('+', x),
        };
        out.extend(chunk.split('\n').map(|line| format!("{prefix}{line}")));
    }
    out.join("\n")
}

fn join_lines(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

// ============================================================================
// TEXT REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub show_diff: bool,
}

fn verdict_color(verdict: Verdict) -> Color {
    match verdict {
        Verdict::Passed => Color::Green,
        Verdict::Failed => Color::Red,
        Verdict::ExpectedFail => Color::Yellow,
        Verdict::Errored => Color::Magenta,
    }
}

fn write_label(out: &mut dyn WriteColor, label: &str, color: Color) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{label}")?;
    out.reset()
}

/// Writes one verdict line per case, rejected manifests, and the summary.
pub fn write_report(
    out: &mut dyn WriteColor,
    report: &SuiteReport,
    options: ReportOptions,
) -> io::Result<()> {
    for result in &report.results {
        write_case(out, result, options)?;
    }
    for rejected in &report.rejected {
        write_label(out, "REJECTED", Color::Red)?;
        writeln!(out, ": {}", rejected.path.display())?;
        writeln!(out, "  {}", rejected.error)?;
    }
    write_summary(out, &report.counts(), report)
}

pub fn write_case(
    out: &mut dyn WriteColor,
    result: &CaseResult,
    options: ReportOptions,
) -> io::Result<()> {
    let verdict = result.verdict();
    write_label(out, verdict.label(), verdict_color(verdict))?;
    write!(
        out,
        ": {} [{}]",
        result.id.name(),
        result.id.manifest_path.display()
    )?;
    match &result.outcome {
        Ok(ComparisonOutcome::Pass) => writeln!(out),
        Ok(ComparisonOutcome::ExpectedFail(reason)) => writeln!(out, " ({reason})"),
        Ok(ComparisonOutcome::Fail { expected, found }) => {
            writeln!(out)?;
            for line in render_mismatch(expected, found).lines() {
                writeln!(out, "  {line}")?;
            }
            if options.show_diff {
                writeln!(out, "  diff:")?;
                for line in render_diff(expected, found).lines() {
                    writeln!(out, "    {line}")?;
                }
            }
            Ok(())
        }
        Err(err) => {
            writeln!(out, " ({})", phase_label(result.phase))?;
            writeln!(out, "  {} error: {err}", err.kind())
        }
    }
}

fn phase_label(phase: CasePhase) -> &'static str {
    match phase {
        CasePhase::Pending => "while resolving ground truth",
        CasePhase::GroundTruthResolved => "while extracting strings",
        CasePhase::Extracted | CasePhase::Evaluated => "while comparing",
        CasePhase::ExpectedFailSkip => "skipped",
    }
}

fn write_summary(
    out: &mut dyn WriteColor,
    counts: &SuiteCounts,
    report: &SuiteReport,
) -> io::Result<()> {
    writeln!(out)?;
    write!(out, "Test summary: total {}, ", counts.total)?;
    write_label(out, "passed", Color::Green)?;
    write!(out, " {}, ", counts.passed)?;
    write_label(out, "failed", Color::Red)?;
    write!(out, " {}, ", counts.failed)?;
    write_label(out, "xfailed", Color::Yellow)?;
    write!(out, " {}, ", counts.xfailed)?;
    write_label(out, "errored", Color::Magenta)?;
    write!(out, " {}", counts.errored)?;
    if counts.rejected > 0 {
        write!(out, ", ")?;
        write_label(out, "rejected manifests", Color::Red)?;
        write!(out, " {}", counts.rejected)?;
    }
    writeln!(out, " ({:.2}s)", report.elapsed.as_secs_f64())?;

    let unexpected: Vec<_> = report
        .results
        .iter()
        .filter(|r| matches!(r.verdict(), Verdict::Failed | Verdict::Errored))
        .collect();
    if !unexpected.is_empty() {
        writeln!(out, "\nFailed tests:")?;
        for result in unexpected {
            writeln!(out, "  - {}", result.id)?;
        }
    }
    Ok(())
}

// ============================================================================
// JSON REPORT
// ============================================================================

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub summary: SuiteCounts,
    pub elapsed_ms: u64,
    pub cases: Vec<JsonCase>,
    pub rejected: Vec<JsonRejected>,
}

#[derive(Debug, Serialize)]
pub struct JsonCase {
    pub name: String,
    pub manifest: PathBuf,
    pub platform: String,
    pub arch: String,
    pub sample: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_sha256: Option<String>,
    pub verdict: Verdict,
    pub phase: CasePhase,
    pub trail: Vec<CasePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruthSource>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xfail_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonRejected {
    pub path: PathBuf,
    pub error: String,
}

impl From<&CaseResult> for JsonCase {
    fn from(result: &CaseResult) -> Self {
        let mut case = JsonCase {
            name: result.id.name(),
            manifest: result.id.manifest_path.clone(),
            platform: result.id.platform.clone(),
            arch: result.id.arch.clone(),
            sample: result.sample_path.clone(),
            sample_sha256: result.sample_sha256.clone(),
            verdict: result.verdict(),
            phase: result.phase,
            trail: result.trail.clone(),
            ground_truth: result.ground_truth,
            elapsed_ms: result.elapsed.as_millis() as u64,
            expected: None,
            found: None,
            missing: None,
            xfail_reason: None,
            error: None,
        };
        match &result.outcome {
            Ok(ComparisonOutcome::Fail { expected, found }) => {
                case.missing = Some(expected.difference(found).cloned().collect());
                case.expected = Some(expected.clone());
                case.found = Some(found.clone());
            }
            Ok(ComparisonOutcome::ExpectedFail(reason)) => {
                case.xfail_reason = Some(reason.to_string());
            }
            Ok(ComparisonOutcome::Pass) => {}
            Err(err) => case.error = Some(err.to_string()),
        }
        case
    }
}

impl From<&SuiteReport> for JsonReport {
    fn from(report: &SuiteReport) -> Self {
        JsonReport {
            summary: report.counts(),
            elapsed_ms: report.elapsed.as_millis() as u64,
            cases: report.results.iter().map(JsonCase::from).collect(),
            rejected: report
                .rejected
                .iter()
                .map(|r| JsonRejected {
                    path: r.path.clone(),
                    error: r.error.to_string(),
                })
                .collect(),
        }
    }
}

pub fn to_json(report: &SuiteReport) -> Result<String, HarnessError> {
    serde_json::to_string_pretty(&JsonReport::from(report))
        .map_err(|e| HarnessError::config(format!("cannot serialize report: {e}")))
}

pub fn write_json_report(path: &Path, report: &SuiteReport) -> Result<(), HarnessError> {
    let json = to_json(report)?;
    fs::write(path, json).map_err(|e| HarnessError::io(path, e))
}
