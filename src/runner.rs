//! Suite execution.
//!
//! Runs discovered cases on a bounded `rayon` pool and collects one
//! [`CaseResult`] per case, in discovery order. Cases share nothing mutable;
//! the only coordination is a per-sample lock so the extraction engine never
//! sees the same file twice at once.
//!
//! ```rust,no_run
//! use decodecheck::extraction::CommandExtractor;
//! use decodecheck::runner::{Harness, HarnessConfig};
//!
//! let config = HarnessConfig::default();
//! let harness = Harness::new(config, Box::new(CommandExtractor::new("floss-strings")));
//! let report = harness.run().expect("test root is readable");
//! if !report.is_success() {
//!     std::process::exit(1);
//! }
//! ```

use std::any::Any;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::comparison::{evaluate_case, CasePhase, ComparisonOutcome, Evaluation};
use crate::diagnostics::HarnessError;
use crate::discovery::{CaseId, Discovery, RejectedManifest, TestCase, TestDiscoverer};
use crate::extraction::{SampleLocks, StringExtractor};
use crate::footer::{FooterReader, TrailerFooterReader};
use crate::ground_truth::GroundTruthSource;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for discovery, execution and reporting.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub test_root: PathBuf,
    /// Worker threads; 0 picks one per CPU.
    pub jobs: usize,
    /// Regex over full case ids.
    pub filter: Option<String>,
    pub use_colors: bool,
    pub show_diff: bool,
    pub json_report: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_root: PathBuf::from("tests/data"),
            jobs: 0,
            filter: None,
            use_colors: atty::is(atty::Stream::Stdout),
            show_diff: false,
            json_report: None,
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Coarse verdict of a case, as counted in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    ExpectedFail,
    Errored,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Passed => "PASS",
            Verdict::Failed => "FAIL",
            Verdict::ExpectedFail => "XFAIL",
            Verdict::Errored => "ERROR",
        }
    }
}

/// Result of executing one case.
#[derive(Debug)]
pub struct CaseResult {
    pub id: CaseId,
    pub sample_path: PathBuf,
    /// SHA-256 of the sample, absent for expected failures.
    pub sample_sha256: Option<String>,
    pub outcome: Result<ComparisonOutcome, HarnessError>,
    pub phase: CasePhase,
    /// Every state the case passed through.
    pub trail: Vec<CasePhase>,
    pub ground_truth: Option<GroundTruthSource>,
    pub elapsed: Duration,
}

impl CaseResult {
    pub fn verdict(&self) -> Verdict {
        match &self.outcome {
            Ok(ComparisonOutcome::Pass) => Verdict::Passed,
            Ok(ComparisonOutcome::Fail { .. }) => Verdict::Failed,
            Ok(ComparisonOutcome::ExpectedFail(_)) => Verdict::ExpectedFail,
            Err(_) => Verdict::Errored,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuiteCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub xfailed: usize,
    pub errored: usize,
    pub rejected: usize,
}

/// Everything one run produced.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub results: Vec<CaseResult>,
    pub rejected: Vec<RejectedManifest>,
    pub elapsed: Duration,
}

impl SuiteReport {
    pub fn counts(&self) -> SuiteCounts {
        let mut counts = SuiteCounts {
            total: self.results.len(),
            rejected: self.rejected.len(),
            ..SuiteCounts::default()
        };
        for result in &self.results {
            match result.verdict() {
                Verdict::Passed => counts.passed += 1,
                Verdict::Failed => counts.failed += 1,
                Verdict::ExpectedFail => counts.xfailed += 1,
                Verdict::Errored => counts.errored += 1,
            }
        }
        counts
    }

    /// True when no case failed or errored and no manifest was rejected.
    /// Expected failures never fail the suite.
    pub fn is_success(&self) -> bool {
        let counts = self.counts();
        counts.failed == 0 && counts.errored == 0 && counts.rejected == 0
    }
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Runs `cases` on a pool of `jobs` threads (0 = one per CPU). Results keep
/// the order of `cases`.
pub fn run_cases(
    cases: &[TestCase],
    footers: &dyn FooterReader,
    extractor: &dyn StringExtractor,
    jobs: usize,
) -> Result<Vec<CaseResult>, HarnessError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("decodecheck-{i}"))
        .build()
        .map_err(|e| HarnessError::config(format!("cannot build worker pool: {e}")))?;
    let locks = SampleLocks::new();

    Ok(pool.install(|| {
        cases
            .par_iter()
            .map(|case| run_case(case, footers, extractor, &locks))
            .collect()
    }))
}

/// Executes a single case, serialized against other cases on the same sample.
pub fn run_case(
    case: &TestCase,
    footers: &dyn FooterReader,
    extractor: &dyn StringExtractor,
    locks: &SampleLocks,
) -> CaseResult {
    let started = Instant::now();
    let evaluation = locks.with_lock(&case.sample_path, || {
        panic::catch_unwind(AssertUnwindSafe(|| evaluate_case(case, footers, extractor)))
            .unwrap_or_else(|payload| panicked(case, payload.as_ref()))
    });
    let sample_sha256 = match evaluation.phase {
        CasePhase::ExpectedFailSkip => None,
        _ => sha256_file(&case.sample_path),
    };
    let elapsed = started.elapsed();
    debug!(case = %case.id, ?elapsed, phase = ?evaluation.phase, "case finished");

    CaseResult {
        id: case.id.clone(),
        sample_path: case.sample_path.clone(),
        sample_sha256,
        outcome: evaluation.outcome,
        phase: evaluation.phase,
        trail: evaluation.trail,
        ground_truth: evaluation.ground_truth,
        elapsed,
    }
}

// A panicking engine errors its own case and leaves siblings running.
fn panicked(case: &TestCase, payload: &(dyn Any + Send)) -> Evaluation {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    warn!(case = %case.id, %message, "extractor panicked");
    Evaluation {
        outcome: Err(HarnessError::extraction(
            &case.sample_path,
            format!("extractor panicked: {message}"),
        )),
        phase: CasePhase::GroundTruthResolved,
        ground_truth: None,
        trail: vec![CasePhase::Pending, CasePhase::GroundTruthResolved],
    }
}

fn sha256_file(path: &Path) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).ok()?;
    Some(format!("{:x}", hasher.finalize()))
}

// =============================================================================
// HARNESS
// =============================================================================

/// Discovery plus execution with a fixed footer reader and extractor.
pub struct Harness {
    config: HarnessConfig,
    footers: Box<dyn FooterReader>,
    extractor: Box<dyn StringExtractor>,
}

impl Harness {
    /// Uses the trailer footer layout; see [`Harness::with_footer_reader`].
    pub fn new(config: HarnessConfig, extractor: Box<dyn StringExtractor>) -> Self {
        Self {
            config,
            footers: Box::new(TrailerFooterReader),
            extractor,
        }
    }

    pub fn with_footer_reader(mut self, footers: Box<dyn FooterReader>) -> Self {
        self.footers = footers;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn discover(&self) -> Result<Discovery, HarnessError> {
        let mut discoverer = TestDiscoverer::new();
        if let Some(filter) = self.config.filter.as_deref() {
            discoverer = discoverer.with_filter(filter)?;
        }
        discoverer.discover(&self.config.test_root)
    }

    /// Discovers and runs the whole suite.
    pub fn run(&self) -> Result<SuiteReport, HarnessError> {
        let started = Instant::now();
        let discovery = self.discover()?;
        info!(
            root = %self.config.test_root.display(),
            cases = discovery.cases.len(),
            rejected = discovery.rejected.len(),
            "running suite"
        );

        let results = run_cases(
            &discovery.cases,
            self.footers.as_ref(),
            self.extractor.as_ref(),
            self.config.jobs,
        )?;

        Ok(SuiteReport {
            results,
            rejected: discovery.rejected,
            elapsed: started.elapsed(),
        })
    }
}
