//! Per-case evaluation: xfail check, ground truth, extraction, subset check.
//!
//! Each case walks a small state machine:
//!
//! ```text
//! Pending -> ExpectedFailSkip
//! Pending -> GroundTruthResolved -> Extracted -> Evaluated
//! ```
//!
//! A case that errors stops in the state it had reached, so a failed footer
//! read ends in `Pending` and a failed extraction in `GroundTruthResolved`.
//! [`Evaluation::trail`] records every state visited.
//!
//! The xfail check happens before anything touches the sample, since known
//! broken inputs may also crash the extraction engine.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::diagnostics::HarnessError;
use crate::discovery::TestCase;
use crate::extraction::StringExtractor;
use crate::footer::FooterReader;
use crate::ground_truth::{resolve_ground_truth, GroundTruthSource};
use crate::manifest::XfailReason;

/// Verdict of one evaluated case. Hard errors are carried separately as
/// `Err(HarnessError)` by [`Evaluation::outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonOutcome {
    Pass,
    /// `expected` was not a subset of `found`. Both sets are kept whole.
    Fail {
        expected: BTreeSet<String>,
        found: BTreeSet<String>,
    },
    ExpectedFail(XfailReason),
}

impl ComparisonOutcome {
    /// `expected − found` for a failure.
    pub fn missing(&self) -> Option<BTreeSet<String>> {
        match self {
            ComparisonOutcome::Fail { expected, found } => {
                Some(expected.difference(found).cloned().collect())
            }
            _ => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ComparisonOutcome::Pass)
    }
}

/// Subset comparison. Extra found strings never fail a case, and an empty
/// expectation always passes.
pub fn compare(expected: BTreeSet<String>, found: BTreeSet<String>) -> ComparisonOutcome {
    if expected.is_empty() || expected.is_subset(&found) {
        ComparisonOutcome::Pass
    } else {
        ComparisonOutcome::Fail { expected, found }
    }
}

/// Furthest state a case reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePhase {
    Pending,
    ExpectedFailSkip,
    GroundTruthResolved,
    Extracted,
    Evaluated,
}

#[derive(Debug)]
pub struct Evaluation {
    pub outcome: Result<ComparisonOutcome, HarnessError>,
    /// Final state, always the last entry of `trail`.
    pub phase: CasePhase,
    pub ground_truth: Option<GroundTruthSource>,
    /// Every state the case passed through, starting at `Pending`.
    pub trail: Vec<CasePhase>,
}

impl Evaluation {
    fn finish(
        trail: Vec<CasePhase>,
        ground_truth: Option<GroundTruthSource>,
        outcome: Result<ComparisonOutcome, HarnessError>,
    ) -> Self {
        Self {
            outcome,
            phase: trail.last().copied().unwrap_or(CasePhase::Pending),
            ground_truth,
            trail,
        }
    }
}

/// Evaluates one case against its ground truth.
pub fn evaluate_case(
    case: &TestCase,
    footers: &dyn FooterReader,
    extractor: &dyn StringExtractor,
) -> Evaluation {
    let mut trail = vec![CasePhase::Pending];

    if let Some(reason) = case.manifest.xfail_reason(&case.id.platform, &case.id.arch) {
        debug!(case = %case.id, %reason, "expected failure, not evaluated");
        trail.push(CasePhase::ExpectedFailSkip);
        return Evaluation::finish(trail, None, Ok(ComparisonOutcome::ExpectedFail(reason)));
    }

    let truth = match resolve_ground_truth(&case.sample_path, &case.manifest, footers) {
        Ok(truth) => truth,
        Err(err) => return Evaluation::finish(trail, None, Err(err)),
    };
    let source = truth.source();
    trail.push(CasePhase::GroundTruthResolved);

    let found = match extractor.extract(&case.sample_path) {
        Ok(found) => found,
        Err(err) => return Evaluation::finish(trail, Some(source), Err(err)),
    };
    debug!(case = %case.id, found = found.len(), "extraction finished");
    trail.push(CasePhase::Extracted);

    let outcome = compare(truth.into_strings(), found);
    trail.push(CasePhase::Evaluated);
    Evaluation::finish(trail, Some(source), Ok(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(strings: &[&str]) -> BTreeSet<String> {
        strings.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn superset_passes() {
        let outcome = compare(
            set(&["secret1", "secret2"]),
            set(&["secret1", "secret2", "junk"]),
        );
        assert_eq!(outcome, ComparisonOutcome::Pass);
    }

    #[test]
    fn under_recovery_fails_with_both_sets() {
        let outcome = compare(set(&["secret1", "secret2"]), set(&["secret1"]));
        assert_eq!(
            outcome,
            ComparisonOutcome::Fail {
                expected: set(&["secret1", "secret2"]),
                found: set(&["secret1"]),
            }
        );
        assert_eq!(outcome.missing(), Some(set(&["secret2"])));
    }

    #[test]
    fn empty_expectation_always_passes() {
        assert!(compare(BTreeSet::new(), BTreeSet::new()).is_pass());
        assert!(compare(BTreeSet::new(), set(&["anything"])).is_pass());
    }

    #[test]
    fn equality_is_not_required() {
        assert!(compare(set(&["a"]), set(&["a", "b", "c"])).is_pass());
        assert!(!compare(set(&["a", "z"]), set(&["a", "b", "c"])).is_pass());
    }

    #[test]
    fn pass_has_no_missing_set() {
        assert_eq!(ComparisonOutcome::Pass.missing(), None);
    }
}
