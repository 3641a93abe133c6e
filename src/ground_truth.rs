//! Decides which expectations a sample is judged against.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::diagnostics::HarnessError;
use crate::footer::{FooterReader, FOOTER_ALL};
use crate::manifest::TestManifest;

/// Expected strings plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundTruth {
    /// Read from the sample's own footer. Overrides the manifest entirely.
    Embedded(BTreeSet<String>),
    /// The manifest's `Decoded strings`.
    Declared(BTreeSet<String>),
}

/// Serializable tag for [`GroundTruth`]'s origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundTruthSource {
    Embedded,
    Declared,
}

impl GroundTruth {
    pub fn strings(&self) -> &BTreeSet<String> {
        match self {
            GroundTruth::Embedded(s) | GroundTruth::Declared(s) => s,
        }
    }

    pub fn into_strings(self) -> BTreeSet<String> {
        match self {
            GroundTruth::Embedded(s) | GroundTruth::Declared(s) => s,
        }
    }

    pub fn source(&self) -> GroundTruthSource {
        match self {
            GroundTruth::Embedded(_) => GroundTruthSource::Embedded,
            GroundTruth::Declared(_) => GroundTruthSource::Declared,
        }
    }
}

/// Resolves ground truth for one sample. Not cached: footers are per sample.
pub fn resolve_ground_truth(
    sample: &Path,
    manifest: &TestManifest,
    footers: &dyn FooterReader,
) -> Result<GroundTruth, HarnessError> {
    if footers.has_footer(sample)? {
        let mut footer = footers.read_footer(sample)?;
        let strings = footer.remove(FOOTER_ALL).unwrap_or_default();
        debug!(sample = %sample.display(), count = strings.len(), "using embedded ground truth");
        return Ok(GroundTruth::Embedded(strings));
    }
    Ok(GroundTruth::Declared(manifest.expected_strings.clone()))
}
