//! Unified error type for the harness.
//!
//! Every failure the harness can surface is a [`HarnessError`]. Errors are
//! case-local: a malformed manifest rejects that manifest, an extraction or
//! footer failure errors that case, and nothing here aborts sibling work.
//! Assertion mismatches are *not* errors; they travel as
//! [`ComparisonOutcome::Fail`](crate::comparison::ComparisonOutcome::Fail).

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Type-safe classification of [`HarnessError`] variants, used by reporting
/// and by tests that only care about the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedManifest,
    Io,
    Walk,
    Footer,
    Extraction,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedManifest => "MalformedManifest",
            ErrorKind::Io => "Io",
            ErrorKind::Walk => "Walk",
            ErrorKind::Footer => "Footer",
            ErrorKind::Extraction => "Extraction",
            ErrorKind::Config => "Config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("malformed manifest '{}': {reason}", path.display())]
    #[diagnostic(
        code(decodecheck::manifest::malformed),
        help("a manifest needs 'Test Name' and a non-empty 'Output Files' mapping of platform -> arch -> file")
    )]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("failed to read '{}'", path.display())]
    #[diagnostic(code(decodecheck::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk test directory: {0}")]
    #[diagnostic(code(decodecheck::walk))]
    Walk(#[from] walkdir::Error),

    #[error("invalid ground-truth footer in '{}': {reason}", path.display())]
    #[diagnostic(code(decodecheck::footer))]
    Footer { path: PathBuf, reason: String },

    #[error("string extraction failed for '{}': {reason}", path.display())]
    #[diagnostic(code(decodecheck::extraction))]
    Extraction { path: PathBuf, reason: String },

    #[error("invalid configuration: {reason}")]
    #[diagnostic(code(decodecheck::config))]
    Config { reason: String },
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::MalformedManifest { .. } => ErrorKind::MalformedManifest,
            HarnessError::Io { .. } => ErrorKind::Io,
            HarnessError::Walk(_) => ErrorKind::Walk,
            HarnessError::Footer { .. } => ErrorKind::Footer,
            HarnessError::Extraction { .. } => ErrorKind::Extraction,
            HarnessError::Config { .. } => ErrorKind::Config,
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        HarnessError::MalformedManifest {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        HarnessError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn footer(path: &Path, reason: impl Into<String>) -> Self {
        HarnessError::Footer {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn extraction(path: &Path, reason: impl Into<String>) -> Self {
        HarnessError::Extraction {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        HarnessError::Config {
            reason: reason.into(),
        }
    }
}
