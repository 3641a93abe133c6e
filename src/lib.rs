pub use crate::diagnostics::{ErrorKind, HarnessError};

pub mod cli;
pub mod comparison;
pub mod diagnostics;
pub mod discovery;
pub mod extraction;
pub mod footer;
pub mod ground_truth;
pub mod manifest;
pub mod report;
pub mod runner;
