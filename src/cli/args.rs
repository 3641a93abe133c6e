//! Defines the command-line arguments and subcommands for the decodecheck CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "decodecheck",
    version,
    about = "Checks decoded-string extraction against manifest and footer ground truth."
)]
pub struct DecodecheckArgs {
    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover every test.yml under ROOT and check each sample.
    Run {
        /// Directory searched recursively for test.yml manifests.
        #[arg(default_value = "tests/data")]
        root: PathBuf,
        /// Extraction tool; prints one decoded string per line for a sample.
        #[arg(long, short = 'x')]
        extractor: PathBuf,
        /// Argument for the extraction tool; `{}` is replaced by the sample path.
        #[arg(long = "extractor-arg", allow_hyphen_values = true)]
        extractor_args: Vec<String>,
        /// Worker threads (0 = one per CPU).
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
        /// Only run cases whose id (path::name::platform::arch) matches this regex.
        #[arg(long)]
        filter: Option<String>,
        /// Kill the extraction tool after this many seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Also write a JSON report to this path.
        #[arg(long)]
        json: Option<PathBuf>,
        /// Show a line diff of expected vs. found strings on failure.
        #[arg(long)]
        diff: bool,
        /// Disable colored output.
        #[arg(long)]
        no_color: bool,
    },
    /// List the cases that would run, without extracting anything.
    List {
        /// Directory searched recursively for test.yml manifests.
        #[arg(default_value = "tests/data")]
        root: PathBuf,
        /// Only list cases whose id matches this regex.
        #[arg(long)]
        filter: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_extractor_args() {
        let args = DecodecheckArgs::parse_from([
            "decodecheck",
            "run",
            "suite",
            "-x",
            "floss",
            "--extractor-arg",
            "--only-decoded",
            "--extractor-arg",
            "{}",
            "-j",
            "4",
        ]);
        let Command::Run {
            root,
            extractor,
            extractor_args,
            jobs,
            ..
        } = args.command
        else {
            panic!("expected run");
        };
        assert_eq!(root, PathBuf::from("suite"));
        assert_eq!(extractor, PathBuf::from("floss"));
        assert_eq!(extractor_args, vec!["--only-decoded", "{}"]);
        assert_eq!(jobs, 4);
    }

    #[test]
    fn list_defaults_root() {
        let args = DecodecheckArgs::parse_from(["decodecheck", "list"]);
        assert!(matches!(args.command, Command::List { root, .. } if root == PathBuf::from("tests/data")));
    }
}
