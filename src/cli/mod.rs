//! The decodecheck command-line interface.
//!
//! This module dispatches subcommands to the library and maps the suite
//! verdict onto a process exit status.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use termcolor::{ColorChoice, StandardStream};
use tracing::info;

use crate::cli::args::{Command, DecodecheckArgs};
use crate::diagnostics::HarnessError;
use crate::discovery::TestDiscoverer;
use crate::extraction::CommandExtractor;
use crate::report::{write_json_report, write_report, ReportOptions};
use crate::runner::{Harness, HarnessConfig};

pub mod args;

/// Dispatches to the appropriate subcommand handler.
pub fn run(args: DecodecheckArgs) -> Result<ExitCode, HarnessError> {
    match args.command {
        Command::Run {
            root,
            extractor,
            extractor_args,
            jobs,
            filter,
            timeout,
            json,
            diff,
            no_color,
        } => {
            let defaults = HarnessConfig::default();
            let config = HarnessConfig {
                test_root: root,
                jobs,
                filter,
                use_colors: defaults.use_colors && !no_color,
                show_diff: diff,
                json_report: json,
            };
            let extractor = CommandExtractor::new(extractor)
                .with_args(extractor_args)
                .with_timeout(timeout.map(Duration::from_secs));
            handle_run(config, extractor)
        }
        Command::List { root, filter } => handle_list(root, filter),
    }
}

fn handle_run(config: HarnessConfig, extractor: CommandExtractor) -> Result<ExitCode, HarnessError> {
    let harness = Harness::new(config, Box::new(extractor));
    let report = harness.run()?;
    let config = harness.config();

    let mut stdout = StandardStream::stdout(color_choice(config.use_colors));
    let options = ReportOptions {
        show_diff: config.show_diff,
    };
    write_report(&mut stdout, &report, options)
        .map_err(|e| HarnessError::io(Path::new("<stdout>"), e))?;

    if let Some(path) = &config.json_report {
        write_json_report(path, &report)?;
        info!(path = %path.display(), "wrote JSON report");
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_list(root: PathBuf, filter: Option<String>) -> Result<ExitCode, HarnessError> {
    let mut discoverer = TestDiscoverer::new();
    if let Some(filter) = filter.as_deref() {
        discoverer = discoverer.with_filter(filter)?;
    }
    let discovery = discoverer.discover(&root)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let write_err = |e: std::io::Error| HarnessError::io(Path::new("<stdout>"), e);
    for case in &discovery.cases {
        writeln!(out, "{}\t{}", case.id, case.sample_path.display()).map_err(write_err)?;
    }
    for rejected in &discovery.rejected {
        writeln!(out, "REJECTED\t{}\t{}", rejected.path.display(), rejected.error)
            .map_err(write_err)?;
    }

    Ok(if discovery.rejected.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn color_choice(use_colors: bool) -> ColorChoice {
    if use_colors {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}
