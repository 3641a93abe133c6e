use std::process::ExitCode;

use clap::Parser;
use decodecheck::cli::{self, args::DecodecheckArgs};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = DecodecheckArgs::parse();

    // RUST_LOG wins; otherwise --verbose selects debug output.
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("decodecheck=debug")
    } else {
        EnvFilter::new("decodecheck=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("Logging initialized (verbose={})", args.verbose);

    match cli::run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(2)
        }
    }
}
