//! Boundary to the string-deobfuscation engine.
//!
//! The harness never looks inside the engine. It hands over a sample path and
//! gets back the set of strings the engine recovered. Any error aborts only
//! the case being evaluated and is never retried.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::diagnostics::HarnessError;

/// Placeholder in extractor arguments replaced by the sample path.
pub const SAMPLE_PLACEHOLDER: &str = "{}";

/// Turns a sample into the set of strings the engine decoded from it.
///
/// Implementations must be deterministic for a given sample and must not
/// modify the sample file.
pub trait StringExtractor: Send + Sync {
    fn extract(&self, sample: &Path) -> Result<BTreeSet<String>, HarnessError>;
}

impl<F> StringExtractor for F
where
    F: Fn(&Path) -> Result<BTreeSet<String>, HarnessError> + Send + Sync,
{
    fn extract(&self, sample: &Path) -> Result<BTreeSet<String>, HarnessError> {
        self(sample)
    }
}

/// Runs an external extraction tool once per sample and reads one decoded
/// string per line of its stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments passed before the sample. An argument containing `{}` gets
    /// the sample path substituted and suppresses the trailing sample argument.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kills the tool and fails the case once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_for(&self, sample: &Path) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        let sample_arg = sample.to_string_lossy();
        let mut substituted = false;
        for arg in &self.args {
            if arg.contains(SAMPLE_PLACEHOLDER) {
                cmd.arg(arg.replace(SAMPLE_PLACEHOLDER, &sample_arg));
                substituted = true;
            } else {
                cmd.arg(arg);
            }
        }
        if !substituted {
            cmd.arg(sample);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Spawns the tool and collects its output. Dropping the wait future on
    /// timeout drops the child, which kills it.
    async fn run_tool(&self, sample: &Path) -> Result<Output, HarnessError> {
        let child = self.command_for(sample).spawn().map_err(|e| {
            HarnessError::extraction(
                sample,
                format!("cannot start '{}': {e}", self.program.display()),
            )
        })?;

        let output = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(sample = %sample.display(), "extractor timed out, killed");
                    return Err(HarnessError::extraction(
                        sample,
                        format!("timed out after {:.1}s", limit.as_secs_f64()),
                    ));
                }
            },
            None => child.wait_with_output().await,
        };
        output.map_err(|e| HarnessError::extraction(sample, format!("waiting for tool: {e}")))
    }
}

impl StringExtractor for CommandExtractor {
    fn extract(&self, sample: &Path) -> Result<BTreeSet<String>, HarnessError> {
        let started = Instant::now();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HarnessError::extraction(sample, format!("cannot start runtime: {e}")))?;
        let output = runtime.block_on(self.run_tool(sample))?;
        debug!(
            sample = %sample.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            status = %output.status,
            "extractor finished"
        );

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr);
            return Err(HarnessError::extraction(
                sample,
                format!("tool exited with {}: {}", output.status, detail.trim()),
            ));
        }
        let text = String::from_utf8(output.stdout)
            .map_err(|e| HarnessError::extraction(sample, format!("output is not UTF-8: {e}")))?;
        Ok(parse_lines(&text))
    }
}

/// One decoded string per non-empty line. Interior whitespace is preserved.
pub fn parse_lines(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Per-sample mutexes so the engine never runs twice on the same physical
/// file at once. Keys are canonical paths.
#[derive(Debug, Default)]
pub struct SampleLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SampleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, sample: &Path) -> Arc<Mutex<()>> {
        let key = sample
            .canonicalize()
            .unwrap_or_else(|_| sample.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Runs `f` while holding the lock for `sample`.
    pub fn with_lock<T>(&self, sample: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(sample);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
