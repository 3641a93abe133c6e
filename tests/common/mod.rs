//! # Shared fixtures for decodecheck integration tests
//!
//! Builds throwaway suites on disk (manifests, samples, footers) and provides
//! an in-memory extractor whose answers are fixed per sample file name.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use decodecheck::extraction::StringExtractor;
use decodecheck::footer::{encode_footer, Footer, FOOTER_ALL};
use decodecheck::HarnessError;
use tempfile::TempDir;

pub fn set(strings: &[&str]) -> BTreeSet<String> {
    strings.iter().map(|s| s.to_string()).collect()
}

/// A temporary test-data tree.
pub struct Suite {
    dir: TempDir,
}

impl Suite {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp suite"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `yaml` as `<dir>/test.yml`.
    pub fn manifest(&self, dir: &str, yaml: &str) -> PathBuf {
        self.write(&format!("{dir}/test.yml"), yaml.as_bytes())
    }

    pub fn sample(&self, path: &str, bytes: &[u8]) -> PathBuf {
        self.write(path, bytes)
    }

    /// A sample whose footer declares `strings` under `all`.
    pub fn sample_with_footer(&self, path: &str, body: &[u8], strings: &[&str]) -> PathBuf {
        let footer = Footer::from([(FOOTER_ALL.to_string(), set(strings))]);
        let mut bytes = body.to_vec();
        bytes.extend(encode_footer(&footer).expect("encode footer"));
        self.write(path, &bytes)
    }

    fn write(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, bytes).expect("write fixture");
        path
    }
}

/// Answers per sample file name; unknown samples yield an empty set.
#[derive(Default)]
pub struct FakeExtractor {
    answers: HashMap<String, Result<BTreeSet<String>, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: Mutex<HashSet<PathBuf>>,
    overlaps: AtomicUsize,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, sample: &str, strings: &[&str]) -> Self {
        self.answers.insert(sample.to_string(), Ok(set(strings)));
        self
    }

    pub fn failing(mut self, sample: &str, reason: &str) -> Self {
        self.answers.insert(sample.to_string(), Err(reason.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Times an extraction started while another was running on the same path.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

impl StringExtractor for FakeExtractor {
    fn extract(&self, sample: &Path) -> Result<BTreeSet<String>, HarnessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.in_flight.lock().unwrap().insert(sample.to_path_buf()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.in_flight.lock().unwrap().remove(sample);

        let name = sample
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.answers.get(&name) {
            Some(Ok(strings)) => Ok(strings.clone()),
            Some(Err(reason)) => Err(HarnessError::extraction(sample, reason.clone())),
            None => Ok(BTreeSet::new()),
        }
    }
}
