use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::diagnostics::HarnessError;
use crate::manifest::{load_manifest, TestManifest, MANIFEST_FILE_NAME};

// =====================
// Case identity
// =====================

/// Identity of one `(manifest, platform, arch)` case.
///
/// `name()` is the human-facing `"{name}::{platform}::{arch}"` form. Equality,
/// ordering and `Display` also include the manifest path, so two manifests that
/// share a test name in different directories never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaseId {
    pub manifest_path: PathBuf,
    pub test_name: String,
    pub platform: String,
    pub arch: String,
}

impl CaseId {
    pub fn name(&self) -> String {
        format!("{}::{}::{}", self.test_name, self.platform, self.arch)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.manifest_path.display(), self.name())
    }
}

/// One executable case: a sample that exists on disk plus its owning manifest.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: CaseId,
    pub sample_path: PathBuf,
    pub manifest: Arc<TestManifest>,
}

/// A manifest that could not be loaded. Discovery continues past it.
#[derive(Debug)]
pub struct RejectedManifest {
    pub path: PathBuf,
    pub error: HarnessError,
}

/// Everything discovery found under a root, in deterministic order.
#[derive(Debug, Default)]
pub struct Discovery {
    pub cases: Vec<TestCase>,
    pub rejected: Vec<RejectedManifest>,
}

/// Manifest files under a root plus the entries the walk could not read.
#[derive(Debug, Default)]
pub struct ManifestWalk {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<RejectedManifest>,
}

// =====================
// Discoverer
// =====================

/// Finds `test.yml` manifests and expands them into [`TestCase`]s.
///
/// The discovery process follows this flow:
/// 1. Walk the root for files named `test.yml` (sorted)
/// 2. Load and validate each manifest
/// 3. Emit one case per `(platform, arch)` whose sample exists
/// 4. Keep cases whose full id matches the optional filter
#[derive(Debug, Default)]
pub struct TestDiscoverer {
    filter: Option<Regex>,
}

impl TestDiscoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts discovery to cases whose full id (`path::name::platform::arch`)
    /// matches `pattern`.
    pub fn with_filter(mut self, pattern: &str) -> Result<Self, HarnessError> {
        let regex = Regex::new(pattern)
            .map_err(|e| HarnessError::config(format!("invalid filter '{pattern}': {e}")))?;
        self.filter = Some(regex);
        Ok(self)
    }

    /// Recursively lists manifest files under `root`, sorted so execution and
    /// reporting order are reproducible. Entries below the root that cannot be
    /// walked (unreadable directories, symlink loops) are collected instead of
    /// ending the walk; only a failure on `root` itself is an error.
    pub fn discover_manifest_files<P: AsRef<Path>>(
        root: P,
    ) -> Result<ManifestWalk, HarnessError> {
        let root = root.as_ref();
        let mut walk = ManifestWalk::default();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(err.into()),
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    walk.unreadable.push(RejectedManifest {
                        path,
                        error: HarnessError::Walk(err),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() != MANIFEST_FILE_NAME {
                continue;
            }
            walk.files.push(entry.path().to_path_buf());
        }
        walk.files.sort();
        walk.unreadable.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(walk)
    }

    /// Discovers every case under `root`. Only a failure to walk `root` itself
    /// is fatal; malformed manifests land in [`Discovery::rejected`].
    pub fn discover<P: AsRef<Path>>(&self, root: P) -> Result<Discovery, HarnessError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| HarnessError::io(root, e))?;
        let walk = Self::discover_manifest_files(&root)?;
        let mut discovery = Discovery {
            rejected: walk.unreadable,
            ..Discovery::default()
        };

        for manifest_path in walk.files {
            match load_manifest(&manifest_path) {
                Ok(manifest) => {
                    let cases = self.expand_manifest(&manifest_path, Arc::new(manifest));
                    discovery.cases.extend(cases);
                }
                Err(error) => {
                    warn!(path = %manifest_path.display(), %error, "skipping manifest");
                    discovery.rejected.push(RejectedManifest {
                        path: manifest_path,
                        error,
                    });
                }
            }
        }
        debug!(
            cases = discovery.cases.len(),
            rejected = discovery.rejected.len(),
            "discovery finished"
        );
        Ok(discovery)
    }

    /// Expands one loaded manifest into cases. Combinations whose sample is not
    /// on disk are skipped without error.
    pub fn expand_manifest(
        &self,
        manifest_path: &Path,
        manifest: Arc<TestManifest>,
    ) -> Vec<TestCase> {
        let test_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let mut cases = Vec::new();

        for (platform, arch, file) in manifest.combinations() {
            let sample_path = test_dir.join(file);
            if !sample_path.is_file() {
                debug!(sample = %sample_path.display(), "sample not present, skipping");
                continue;
            }
            let id = CaseId {
                manifest_path: manifest_path.to_path_buf(),
                test_name: manifest.name.clone(),
                platform: platform.to_string(),
                arch: arch.to_string(),
            };
            if !self.accepts(&id) {
                continue;
            }
            cases.push(TestCase {
                id,
                sample_path,
                manifest: Arc::clone(&manifest),
            });
        }
        cases
    }

    fn accepts(&self, id: &CaseId) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |re| re.is_match(&id.to_string()))
    }
}

/// Discovers all cases under `root` without a filter.
pub fn discover_cases<P: AsRef<Path>>(root: P) -> Result<Discovery, HarnessError> {
    TestDiscoverer::new().discover(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_name_uses_double_colon_form() {
        let id = CaseId {
            manifest_path: PathBuf::from("/t/foo/test.yml"),
            test_name: "Foo".into(),
            platform: "linux".into(),
            arch: "x86".into(),
        };
        assert_eq!(id.name(), "Foo::linux::x86");
        assert_eq!(id.to_string(), "/t/foo/test.yml::Foo::linux::x86");
    }

    #[test]
    fn same_name_in_different_manifests_differs() {
        let a = CaseId {
            manifest_path: PathBuf::from("a/test.yml"),
            test_name: "Foo".into(),
            platform: "linux".into(),
            arch: "x86".into(),
        };
        let b = CaseId {
            manifest_path: PathBuf::from("b/test.yml"),
            ..a.clone()
        };
        assert_eq!(a.name(), b.name());
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn bad_filter_is_a_config_error() {
        let err = TestDiscoverer::new().with_filter("(").unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::Config);
    }
}
