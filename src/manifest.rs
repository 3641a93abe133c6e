//! Typed model of a `test.yml` manifest.
//!
//! A manifest describes one logical test: which compiled samples exist for
//! which platform/architecture, which decoded strings the author expects, and
//! which combinations are known to fail.
//!
//! ```yaml
//! Test Name: decode-xor
//! Output Files:
//!   linux:
//!     x86: bin/decode-xor.x86
//!     x64: bin/decode-xor.x64
//! Decoded strings: ["secret1", "secret2"]
//! Xfail:
//!   linux-x86: stack layout differs on 32-bit builds
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::diagnostics::HarnessError;

/// Conventional file name of a manifest.
pub const MANIFEST_FILE_NAME: &str = "test.yml";

/// Xfail key that marks every combination of a manifest.
pub const XFAIL_ALL: &str = "all";

const ALL_REASON: &str = "unsupported test case (known issue)";
const COMBINATION_REASON: &str = "unsupported platform&arch test case (known issue)";

/// One parsed and validated manifest. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestManifest {
    #[serde(rename = "Test Name")]
    pub name: String,
    /// platform -> arch -> sample filename, relative to the manifest directory.
    #[serde(rename = "Output Files")]
    pub outputs: BTreeMap<String, BTreeMap<String, PathBuf>>,
    #[serde(rename = "Decoded strings", default, deserialize_with = "null_as_default")]
    pub expected_strings: BTreeSet<String>,
    #[serde(rename = "Xfail", default, deserialize_with = "null_as_default")]
    pub xfail: XfailMarkers,
}

/// Known-failing keys and their optional human-readable reasons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XfailMarkers(BTreeMap<String, Option<String>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawXfail {
    Keyed(BTreeMap<String, serde_yaml::Value>),
    Listed(Vec<String>),
}

impl<'de> Deserialize<'de> for XfailMarkers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let markers = match RawXfail::deserialize(deserializer)? {
            RawXfail::Keyed(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let reason = match value {
                        serde_yaml::Value::String(s) if !s.trim().is_empty() => Some(s),
                        _ => None,
                    };
                    (key, reason)
                })
                .collect(),
            RawXfail::Listed(keys) => keys.into_iter().map(|key| (key, None)).collect(),
        };
        Ok(XfailMarkers(markers))
    }
}

impl XfailMarkers {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn reason(&self, key: &str) -> Option<Option<&str>> {
        self.0.get(key).map(|r| r.as_deref())
    }
}

/// Which xfail marker matched a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XfailKey {
    All,
    Combination { platform: String, arch: String },
}

impl fmt::Display for XfailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XfailKey::All => f.write_str(XFAIL_ALL),
            XfailKey::Combination { platform, arch } => write!(f, "{platform}-{arch}"),
        }
    }
}

/// Why a case is an expected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XfailReason {
    pub key: XfailKey,
    pub message: String,
}

impl fmt::Display for XfailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.key)
    }
}

impl TestManifest {
    /// Parses and validates a manifest from YAML text. `origin` only labels errors.
    pub fn from_yaml_str(source: &str, origin: &Path) -> Result<Self, HarnessError> {
        let manifest: TestManifest = serde_yaml::from_str(source)
            .map_err(|e| HarnessError::malformed(origin, e.to_string()))?;
        manifest.validate(origin)?;
        Ok(manifest)
    }

    fn validate(&self, origin: &Path) -> Result<(), HarnessError> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::malformed(origin, "'Test Name' is empty"));
        }
        if self.outputs.is_empty() {
            return Err(HarnessError::malformed(origin, "'Output Files' is empty"));
        }
        for (platform, archs) in &self.outputs {
            if archs.is_empty() {
                return Err(HarnessError::malformed(
                    origin,
                    format!("platform '{platform}' lists no architectures"),
                ));
            }
            for (arch, file) in archs {
                if file.as_os_str().is_empty() {
                    return Err(HarnessError::malformed(
                        origin,
                        format!("empty output file for {platform}-{arch}"),
                    ));
                }
                if file.is_absolute() {
                    return Err(HarnessError::malformed(
                        origin,
                        format!(
                            "output file for {platform}-{arch} must be relative, got '{}'",
                            file.display()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Every `(platform, arch, file)` triple in stable (sorted) order.
    pub fn combinations(&self) -> impl Iterator<Item = (&str, &str, &Path)> {
        self.outputs.iter().flat_map(|(platform, archs)| {
            archs
                .iter()
                .map(move |(arch, file)| (platform.as_str(), arch.as_str(), file.as_path()))
        })
    }

    /// The xfail marker applying to `platform`/`arch`, if any. `all` wins over
    /// a combination-specific key.
    pub fn xfail_reason(&self, platform: &str, arch: &str) -> Option<XfailReason> {
        if let Some(reason) = self.xfail.reason(XFAIL_ALL) {
            return Some(XfailReason {
                key: XfailKey::All,
                message: reason.unwrap_or(ALL_REASON).to_string(),
            });
        }
        let combination = format!("{platform}-{arch}");
        self.xfail.reason(&combination).map(|reason| XfailReason {
            key: XfailKey::Combination {
                platform: platform.to_string(),
                arch: arch.to_string(),
            },
            message: reason.unwrap_or(COMBINATION_REASON).to_string(),
        })
    }
}

/// Reads and parses the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<TestManifest, HarnessError> {
    let source = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    TestManifest::from_yaml_str(&source, path)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorKind;

    fn parse(src: &str) -> Result<TestManifest, HarnessError> {
        TestManifest::from_yaml_str(src, Path::new("suite/test.yml"))
    }

    #[test]
    fn parses_full_manifest() {
        let manifest = parse(
            r#"
Test Name: decode-xor
Output Files:
  linux:
    x86: bin/a.x86
    x64: bin/a.x64
  windows:
    x86: a.exe
Decoded strings: ["secret1", "secret2"]
Xfail:
  linux-x86: true
"#,
        )
        .unwrap();
        assert_eq!(manifest.name, "decode-xor");
        assert_eq!(manifest.outputs.len(), 2);
        assert_eq!(
            manifest.expected_strings,
            BTreeSet::from(["secret1".to_string(), "secret2".to_string()])
        );
        assert!(manifest.xfail.contains("linux-x86"));
        let combos: Vec<_> = manifest.combinations().map(|(p, a, _)| (p, a)).collect();
        assert_eq!(
            combos,
            vec![("linux", "x64"), ("linux", "x86"), ("windows", "x86")]
        );
    }

    #[test]
    fn optional_sections_default_to_empty() {
        let manifest = parse(
            "Test Name: t\nOutput Files:\n  linux:\n    x86: s\nDecoded strings:\nXfail:\n",
        )
        .unwrap();
        assert!(manifest.expected_strings.is_empty());
        assert!(manifest.xfail.is_empty());
        assert_eq!(manifest.xfail_reason("linux", "x86"), None);
    }

    #[test]
    fn missing_name_is_malformed() {
        let err = parse("Output Files:\n  linux:\n    x86: s\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedManifest);
        assert!(err.to_string().contains("Test Name"));
    }

    #[test]
    fn missing_outputs_is_malformed() {
        let err = parse("Test Name: t\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedManifest);
        assert!(err.to_string().contains("Output Files"));
    }

    #[test]
    fn wrongly_shaped_outputs_are_malformed() {
        let err = parse("Test Name: t\nOutput Files: [a, b]\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedManifest);
    }

    #[test]
    fn empty_outputs_are_malformed() {
        let err = parse("Test Name: t\nOutput Files: {}\n").unwrap_err();
        assert!(err.to_string().contains("'Output Files' is empty"));
    }

    #[test]
    fn absolute_output_path_is_malformed() {
        let err = parse("Test Name: t\nOutput Files:\n  linux:\n    x86: /etc/passwd\n").unwrap_err();
        assert!(err.to_string().contains("must be relative"));
    }

    #[test]
    fn xfail_all_takes_precedence() {
        let manifest = parse(
            "Test Name: t\nOutput Files:\n  linux:\n    x86: s\nXfail:\n  all: true\n  linux-x86: true\n",
        )
        .unwrap();
        let reason = manifest.xfail_reason("linux", "x86").unwrap();
        assert_eq!(reason.key, XfailKey::All);
        assert_eq!(reason.message, ALL_REASON);
    }

    #[test]
    fn xfail_combination_only_matches_its_pair() {
        let manifest = parse(
            "Test Name: t\nOutput Files:\n  linux:\n    x86: a\n    x64: b\nXfail:\n  linux-x86: flaky on i386\n",
        )
        .unwrap();
        let reason = manifest.xfail_reason("linux", "x86").unwrap();
        assert_eq!(reason.message, "flaky on i386");
        assert_eq!(reason.key.to_string(), "linux-x86");
        assert_eq!(manifest.xfail_reason("linux", "x64"), None);
    }

    #[test]
    fn xfail_may_be_a_list_of_keys() {
        let manifest =
            parse("Test Name: t\nOutput Files:\n  linux:\n    x86: a\nXfail: [all]\n").unwrap();
        assert!(manifest.xfail_reason("linux", "x86").is_some());
    }
}
