//! Ground truth embedded at the tail of a sample file.
//!
//! A sample may carry its own expectations so large corpora can describe
//! themselves without editing manifests. The default layout read by
//! [`TrailerFooterReader`] is:
//!
//! ```text
//! <sample bytes> FOOTER_BEGIN <YAML: category -> [strings]> FOOTER_END
//! ```
//!
//! `FOOTER_END` must be the last bytes of the file. Only the `"all"` category
//! is consumed by the harness; other categories are carried through untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::diagnostics::HarnessError;

pub const FOOTER_BEGIN: &[u8] = b"\n=== BEGIN DECODED STRINGS ===\n";
pub const FOOTER_END: &[u8] = b"\n=== END DECODED STRINGS ===\n";

/// Category holding every string the sample is known to hide.
pub const FOOTER_ALL: &str = "all";

/// Decoded footer: category -> strings.
pub type Footer = BTreeMap<String, BTreeSet<String>>;

/// Boundary to whatever knows how to find ground truth inside a sample.
pub trait FooterReader: Send + Sync {
    fn has_footer(&self, path: &Path) -> Result<bool, HarnessError>;
    fn read_footer(&self, path: &Path) -> Result<Footer, HarnessError>;
}

/// Reads the marker-delimited YAML trailer described in the module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrailerFooterReader;

impl FooterReader for TrailerFooterReader {
    fn has_footer(&self, path: &Path) -> Result<bool, HarnessError> {
        let mut file = File::open(path).map_err(|e| HarnessError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| HarnessError::io(path, e))?
            .len();
        let marker_len = FOOTER_END.len() as u64;
        if len < marker_len {
            return Ok(false);
        }
        let mut tail = vec![0u8; FOOTER_END.len()];
        file.seek(SeekFrom::Start(len - marker_len))
            .and_then(|_| file.read_exact(&mut tail))
            .map_err(|e| HarnessError::io(path, e))?;
        Ok(tail == FOOTER_END)
    }

    fn read_footer(&self, path: &Path) -> Result<Footer, HarnessError> {
        let bytes = fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        decode_footer(&bytes).map_err(|reason| HarnessError::footer(path, reason))
    }
}

fn decode_footer(bytes: &[u8]) -> Result<Footer, String> {
    let body_end = bytes
        .len()
        .checked_sub(FOOTER_END.len())
        .filter(|&at| &bytes[at..] == FOOTER_END)
        .ok_or("missing end marker")?;
    let begin = rfind(&bytes[..body_end], FOOTER_BEGIN).ok_or("missing begin marker")?;
    let payload = std::str::from_utf8(&bytes[begin + FOOTER_BEGIN.len()..body_end])
        .map_err(|e| format!("payload is not UTF-8: {e}"))?;
    if payload.trim().is_empty() {
        return Ok(Footer::new());
    }
    let raw: BTreeMap<String, Option<Vec<String>>> =
        serde_yaml::from_str(payload).map_err(|e| format!("payload is not a category map: {e}"))?;
    Ok(raw
        .into_iter()
        .map(|(category, strings)| (category, strings.unwrap_or_default().into_iter().collect()))
        .collect())
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Serializes `footer` into the trailer layout, ready to append to a sample.
pub fn encode_footer(footer: &Footer) -> Result<Vec<u8>, HarnessError> {
    let payload = serde_yaml::to_string(footer)
        .map_err(|e| HarnessError::config(format!("cannot encode footer: {e}")))?;
    let mut out = Vec::with_capacity(FOOTER_BEGIN.len() + payload.len() + FOOTER_END.len());
    out.extend_from_slice(FOOTER_BEGIN);
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(FOOTER_END);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn footer_of(strings: &[&str]) -> Footer {
        Footer::from([(
            FOOTER_ALL.to_string(),
            strings.iter().map(|s| s.to_string()).collect(),
        )])
    }

    fn sample_with(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn reads_back_appended_footer() {
        let mut bytes = b"MZ\x90\x00binary body".to_vec();
        bytes.extend(encode_footer(&footer_of(&["hello", "world"])).unwrap());
        let sample = sample_with(&bytes);

        let reader = TrailerFooterReader;
        assert!(reader.has_footer(sample.path()).unwrap());
        let footer = reader.read_footer(sample.path()).unwrap();
        assert_eq!(footer, footer_of(&["hello", "world"]));
    }

    #[test]
    fn plain_sample_has_no_footer() {
        let sample = sample_with(b"\x7fELF plain binary");
        assert!(!TrailerFooterReader.has_footer(sample.path()).unwrap());
    }

    #[test]
    fn tiny_sample_has_no_footer() {
        let sample = sample_with(b"");
        assert!(!TrailerFooterReader.has_footer(sample.path()).unwrap());
    }

    #[test]
    fn end_marker_without_begin_is_a_footer_error() {
        let mut bytes = b"body".to_vec();
        bytes.extend_from_slice(FOOTER_END);
        let sample = sample_with(&bytes);
        let err = TrailerFooterReader.read_footer(sample.path()).unwrap_err();
        assert!(err.to_string().contains("missing begin marker"));
    }

    #[test]
    fn empty_category_reads_as_empty_set() {
        let mut bytes = FOOTER_BEGIN.to_vec();
        bytes.extend_from_slice(b"all:\nstack: [abc]\n");
        bytes.extend_from_slice(FOOTER_END);
        let footer = decode_footer(&bytes).unwrap();
        assert!(footer[FOOTER_ALL].is_empty());
        assert!(footer["stack"].contains("abc"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TrailerFooterReader
            .has_footer(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::diagnostics::ErrorKind::Io);
    }
}
