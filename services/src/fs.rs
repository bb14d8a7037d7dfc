//! Tolerant file reading for the review pipeline.
//!
//! Source files under review may be binary, mis-encoded or deleted between
//! diff collection and context assembly. The pipeline must keep going, so
//! every read degrades gracefully and reports through the fallback tracker.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::json;

use crate::fallback::record_fallback;

/// Bytes inspected when probing for binary content.
const BINARY_PROBE_BYTES: usize = 4096;

/// Read a file into lines without trailing newlines.
///
/// Missing files, binary files (NUL byte in the first 4 KiB) and unreadable
/// files all yield an empty vec; only the decode path is lossy.
pub fn read_file_lines(path: &Path) -> Vec<String> {
    if !path.exists() {
        return Vec::new();
    }

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            record_fallback(
                "file_read_failed",
                "failed to read file, skipping",
                Some(json!({ "path": path.display().to_string(), "error": err.to_string() })),
            );
            return Vec::new();
        }
    };

    if bytes[..bytes.len().min(BINARY_PROBE_BYTES)].contains(&0) {
        record_fallback(
            "binary_file_skipped",
            "binary file skipped",
            Some(json!({ "path": path.display().to_string() })),
        );
        return Vec::new();
    }

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            record_fallback(
                "io_decode_fallback",
                "non UTF-8 text, decoded lossily",
                Some(json!({ "path": path.display().to_string() })),
            );
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    };

    text.lines().map(str::to_string).collect()
}

/// Strict UTF-8 read that degrades to lossy decoding on failure.
///
/// The caller chooses the tracker key so the session summary can tell decode
/// fallbacks in different stages apart.
pub fn read_text_with_fallback(path: &Path, tracker_key: &str, reason: &str) -> io::Result<String> {
    let bytes = fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            record_fallback(
                tracker_key,
                reason,
                Some(json!({ "path": path.display().to_string() })),
            );
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_file_yields_empty() {
        assert!(read_file_lines(Path::new("/nonexistent/definitely_not_here.rs")).is_empty());
    }

    #[test]
    fn binary_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"elf\x00binary\x00payload").unwrap();
        assert!(read_file_lines(file.path()).is_empty());
    }

    #[test]
    fn text_file_splits_into_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"alpha\nbeta\ngamma\n").unwrap();
        let lines = read_file_lines(file.path());
        assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn invalid_utf8_degrades_to_lossy() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"caf\xe9 latte\n").unwrap();
        let text = read_text_with_fallback(file.path(), "io_decode_fallback", "test").unwrap();
        assert!(text.contains("caf"));
    }
}
