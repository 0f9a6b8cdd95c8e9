use std::path::Path;

use crate::error::ProcessError;
use crate::processor::ContentExtractor;

/// Structured formats that are readable as plain text.
const TEXTUAL_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/csv",
    "application/x-yaml",
    "application/toml",
];

/// Reads the file directly. Invalid UTF-8 is replaced rather than rejected.
#[derive(Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentExtractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, mimetype: &str) -> bool {
        mimetype.starts_with("text/") || TEXTUAL_APPLICATION_TYPES.contains(&mimetype)
    }

    fn extract(&self, path: &Path, _mimetype: &str, _scratch: &Path) -> Result<String, ProcessError> {
        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_textual_types() {
        let e = TextExtractor::new();
        assert!(e.supports("text/plain"));
        assert!(e.supports("text/csv"));
        assert!(e.supports("application/json"));
        assert!(!e.supports("application/pdf"));
        assert!(!e.supports("image/png"));
    }

    #[test]
    fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "Invoice 2024-001\nTotal: 42").unwrap();

        let text = TextExtractor::new()
            .extract(&path, "text/plain", dir.path())
            .unwrap();
        assert_eq!(text, "Invoice 2024-001\nTotal: 42");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();

        let text = TextExtractor::new()
            .extract(&path, "text/plain", dir.path())
            .unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TextExtractor::new().extract(Path::new("/nonexistent/a.txt"), "text/plain", dir.path()),
            Err(ProcessError::ReadDocument { .. })
        ));
    }
}
