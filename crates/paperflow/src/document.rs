//! Document snapshot as seen by the processing pipeline.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "error" => Ok(DocumentStatus::Error),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

/// One key/value pair attached to a document.
///
/// Ids are authoritative; `key` and `value` are display names and may be
/// empty for entries added by rule actions before persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub key_id: i64,
    pub key: String,
    pub value_id: i64,
    pub value: String,
}

impl Metadata {
    pub fn new(key_id: i64, value_id: i64) -> Self {
        Self {
            key_id,
            value_id,
            ..Default::default()
        }
    }

    pub fn named(key_id: i64, key: &str, value_id: i64, value: &str) -> Self {
        Self {
            key_id,
            key: key.to_string(),
            value_id,
            value: value.to_string(),
        }
    }

    pub fn same_entry(&self, other: &Metadata) -> bool {
        self.key_id == other.key_id && self.value_id == other.value_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub content: String,
    /// Original filename as uploaded. Its extension names the stored file.
    pub filename: String,
    pub hash: String,
    pub mimetype: String,
    pub size: i64,
    pub date: DateTime<Utc>,
    pub lang: String,
    pub status: DocumentStatus,
    /// `None` until hydrated from the metadata store.
    pub metadata: Option<Vec<Metadata>>,
    /// `None` until hydrated from the metadata store.
    pub tags: Option<Vec<Tag>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new document record for an uploaded file. An empty
    /// mimetype is guessed from the filename.
    pub fn new(user_id: i64, filename: &str, mimetype: &str) -> Self {
        let now = Utc::now();
        let mimetype = if mimetype.is_empty() {
            mime_guess::from_path(filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        } else {
            mimetype.to_string()
        };
        let name = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            name,
            description: String::new(),
            content: String::new(),
            filename: filename.to_string(),
            hash: String::new(),
            mimetype,
            size: 0,
            date: now,
            lang: String::new(),
            status: DocumentStatus::Processing,
            metadata: None,
            tags: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lowercased extension of the original filename, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Metadata entries, or an empty slice when not hydrated.
    pub fn metadata(&self) -> &[Metadata] {
        self.metadata.as_deref().unwrap_or(&[])
    }

    pub fn has_metadata(&self, entry: &Metadata) -> bool {
        self.metadata().iter().any(|m| m.same_entry(entry))
    }

    /// Adds the entry unless an identical key/value pair is already present.
    /// Returns true if the entry was added.
    pub fn add_metadata(&mut self, entry: Metadata) -> bool {
        if self.has_metadata(&entry) {
            return false;
        }
        self.metadata.get_or_insert_with(Vec::new).push(entry);
        true
    }

    /// Removes every entry with the given key and value. Returns the number removed.
    pub fn remove_metadata(&mut self, key_id: i64, value_id: i64) -> usize {
        let Some(metadata) = self.metadata.as_mut() else {
            return 0;
        };
        let before = metadata.len();
        metadata.retain(|m| !(m.key_id == key_id && m.value_id == value_id));
        before - metadata.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_defaults() {
        let doc = Document::new(1, "invoice-2024.pdf", "application/pdf");
        assert!(!doc.id.is_empty());
        assert_eq!(doc.name, "invoice-2024");
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert!(doc.metadata.is_none());
        assert_eq!(doc.extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn test_missing_mimetype_is_guessed() {
        assert_eq!(Document::new(1, "scan.PNG", "").mimetype, "image/png");
        assert_eq!(Document::new(1, "notes.txt", "").mimetype, "text/plain");
        assert_eq!(
            Document::new(1, "blob", "").mimetype,
            "application/octet-stream"
        );
        assert_eq!(Document::new(1, "a.txt", "text/markdown").mimetype, "text/markdown");
    }

    #[test]
    fn test_add_metadata_deduplicates() {
        let mut doc = Document::new(1, "a.txt", "text/plain");
        assert!(doc.add_metadata(Metadata::new(1, 10)));
        assert!(!doc.add_metadata(Metadata::named(1, "author", 10, "doe")));
        assert!(doc.add_metadata(Metadata::new(1, 11)));
        assert_eq!(doc.metadata().len(), 2);
    }

    #[test]
    fn test_remove_metadata() {
        let mut doc = Document::new(1, "a.txt", "text/plain");
        assert_eq!(doc.remove_metadata(1, 10), 0);
        doc.add_metadata(Metadata::new(1, 10));
        doc.add_metadata(Metadata::new(2, 20));
        assert_eq!(doc.remove_metadata(1, 10), 1);
        assert_eq!(doc.metadata().len(), 1);
        assert_eq!(doc.metadata()[0].key_id, 2);
    }

    #[test]
    fn test_status_round_trip_from_str() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<DocumentStatus>().is_err());
    }
}
