//! Search index publication.
//!
//! The pipeline only needs "index these documents". [`HttpSearchIndex`]
//! pushes them to a Meilisearch-compatible document endpoint; [`NullIndex`]
//! is used when no search service is configured.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::SearchConfig;
use crate::document::Document;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Cannot reach search service at {0}")]
    Connection(String),

    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search service returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Flattened document as sent to the search service.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchDocument {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub content: String,
    pub filename: String,
    pub mimetype: String,
    pub lang: String,
    /// Unix seconds, for range filters.
    pub date: i64,
    /// `key:value` pairs.
    pub metadata: Vec<String>,
    pub tags: Vec<String>,
}

impl From<&Document> for SearchDocument {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            user_id: doc.user_id,
            name: doc.name.clone(),
            description: doc.description.clone(),
            content: doc.content.clone(),
            filename: doc.filename.clone(),
            mimetype: doc.mimetype.clone(),
            lang: doc.lang.clone(),
            date: doc.date.timestamp(),
            metadata: doc
                .metadata()
                .iter()
                .map(|m| format!("{}:{}", m.key, m.value))
                .collect(),
            tags: doc
                .tags
                .as_deref()
                .unwrap_or(&[])
                .iter()
                .map(|t| t.key.clone())
                .collect(),
        }
    }
}

pub trait SearchIndex: Send + Sync {
    /// Adds or replaces the documents in the index.
    fn index_documents(&self, documents: &[Document]) -> Result<(), SearchError>;
}

/// Accepts every document and indexes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndex;

impl SearchIndex for NullIndex {
    fn index_documents(&self, documents: &[Document]) -> Result<(), SearchError> {
        tracing::trace!(count = documents.len(), "Search disabled, skipping indexing");
        Ok(())
    }
}

pub struct HttpSearchIndex {
    base_url: String,
    index: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpSearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::Client(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            client,
        })
    }

    fn documents_url(&self) -> String {
        format!("{}/indexes/{}/documents", self.base_url, self.index)
    }
}

impl SearchIndex for HttpSearchIndex {
    fn index_documents(&self, documents: &[Document]) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }

        let body: Vec<SearchDocument> = documents.iter().map(SearchDocument::from).collect();
        let mut request = self
            .client
            .post(format!("{}?primaryKey=id", self.documents_url()))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                SearchError::Connection(self.base_url.clone())
            } else {
                SearchError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SearchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(count = documents.len(), index = %self.index, "Indexed documents");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Metadata, Tag};

    #[test]
    fn test_search_document_flattens_metadata_and_tags() {
        let mut doc = Document::new(3, "bill.pdf", "application/pdf");
        doc.metadata = Some(vec![Metadata::named(1, "vendor", 2, "ACME")]);
        doc.tags = Some(vec![Tag {
            id: 1,
            key: "finance".to_string(),
        }]);

        let flat = SearchDocument::from(&doc);
        assert_eq!(flat.user_id, 3);
        assert_eq!(flat.metadata, vec!["vendor:ACME".to_string()]);
        assert_eq!(flat.tags, vec!["finance".to_string()]);
    }

    #[test]
    fn test_documents_url() {
        let index = HttpSearchIndex::new(&SearchConfig {
            url: "http://localhost:7700/".to_string(),
            index: "documents".to_string(),
            api_key: Some(String::new()),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            index.documents_url(),
            "http://localhost:7700/indexes/documents/documents"
        );
        assert!(index.api_key.is_none());
    }

    #[test]
    fn test_unreachable_service_is_error() {
        let index = HttpSearchIndex::new(&SearchConfig {
            url: "http://127.0.0.1:9".to_string(),
            index: "documents".to_string(),
            api_key: None,
            timeout_secs: 2,
        })
        .unwrap();
        let doc = Document::new(1, "a.txt", "text/plain");
        assert!(index.index_documents(&[doc]).is_err());
    }
}
