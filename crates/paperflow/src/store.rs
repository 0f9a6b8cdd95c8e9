//! Persistence contracts consumed by the pipeline.
//!
//! The pipeline only talks to these traits. [`crate::db::Database`] provides
//! the SQLite implementation; tests are free to supply their own.

use thiserror::Error;

use crate::document::{Document, DocumentStatus, Metadata, Tag};
use crate::pipeline::step::{ProcessItem, ProcessStep};
use crate::rules::{AutoMatchValue, Rule};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(#[from] crate::error::RuleError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable per-step job records.
pub trait JobStore: Send + Sync {
    /// Records a pending job for every pipeline step of a new document.
    fn add_document(&self, document_id: &str) -> StoreResult<()>;

    /// Pending jobs of one document, in pipeline order.
    fn get_document_pending_steps(&self, document_id: &str) -> StoreResult<Vec<ProcessItem>>;

    /// Marks the job `running` and stamps `started_at`.
    fn start_process_item(&self, item: &ProcessItem) -> StoreResult<()>;

    /// Marks the job `finished` or `failed` and stamps `stopped_at`.
    fn mark_processing_done(
        &self,
        item: &ProcessItem,
        succeeded: bool,
        message: Option<&str>,
    ) -> StoreResult<()>;

    /// Deletes the job record.
    fn clear_process_item(&self, item: &ProcessItem) -> StoreResult<()>;

    /// Puts the job back to `pending`, keeping its message.
    fn requeue_process_item(&self, item: &ProcessItem) -> StoreResult<()>;

    /// Resets every `running` job to `pending`. Returns the number reset.
    fn cancel_running_processes(&self) -> StoreResult<usize>;

    /// Distinct ids of documents with pending jobs, oldest first.
    fn get_documents_pending_processing(&self, limit: usize) -> StoreResult<Vec<String>>;

    /// Schedules `from` and every later step, replacing existing records.
    fn force_process_document(&self, document_id: &str, from: ProcessStep) -> StoreResult<()>;

    /// Deletes every job record of the document.
    fn cancel_document_processing(&self, document_id: &str) -> StoreResult<()>;
}

pub trait DocumentStore: Send + Sync {
    /// Loads the document without metadata or tags.
    fn get_document(&self, document_id: &str) -> StoreResult<Document>;

    /// Writes every scalar field of the document.
    fn update(&self, document: &Document) -> StoreResult<()>;

    /// Writes the scalar fields and replaces the document's metadata pairs
    /// as one batch. Either both are stored or neither is.
    fn update_with_metadata(&self, document: &Document) -> StoreResult<()>;

    fn set_document_content(&self, document_id: &str, content: &str) -> StoreResult<()>;

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> StoreResult<()>;
}

pub trait MetadataStore: Send + Sync {
    fn get_document_metadata(&self, document_id: &str) -> StoreResult<Vec<Metadata>>;

    fn get_document_tags(&self, document_id: &str) -> StoreResult<Vec<Tag>>;

    /// Metadata values of the user flagged for automatic matching.
    fn get_auto_match_values(&self, user_id: i64) -> StoreResult<Vec<AutoMatchValue>>;

    /// Replaces the document's key/value pairs in one batch.
    fn update_document_metadata(&self, document_id: &str, metadata: &[Metadata])
        -> StoreResult<()>;
}

pub trait RuleStore: Send + Sync {
    /// Enabled rules of the user, ordered by priority.
    fn get_active_user_rules(&self, user_id: i64) -> StoreResult<Vec<Rule>>;
}
