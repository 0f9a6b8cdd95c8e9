//! Test harness for isolated pipeline runs.
//!
//! `TestHarness` owns a temporary data directory, an in-memory database and
//! a recording search index, and builds pipelines wired to them.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use paperflow::config::Config;
use paperflow::db::{document_repo, job_repo};
use paperflow::pipeline::{JobStatus, ProcessItem};
use paperflow::processor::{ExtractorRegistry, TextExtractor};
use paperflow::storage::FileStorage;
use paperflow::{BroadcastProgress, Database, Document, DocumentPipeline, PipelineStores};

use super::builders::{FixedLanguage, RecordingIndex, USER_ID};

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where uploaded source files are written before import.
    pub upload_dir: PathBuf,
    pub config: Config,
    pub db: Database,
    pub storage: FileStorage,
    pub search: Arc<RecordingIndex>,
    pub progress: BroadcastProgress,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let upload_dir = temp_dir.path().join("uploads");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&upload_dir).expect("Failed to create upload dir");
        std::fs::create_dir_all(&data_dir).expect("Failed to create data dir");

        let mut config = Config::new(data_dir.to_string_lossy());
        config.ocr.enabled = false;
        config.processing = super::builders::processing_config(2, 2);

        Self {
            storage: FileStorage::new(&data_dir),
            db: Database::open_in_memory().expect("Failed to open database"),
            search: Arc::new(RecordingIndex::default()),
            progress: BroadcastProgress::default(),
            upload_dir,
            config,
            temp_dir,
        }
    }

    pub fn stores(&self) -> PipelineStores {
        PipelineStores::from_database(&self.db)
    }

    /// Pipeline with text extraction only and a fixed language answer.
    pub fn pipeline(&self) -> DocumentPipeline {
        let mut extractors = ExtractorRegistry::empty();
        extractors.register(Box::new(TextExtractor));
        self.pipeline_with(extractors)
    }

    pub fn pipeline_with(&self, extractors: ExtractorRegistry) -> DocumentPipeline {
        self.build_pipeline(self.stores(), extractors)
    }

    /// Default pipeline over the given stores, for injecting store faults.
    pub fn pipeline_with_stores(&self, stores: PipelineStores) -> DocumentPipeline {
        let mut extractors = ExtractorRegistry::empty();
        extractors.register(Box::new(TextExtractor));
        self.build_pipeline(stores, extractors)
    }

    fn build_pipeline(
        &self,
        stores: PipelineStores,
        extractors: ExtractorRegistry,
    ) -> DocumentPipeline {
        DocumentPipeline::from_config(
            &self.config,
            stores,
            self.search.clone(),
            Arc::new(self.progress.clone()),
        )
        .with_extractors(extractors)
        .with_language_identifier(Arc::new(FixedLanguage("eng")))
    }

    /// Writes `content` as an upload, imports it and queues every step.
    pub fn upload_text(&self, filename: &str, content: &str) -> Document {
        let source = self.upload_dir.join(filename);
        std::fs::write(&source, content).expect("Failed to write upload");

        let mut document = Document::new(USER_ID, filename, "text/plain");
        self.storage
            .import(&source, &mut document)
            .expect("Failed to import upload");
        document_repo::insert(&self.db, &document).expect("Failed to insert document");
        job_repo::add_document(&self.db, &document.id).expect("Failed to queue document");
        document
    }

    pub fn document(&self, id: &str) -> Document {
        document_repo::find_by_id(&self.db, id)
            .expect("Failed to load document")
            .expect("Document not found")
    }

    pub fn jobs(&self, document_id: &str) -> Vec<ProcessItem> {
        job_repo::list_for_document(&self.db, document_id).expect("Failed to list jobs")
    }

    pub fn pending_jobs(&self, document_id: &str) -> Vec<ProcessItem> {
        self.jobs(document_id)
            .into_iter()
            .filter(|item| item.status == JobStatus::Pending)
            .collect()
    }
}
