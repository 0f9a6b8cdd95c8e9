use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::config::Config;
use crate::db::Database;
use crate::document::{Document, DocumentStatus};
use crate::language::{clean_text, LanguageIdentifier, WhatlangIdentifier};
use crate::processor::{normalize_text, ExtractorRegistry, PdfTools};
use crate::rules::{apply_auto_matching, RuleEngine};
use crate::sanitize;
use crate::search::SearchIndex;
use crate::storage::{hash_file, FileStorage};
use crate::store::{DocumentStore, JobStore, MetadataStore, RuleStore};
use crate::thumbnail::Thumbnailer;
use crate::worker::{DocumentHandler, DocumentOutcome};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{ProcessingEvent, ProgressReporter};
use super::step::{ProcessItem, ProcessStep, RetryPolicy};

/// Name prefix of documents taken out of processing after a fault.
pub const PROCESSING_ERROR_PREFIX: &str = "[processing error] ";

/// Persistence collaborators of the pipeline.
#[derive(Clone)]
pub struct PipelineStores {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub rules: Arc<dyn RuleStore>,
}

impl PipelineStores {
    /// Every store backed by the same SQLite database.
    pub fn from_database(db: &Database) -> Self {
        Self {
            jobs: Arc::new(db.clone()),
            documents: Arc::new(db.clone()),
            metadata: Arc::new(db.clone()),
            rules: Arc::new(db.clone()),
        }
    }
}

/// Runs the pending steps of one document at a time.
pub struct DocumentPipeline {
    config: PipelineConfig,
    stores: PipelineStores,
    search: Arc<dyn SearchIndex>,
    progress: Arc<dyn ProgressReporter>,
    extractors: ExtractorRegistry,
    thumbnailer: Thumbnailer,
    language: Arc<dyn LanguageIdentifier>,
    engine: RuleEngine,
    storage: FileStorage,
}

impl DocumentPipeline {
    /// Production constructor; builds extractors and tools from config.
    pub fn from_config(
        config: &Config,
        stores: PipelineStores,
        search: Arc<dyn SearchIndex>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        let pipeline_config = PipelineConfig::from_config(config);
        let pdf_tools = PdfTools::new(&config.tools.pdftoppm, &config.tools.pdfinfo);

        Self {
            storage: FileStorage::new(&pipeline_config.data_directory),
            thumbnailer: Thumbnailer::new(pdf_tools, pipeline_config.thumbnail_width),
            extractors: ExtractorRegistry::new(config),
            language: Arc::new(WhatlangIdentifier::new()),
            engine: RuleEngine::new(),
            config: pipeline_config,
            stores,
            search,
            progress,
        }
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_language_identifier(mut self, language: Arc<dyn LanguageIdentifier>) -> Self {
        self.language = language;
        self
    }

    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    fn run(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError> {
        let jobs = &self.stores.jobs;
        let mut document = self.stores.documents.get_document(document_id)?;
        let pending = jobs.get_document_pending_steps(document_id)?;

        let scratch = tempfile::Builder::new()
            .prefix("paperflow-")
            .tempdir()
            .map_err(|e| PipelineError::Scratch {
                path: std::env::temp_dir(),
                source: e,
            })?;

        for item in pending {
            if let Some(reason) = self.run_item(&item, &mut document, scratch.path())? {
                self.progress
                    .report(ProcessingEvent::document_finished(document_id, false));
                return Ok(DocumentOutcome::Deferred {
                    step: item.step,
                    reason,
                });
            }
        }

        if jobs.get_document_pending_steps(document_id)?.is_empty() {
            self.stores
                .documents
                .set_status(document_id, DocumentStatus::Ready)?;
            info!("Document ready");
        }

        self.progress
            .report(ProcessingEvent::document_finished(document_id, true));
        Ok(DocumentOutcome::Completed)
    }

    /// Runs one step under its job record. Returns the failure message when
    /// a mandatory step failed and processing of the document must stop.
    fn run_item(
        &self,
        item: &ProcessItem,
        document: &mut Document,
        scratch: &Path,
    ) -> Result<Option<String>, PipelineError> {
        let jobs = &self.stores.jobs;
        let _step_span = info_span!("step", step = %item.step).entered();

        jobs.start_process_item(item)?;
        self.progress
            .report(ProcessingEvent::step_started(&document.id, item.step));

        let message = match self.run_step(item.step, document, scratch) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Step failed");
                Some(e.to_string())
            }
        };

        if let Err(e) = jobs.mark_processing_done(item, message.is_none(), message.as_deref()) {
            // Leave the row pending instead of running until the next restart.
            error!(error = %e, "Failed to record step result");
            jobs.requeue_process_item(item)?;
            let reason = format!("failed to record step result: {}", e);
            self.progress.report(ProcessingEvent::step_finished(
                &document.id,
                item.step,
                Some(reason.as_str()),
            ));
            return Ok(Some(reason));
        }
        self.progress.report(ProcessingEvent::step_finished(
            &document.id,
            item.step,
            message.as_deref(),
        ));

        match (item.step.retry_policy(), message) {
            (RetryPolicy::Mandatory, Some(message)) => {
                jobs.requeue_process_item(item)?;
                Ok(Some(message))
            }
            _ => {
                jobs.clear_process_item(item)?;
                Ok(None)
            }
        }
    }

    fn run_step(
        &self,
        step: ProcessStep,
        document: &mut Document,
        scratch: &Path,
    ) -> Result<(), PipelineError> {
        match step {
            ProcessStep::Hash => self.step_hash(document),
            ProcessStep::Thumbnail => self.step_thumbnail(document, scratch),
            ProcessStep::ParseContent => self.step_parse_content(document, scratch),
            ProcessStep::DetectLanguage => self.step_detect_language(document),
            ProcessStep::Rules => self.step_rules(document),
            ProcessStep::FtsIndex => self.step_fts_index(document),
        }
    }

    fn step_hash(&self, document: &mut Document) -> Result<(), PipelineError> {
        let path = self.storage.document_path(document)?;
        let hash = hash_file(&path)?;
        if hash == document.hash {
            debug!("Content hash unchanged");
            return Ok(());
        }

        let stored = self.storage.relocate(document, &hash)?;
        debug!(file = %sanitize::redact_path(&stored), "Moved to content address");

        let mut hashed = document.clone();
        hashed.hash = hash;
        if let Ok(meta) = std::fs::metadata(&stored) {
            hashed.size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
        }
        if let Err(e) = self.stores.documents.update(&hashed) {
            // The row still points at the old path; put the file back there.
            if let Err(restore) = self.storage.restore(document, &hashed.hash) {
                error!(error = %restore, "Failed to restore file after update error");
            }
            return Err(e.into());
        }
        *document = hashed;
        Ok(())
    }

    fn step_thumbnail(&self, document: &Document, scratch: &Path) -> Result<(), PipelineError> {
        if !Thumbnailer::supports(&document.mimetype) {
            debug!(mimetype = %document.mimetype, "No preview for mimetype");
            return Ok(());
        }

        let source = self.storage.document_path(document)?;
        let target = self.storage.thumbnail_path(&document.hash)?;
        self.thumbnailer
            .generate(&source, &document.mimetype, &target, scratch)?;
        Ok(())
    }

    fn step_parse_content(
        &self,
        document: &mut Document,
        scratch: &Path,
    ) -> Result<(), PipelineError> {
        let path = self.storage.document_path(document)?;
        let raw = self.extractors.extract(&path, &document.mimetype, scratch)?;
        let content = normalize_text(&raw);
        if content.is_empty() {
            warn!(mimetype = %document.mimetype, "No text content extracted");
        }

        self.stores
            .documents
            .set_document_content(&document.id, &content)?;
        document.content = content;
        Ok(())
    }

    fn step_detect_language(&self, document: &mut Document) -> Result<(), PipelineError> {
        if !self.config.language_enabled {
            return Ok(());
        }

        let sample = clean_text(&document.content, self.config.language_max_chars);
        if sample.is_empty() {
            debug!("No text to identify language from");
            return Ok(());
        }

        match self.language.identify(&sample) {
            Some(lang) => {
                debug!(lang = %lang, "Detected language");
                document.lang = lang;
                self.stores.documents.update(document)?;
            }
            None => debug!("Language not identified"),
        }
        Ok(())
    }

    fn step_rules(&self, document: &mut Document) -> Result<(), PipelineError> {
        let rules = self.stores.rules.get_active_user_rules(document.user_id)?;

        let mut updated = document.clone();
        updated.metadata = Some(self.stores.metadata.get_document_metadata(&updated.id)?);
        let auto_values = self.stores.metadata.get_auto_match_values(updated.user_id)?;
        let attached = apply_auto_matching(&mut updated, &auto_values);
        if attached > 0 {
            debug!(attached, "Auto-matched metadata values");
        }

        for rule in &rules {
            let evaluation = self.engine.evaluate(rule, &updated);
            debug!(rule_id = rule.id, matched = evaluation.matched, "Applied rule");
            updated = evaluation.document;
        }

        // Later steps only see the rule results once they are stored.
        self.stores.documents.update_with_metadata(&updated)?;
        *document = updated;
        Ok(())
    }

    fn step_fts_index(&self, document: &mut Document) -> Result<(), PipelineError> {
        if document.metadata.is_none() {
            document.metadata = Some(self.stores.metadata.get_document_metadata(&document.id)?);
        }
        if document.tags.is_none() {
            document.tags = Some(self.stores.metadata.get_document_tags(&document.id)?);
        }

        self.search.index_documents(std::slice::from_ref(document))?;
        Ok(())
    }
}

impl DocumentHandler for DocumentPipeline {
    fn process_document(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError> {
        let _span = info_span!("document", document_id = %document_id).entered();
        self.run(document_id)
    }

    fn quarantine(&self, document_id: &str, reason: &str) -> Result<(), PipelineError> {
        self.stores.jobs.cancel_document_processing(document_id)?;

        let mut document = self.stores.documents.get_document(document_id)?;
        if !document.name.starts_with(PROCESSING_ERROR_PREFIX) {
            document.name = format!("{}{}", PROCESSING_ERROR_PREFIX, document.name);
        }
        if document.description.is_empty() {
            document.description = reason.to_string();
        } else {
            document.description = format!("{}\n\n{}", document.description, reason);
        }
        document.status = DocumentStatus::Error;
        self.stores.documents.update(&document)?;

        warn!(document_id, reason, "Document quarantined");
        Ok(())
    }
}
