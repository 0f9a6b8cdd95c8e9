//! Builders and test doubles for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use paperflow::config::ProcessingConfig;
use paperflow::error::ProcessError;
use paperflow::language::LanguageIdentifier;
use paperflow::pipeline::{PipelineError, ProcessItem, ProcessStep};
use paperflow::processor::ContentExtractor;
use paperflow::rules::{Action, ActionKind, Condition, ConditionKind, Rule, RuleMode};
use paperflow::search::SearchError;
use paperflow::store::{DocumentStore, JobStore, StoreError, StoreResult};
use paperflow::worker::{DocumentHandler, DocumentOutcome};
use paperflow::{Database, Document, DocumentStatus, SearchIndex};

pub const USER_ID: i64 = 1;

/// Processing settings with fast ticks so tests do not wait on the poll.
pub fn processing_config(worker_count: usize, queue_capacity: usize) -> ProcessingConfig {
    ProcessingConfig {
        worker_count,
        queue_capacity,
        poll_interval_secs: 3600,
        idle_interval_ms: 10,
        pull_batch_size: 10,
    }
}

/// Polls `check` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// Builder for rules owned by [`USER_ID`].
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    pub fn new(name: &str, order: i64) -> Self {
        Self {
            rule: Rule {
                id: 0,
                user_id: USER_ID,
                name: name.to_string(),
                description: String::new(),
                enabled: true,
                order,
                mode: RuleMode::MatchAll,
                conditions: Vec::new(),
                actions: Vec::new(),
            },
        }
    }

    pub fn match_any(mut self) -> Self {
        self.rule.mode = RuleMode::MatchAny;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.rule.enabled = false;
        self
    }

    pub fn when(mut self, kind: ConditionKind, value: &str) -> Self {
        self.rule.conditions.push(Condition::new(kind, value));
        self
    }

    pub fn when_ci(mut self, kind: ConditionKind, value: &str) -> Self {
        let mut condition = Condition::new(kind, value);
        condition.case_insensitive = true;
        self.rule.conditions.push(condition);
        self
    }

    pub fn then(mut self, kind: ActionKind, value: &str) -> Self {
        self.rule.actions.push(Action::new(kind, value));
        self
    }

    pub fn then_metadata(mut self, kind: ActionKind, key_id: i64, value_id: i64) -> Self {
        let mut action = Action::new(kind, "");
        action.metadata_key = Some(key_id);
        action.metadata_value = Some(value_id);
        self.rule.actions.push(action);
        self
    }

    pub fn build(self) -> Rule {
        self.rule
    }
}

/// Search index that keeps every document it was handed.
#[derive(Default)]
pub struct RecordingIndex {
    documents: Mutex<Vec<Document>>,
}

impl RecordingIndex {
    pub fn indexed(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    pub fn count_for(&self, document_id: &str) -> usize {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.id == document_id)
            .count()
    }
}

impl SearchIndex for RecordingIndex {
    fn index_documents(&self, documents: &[Document]) -> Result<(), SearchError> {
        self.documents.lock().unwrap().extend_from_slice(documents);
        Ok(())
    }
}

/// Language identifier answering the same code for any text.
pub struct FixedLanguage(pub &'static str);

impl LanguageIdentifier for FixedLanguage {
    fn identify(&self, _text: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

/// Extractor that fails for every document it supports.
pub struct FailingExtractor;

impl ContentExtractor for FailingExtractor {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn supports(&self, mimetype: &str) -> bool {
        mimetype == "text/plain"
    }

    fn extract(&self, _path: &Path, _mimetype: &str, _scratch: &Path) -> Result<String, ProcessError> {
        Err(ProcessError::OcrFailed("scanner offline".to_string()))
    }
}

/// Handler that records calls and panics on documents named "explode".
#[derive(Default)]
pub struct RecordingHandler {
    processed: Mutex<Vec<String>>,
    quarantined: Mutex<Vec<(String, String)>>,
}

impl RecordingHandler {
    pub fn processed(&self) -> Vec<String> {
        self.processed.lock().unwrap().clone()
    }

    pub fn quarantined(&self) -> Vec<(String, String)> {
        self.quarantined.lock().unwrap().clone()
    }
}

impl DocumentHandler for RecordingHandler {
    fn process_document(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError> {
        if document_id == "explode" {
            panic!("extractor blew up");
        }
        self.processed.lock().unwrap().push(document_id.to_string());
        Ok(DocumentOutcome::Completed)
    }

    fn quarantine(&self, document_id: &str, reason: &str) -> Result<(), PipelineError> {
        self.quarantined
            .lock()
            .unwrap()
            .push((document_id.to_string(), reason.to_string()));
        Ok(())
    }
}

/// Handler that holds every document until the test releases it.
pub struct GatedHandler {
    started: Sender<String>,
    gate: Receiver<()>,
    finished: Mutex<Vec<String>>,
}

/// Test side of a [`GatedHandler`].
pub struct Gate {
    pub started: Receiver<String>,
    release: Sender<()>,
}

impl Gate {
    /// Lets one held document finish.
    pub fn release_one(&self) {
        self.release.send(()).unwrap();
    }
}

impl GatedHandler {
    pub fn new() -> (Self, Gate) {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let handler = Self {
            started: started_tx,
            gate: release_rx,
            finished: Mutex::new(Vec::new()),
        };
        let gate = Gate {
            started: started_rx,
            release: release_tx,
        };
        (handler, gate)
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

impl DocumentHandler for GatedHandler {
    fn process_document(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError> {
        let _ = self.started.send(document_id.to_string());
        // A dropped gate releases everything.
        let _ = self.gate.recv();
        self.finished.lock().unwrap().push(document_id.to_string());
        Ok(DocumentOutcome::Completed)
    }

    fn quarantine(&self, _document_id: &str, _reason: &str) -> Result<(), PipelineError> {
        Ok(())
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Corrupt(format!("injected {} failure", what))
}

/// Document store whose next `update` fails once armed.
pub struct FlakyDocuments {
    inner: Database,
    fail_update: AtomicBool,
}

impl FlakyDocuments {
    pub fn failing_next_update(inner: Database) -> Self {
        Self {
            inner,
            fail_update: AtomicBool::new(true),
        }
    }
}

impl DocumentStore for FlakyDocuments {
    fn get_document(&self, document_id: &str) -> StoreResult<Document> {
        self.inner.get_document(document_id)
    }

    fn update(&self, document: &Document) -> StoreResult<()> {
        if self.fail_update.swap(false, Ordering::SeqCst) {
            return Err(injected("update"));
        }
        self.inner.update(document)
    }

    fn update_with_metadata(&self, document: &Document) -> StoreResult<()> {
        self.inner.update_with_metadata(document)
    }

    fn set_document_content(&self, document_id: &str, content: &str) -> StoreResult<()> {
        self.inner.set_document_content(document_id, content)
    }

    fn set_status(&self, document_id: &str, status: DocumentStatus) -> StoreResult<()> {
        self.inner.set_status(document_id, status)
    }
}

/// Job store whose next `mark_processing_done` fails once armed.
pub struct FlakyJobs {
    inner: Database,
    fail_mark_done: AtomicBool,
}

impl FlakyJobs {
    pub fn failing_next_mark_done(inner: Database) -> Self {
        Self {
            inner,
            fail_mark_done: AtomicBool::new(true),
        }
    }
}

impl JobStore for FlakyJobs {
    fn add_document(&self, document_id: &str) -> StoreResult<()> {
        self.inner.add_document(document_id)
    }

    fn get_document_pending_steps(&self, document_id: &str) -> StoreResult<Vec<ProcessItem>> {
        self.inner.get_document_pending_steps(document_id)
    }

    fn start_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        self.inner.start_process_item(item)
    }

    fn mark_processing_done(
        &self,
        item: &ProcessItem,
        succeeded: bool,
        message: Option<&str>,
    ) -> StoreResult<()> {
        if self.fail_mark_done.swap(false, Ordering::SeqCst) {
            return Err(injected("mark done"));
        }
        self.inner.mark_processing_done(item, succeeded, message)
    }

    fn clear_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        self.inner.clear_process_item(item)
    }

    fn requeue_process_item(&self, item: &ProcessItem) -> StoreResult<()> {
        self.inner.requeue_process_item(item)
    }

    fn cancel_running_processes(&self) -> StoreResult<usize> {
        self.inner.cancel_running_processes()
    }

    fn get_documents_pending_processing(&self, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.get_documents_pending_processing(limit)
    }

    fn force_process_document(&self, document_id: &str, from: ProcessStep) -> StoreResult<()> {
        self.inner.force_process_document(document_id, from)
    }

    fn cancel_document_processing(&self, document_id: &str) -> StoreResult<()> {
        self.inner.cancel_document_processing(document_id)
    }
}
