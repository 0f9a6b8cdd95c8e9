use crate::pipeline::step::ProcessStep;
use crate::pipeline::PipelineError;

/// How a document left the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Every pending step ran; the document is ready.
    Completed,
    /// A mandatory step failed and was put back to pending.
    Deferred { step: ProcessStep, reason: String },
}

/// Work a worker performs for one document id.
///
/// Implementations run on worker threads and must not assume which thread.
/// A panic inside `process_document` is caught by the worker, which then
/// calls `quarantine`.
pub trait DocumentHandler: Send + Sync {
    fn process_document(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError>;

    /// Takes the document out of processing after an unrecoverable fault.
    fn quarantine(&self, document_id: &str, reason: &str) -> Result<(), PipelineError>;
}
