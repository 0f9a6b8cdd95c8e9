//! Processing events published while documents move through the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::step::ProcessStep;

/// Default capacity of the event channel. Slow subscribers lag and skip.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingEvent {
    StepStarted {
        document_id: String,
        step: ProcessStep,
        timestamp: DateTime<Utc>,
    },
    StepFinished {
        document_id: String,
        step: ProcessStep,
        succeeded: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// No further work is queued for the document. `ready` is false when a
    /// mandatory step failed and was put back for a later attempt.
    DocumentFinished {
        document_id: String,
        ready: bool,
        timestamp: DateTime<Utc>,
    },
    /// Processing panicked and the document was quarantined.
    DocumentFailed {
        document_id: String,
        reason: String,
        backtrace: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProcessingEvent {
    pub fn document_id(&self) -> &str {
        match self {
            ProcessingEvent::StepStarted { document_id, .. }
            | ProcessingEvent::StepFinished { document_id, .. }
            | ProcessingEvent::DocumentFinished { document_id, .. }
            | ProcessingEvent::DocumentFailed { document_id, .. } => document_id,
        }
    }

    pub fn step_started(document_id: &str, step: ProcessStep) -> Self {
        ProcessingEvent::StepStarted {
            document_id: document_id.to_string(),
            step,
            timestamp: Utc::now(),
        }
    }

    pub fn step_finished(document_id: &str, step: ProcessStep, message: Option<&str>) -> Self {
        ProcessingEvent::StepFinished {
            document_id: document_id.to_string(),
            step,
            succeeded: message.is_none(),
            message: message.map(str::to_string),
            timestamp: Utc::now(),
        }
    }

    pub fn document_finished(document_id: &str, ready: bool) -> Self {
        ProcessingEvent::DocumentFinished {
            document_id: document_id.to_string(),
            ready,
            timestamp: Utc::now(),
        }
    }

    pub fn document_failed(document_id: &str, reason: &str, backtrace: String) -> Self {
        ProcessingEvent::DocumentFailed {
            document_id: document_id.to_string(),
            reason: reason.to_string(),
            backtrace,
            timestamp: Utc::now(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProcessingEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProcessingEvent) {}
}

/// Fans events out to every subscriber. Sending without subscribers is not
/// an error.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProcessingEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastProgress {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProcessingEvent) {
        let _ = self.sender.send(event);
    }
}
