use chrono::{DateTime, Utc};
use serde::Serialize;

/// Document a worker is processing right now.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentDocument {
    pub document_id: String,
    pub started_at: DateTime<Utc>,
}

impl CurrentDocument {
    pub fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub worker_id: usize,
    pub current: Option<CurrentDocument>,
    /// Documents waiting in the worker's queue.
    pub queued: usize,
    pub capacity: usize,
}

impl WorkerStatus {
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_full(&self) -> bool {
        self.queued >= self.capacity
    }

    /// Time spent on the current document so far.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.current
            .as_ref()
            .map(|c| Utc::now().signed_duration_since(c.started_at))
    }
}

/// Snapshot of the worker pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStatus {
    pub running: bool,
    pub workers: Vec<WorkerStatus>,
}

impl ProcessingStatus {
    /// Ids of documents currently being processed.
    pub fn in_flight(&self) -> Vec<&str> {
        self.workers
            .iter()
            .filter_map(|w| w.current.as_ref().map(|c| c.document_id.as_str()))
            .collect()
    }

    /// Documents waiting across all queues.
    pub fn queued(&self) -> usize {
        self.workers.iter().map(|w| w.queued).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.queued() == 0 && self.workers.iter().all(WorkerStatus::is_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: usize, current: Option<&str>, queued: usize) -> WorkerStatus {
        WorkerStatus {
            worker_id: id,
            current: current.map(CurrentDocument::new),
            queued,
            capacity: 2,
        }
    }

    #[test]
    fn test_pool_snapshot() {
        let status = ProcessingStatus {
            running: true,
            workers: vec![worker(0, Some("a"), 2), worker(1, None, 0)],
        };
        assert_eq!(status.in_flight(), vec!["a"]);
        assert_eq!(status.queued(), 2);
        assert!(!status.is_idle());
        assert!(status.workers[0].is_full());
        assert!(status.workers[0].elapsed().is_some());
        assert!(status.workers[1].is_idle());
        assert!(status.workers[1].elapsed().is_none());
    }

    #[test]
    fn test_stopped_status_is_idle() {
        assert!(ProcessingStatus::default().is_idle());
    }
}
