//! Worker selection for newly dispatched documents.

/// Load of one worker at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLoad {
    /// Whether the worker is processing a document.
    pub busy: bool,
    pub queued: usize,
    pub capacity: usize,
}

impl WorkerLoad {
    pub fn is_full(&self) -> bool {
        self.queued >= self.capacity
    }
}

/// Picks the worker that receives the next document.
pub trait SchedulingPolicy: Send + Sync {
    /// Index into `workers`, or `None` when no worker can accept work.
    fn select(&self, workers: &[WorkerLoad]) -> Option<usize>;
}

/// Prefers an idle worker, otherwise the one with the shortest queue.
/// Ties go to the lowest index.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastBusy;

impl SchedulingPolicy for LeastBusy {
    fn select(&self, workers: &[WorkerLoad]) -> Option<usize> {
        workers
            .iter()
            .enumerate()
            .filter(|(_, load)| !load.is_full())
            .min_by_key(|(_, load)| (load.busy, load.queued))
            .map(|(i, _)| i)
    }
}
