use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Once, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender, TryRecvError};
use tracing::{debug, error, warn};

use crate::error::WorkerError;
use crate::pipeline::{ProcessingEvent, ProgressReporter};

use super::handler::{DocumentHandler, DocumentOutcome};
use super::status::{CurrentDocument, WorkerStatus};

/// Document ids queued or in flight anywhere in the pool.
pub(crate) type Claims = Arc<Mutex<HashSet<String>>>;

/// Sent to the scheduler after each document.
#[derive(Debug)]
pub(crate) struct Completion {
    pub worker_id: usize,
    pub document_id: String,
    /// The document still has pending steps that failed this pass.
    pub retry_later: bool,
}

/// State shared between a worker thread and the scheduler.
pub(crate) struct WorkerShared {
    current: RwLock<Option<CurrentDocument>>,
}

impl WorkerShared {
    fn set_current(&self, current: Option<CurrentDocument>) {
        match self.current.write() {
            Ok(mut guard) => *guard = current,
            Err(poisoned) => *poisoned.into_inner() = current,
        }
    }

    fn current(&self) -> Option<CurrentDocument> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Scheduler side of one worker: its queue and its status.
pub(crate) struct WorkerSlot {
    pub id: usize,
    pub sender: Sender<String>,
    pub capacity: usize,
    shared: Arc<WorkerShared>,
}

impl WorkerSlot {
    pub fn is_busy(&self) -> bool {
        self.shared.current().is_some()
    }

    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            worker_id: self.id,
            current: self.shared.current(),
            queued: self.queued(),
            capacity: self.capacity,
        }
    }
}

/// Everything a worker thread needs besides its queue.
pub(crate) struct WorkerContext {
    pub handler: Arc<dyn DocumentHandler>,
    pub progress: Arc<dyn ProgressReporter>,
    pub claims: Claims,
    pub completions: Sender<Completion>,
    pub stop: Receiver<()>,
}

/// Spawns a worker thread with a bounded queue of `capacity` documents.
pub(crate) fn spawn_worker(
    id: usize,
    capacity: usize,
    ctx: WorkerContext,
) -> Result<(WorkerSlot, JoinHandle<()>), WorkerError> {
    install_panic_hook();

    let (sender, receiver) = crossbeam_channel::bounded::<String>(capacity);
    let shared = Arc::new(WorkerShared {
        current: RwLock::new(None),
    });

    let thread_shared = Arc::clone(&shared);
    let handle = thread::Builder::new()
        .name(format!("paperflow-worker-{}", id))
        .spawn(move || run_worker(id, receiver, thread_shared, ctx))
        .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

    let slot = WorkerSlot {
        id,
        sender,
        capacity,
        shared,
    };
    Ok((slot, handle))
}

fn run_worker(id: usize, queue: Receiver<String>, shared: Arc<WorkerShared>, ctx: WorkerContext) {
    debug!("Worker {} started", id);

    loop {
        // Stop wins over queued work; queued documents stay pending in the job store.
        if let Err(TryRecvError::Disconnected) = ctx.stop.try_recv() {
            break;
        }

        select! {
            recv(ctx.stop) -> _ => break,
            recv(queue) -> msg => match msg {
                Ok(document_id) => {
                    let retry_later = process(id, &document_id, &shared, &ctx);
                    release_claim(&ctx.claims, &document_id);
                    let _ = ctx.completions.send(Completion {
                        worker_id: id,
                        document_id,
                        retry_later,
                    });
                }
                Err(_) => break,
            },
        }
    }

    debug!("Worker {} stopped", id);
}

/// Runs one document. Returns true when it should wait for the next poll
/// before being picked up again.
fn process(id: usize, document_id: &str, shared: &WorkerShared, ctx: &WorkerContext) -> bool {
    shared.set_current(Some(CurrentDocument::new(document_id)));
    debug!("Worker {} processing document {}", id, document_id);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.handler.process_document(document_id)
    }));

    let retry_later = match result {
        Ok(Ok(DocumentOutcome::Completed)) => {
            debug!("Worker {} finished document {}", id, document_id);
            false
        }
        Ok(Ok(DocumentOutcome::Deferred { step, reason })) => {
            warn!(document_id, step = %step, reason = %reason, "Mandatory step failed, will retry");
            true
        }
        Ok(Err(e)) => {
            error!(document_id, error = %e, "Document processing aborted");
            true
        }
        Err(payload) => {
            let reason = format!("panic while processing: {}", panic_message(payload.as_ref()));
            let backtrace = take_panic_backtrace().unwrap_or_default();
            error!(document_id, reason = %reason, backtrace = %backtrace, "Worker {} caught panic", id);

            ctx.progress.report(ProcessingEvent::document_failed(
                document_id,
                &reason,
                backtrace,
            ));
            if let Err(e) = ctx.handler.quarantine(document_id, &reason) {
                error!(document_id, error = %e, "Failed to quarantine document");
            }
            true
        }
    };

    shared.set_current(None);
    retry_later
}

fn release_claim(claims: &Claims, document_id: &str) {
    match claims.lock() {
        Ok(mut set) => {
            set.remove(document_id);
        }
        Err(poisoned) => {
            poisoned.into_inner().remove(document_id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Records the backtrace of panics on worker threads so it can be reported
/// after unwinding. Other threads keep the previous hook's behaviour only.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let on_worker = thread::current()
                .name()
                .is_some_and(|name| name.starts_with("paperflow-worker-"));
            if on_worker {
                let backtrace = Backtrace::force_capture().to_string();
                LAST_PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            }
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<String> {
    LAST_PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{NoopProgress, PipelineError};
    use std::time::Duration;

    struct Recorder {
        seen: Mutex<Vec<String>>,
        quarantined: Mutex<Vec<(String, String)>>,
    }

    impl DocumentHandler for Recorder {
        fn process_document(&self, document_id: &str) -> Result<DocumentOutcome, PipelineError> {
            if document_id == "explode" {
                panic!("boom");
            }
            self.seen.lock().unwrap().push(document_id.to_string());
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

    #[test]
    fn test_worker_processes_and_survives_panic() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            quarantined: Mutex::new(Vec::new()),
        });
        let claims: Claims = Arc::new(Mutex::new(HashSet::new()));
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let (slot, handle) = spawn_worker(
            0,
            4,
            WorkerContext {
                handler: handler.clone(),
                progress: Arc::new(NoopProgress),
                claims: claims.clone(),
                completions: done_tx,
                stop: stop_rx,
            },
        )
        .unwrap();

        for id in ["a", "explode", "b"] {
            claims.lock().unwrap().insert(id.to_string());
            slot.sender.send(id.to_string()).unwrap();
        }
        let mut retry_later = Vec::new();
        for _ in 0..3 {
            let done: Completion = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            retry_later.push((done.document_id, done.retry_later));
        }
        assert_eq!(
            retry_later,
            vec![
                ("a".to_string(), false),
                ("explode".to_string(), true),
                ("b".to_string(), false)
            ]
        );

        assert_eq!(*handler.seen.lock().unwrap(), vec!["a", "b"]);
        let quarantined = handler.quarantined.lock().unwrap();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(quarantined[0].0, "explode");
        assert!(quarantined[0].1.contains("boom"));
        assert!(claims.lock().unwrap().is_empty());
        assert!(!slot.is_busy());

        drop(stop_tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&42), "unknown panic payload");
    }
}
