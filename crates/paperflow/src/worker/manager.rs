//! Fixed worker pool fed from the durable job store.
//!
//! A scheduler thread wakes on a fast idle tick, a slower poll tick and on
//! worker completions. The idle tick only pulls from the job store after a
//! pull was requested, either by a completion or by a poll skipped because
//! every queue was full. A document whose pass ended with failed steps is
//! left out of pulls until the next poll tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, tick, Receiver, Sender, TrySendError};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::ProcessingConfig;
use crate::error::WorkerError;
use crate::pipeline::{BroadcastProgress, ProcessStep, ProcessingEvent};
use crate::store::JobStore;

use super::executor::{spawn_worker, Claims, Completion, WorkerContext, WorkerSlot};
use super::handler::DocumentHandler;
use super::policy::{LeastBusy, SchedulingPolicy, WorkerLoad};
use super::status::ProcessingStatus;

/// Result of handing a document to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Queued { worker_id: usize },
    /// The document is already queued or being processed.
    AlreadyQueued,
    /// Every queue is full. The pending job rows are picked up by a later pull.
    Deferred,
}

/// Routes documents to worker queues. Shared by the manager and its
/// scheduler thread.
struct Dispatcher {
    workers: Vec<WorkerSlot>,
    claims: Claims,
    policy: Arc<dyn SchedulingPolicy>,
    jobs: Arc<dyn JobStore>,
    pull_requested: AtomicBool,
    batch_size: usize,
    /// Documents skipped by pulls until the next poll tick.
    waiting: Mutex<HashSet<String>>,
}

impl Dispatcher {
    fn dispatch(&self, document_id: &str) -> Result<Dispatch, WorkerError> {
        let mut claims = match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if claims.contains(document_id) {
            return Ok(Dispatch::AlreadyQueued);
        }

        let loads: Vec<WorkerLoad> = self
            .workers
            .iter()
            .map(|w| WorkerLoad {
                busy: w.is_busy(),
                queued: w.queued(),
                capacity: w.capacity,
            })
            .collect();

        let Some(index) = self.policy.select(&loads) else {
            return Ok(Dispatch::Deferred);
        };
        let worker = &self.workers[index];

        match worker.sender.try_send(document_id.to_string()) {
            Ok(()) => {
                claims.insert(document_id.to_string());
                debug!(document_id, worker_id = worker.id, "Dispatched document");
                Ok(Dispatch::Queued {
                    worker_id: worker.id,
                })
            }
            Err(TrySendError::Full(_)) => Ok(Dispatch::Deferred),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::ChannelClosed),
        }
    }

    fn queue_full(&self) -> bool {
        self.workers.iter().all(|w| w.queued() >= w.capacity)
    }

    /// Dispatches documents with pending steps. Returns how many were queued.
    fn pull(&self) -> Result<usize, WorkerError> {
        if self.queue_full() {
            debug!("All worker queues full, skipping pull");
            self.request_pull();
            return Ok(0);
        }

        let waiting = self.waiting().clone();
        let pending = self
            .jobs
            .get_documents_pending_processing(self.batch_size + waiting.len())?;
        let mut queued = 0;
        for document_id in pending {
            if waiting.contains(&document_id) {
                continue;
            }
            match self.dispatch(&document_id)? {
                Dispatch::Queued { .. } => queued += 1,
                Dispatch::AlreadyQueued => {}
                Dispatch::Deferred => {
                    self.request_pull();
                    break;
                }
            }
        }
        Ok(queued)
    }

    fn waiting(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.waiting.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn retry_later(&self, document_id: &str) {
        self.waiting().insert(document_id.to_string());
    }

    fn retry_now(&self, document_id: &str) {
        self.waiting().remove(document_id);
    }

    fn retry_all(&self) {
        self.waiting().clear();
    }

    fn request_pull(&self) {
        self.pull_requested.store(true, Ordering::SeqCst);
    }

    fn take_pull_request(&self) -> bool {
        self.pull_requested.swap(false, Ordering::SeqCst)
    }

    fn status(&self) -> ProcessingStatus {
        ProcessingStatus {
            running: true,
            workers: self.workers.iter().map(WorkerSlot::status).collect(),
        }
    }
}

struct Running {
    dispatcher: Arc<Dispatcher>,
    /// Dropping the sender disconnects every stop receiver.
    stop: Sender<()>,
    scheduler: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

pub struct Manager {
    config: ProcessingConfig,
    jobs: Arc<dyn JobStore>,
    handler: Arc<dyn DocumentHandler>,
    progress: BroadcastProgress,
    policy: Arc<dyn SchedulingPolicy>,
    running: Mutex<Option<Running>>,
}

impl Manager {
    pub fn new(
        config: ProcessingConfig,
        jobs: Arc<dyn JobStore>,
        handler: Arc<dyn DocumentHandler>,
        progress: BroadcastProgress,
    ) -> Self {
        Self {
            config,
            jobs,
            handler,
            progress,
            policy: Arc::new(LeastBusy),
            running: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SchedulingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.running().as_ref().map(|r| Arc::clone(&r.dispatcher))
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Resets jobs interrupted by a previous run and starts the pool.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut running = self.running();
        if running.is_some() {
            return Err(WorkerError::AlreadyRunning);
        }

        let reset = self.jobs.cancel_running_processes()?;
        if reset > 0 {
            info!("Re-queued {} interrupted steps", reset);
        }

        let worker_count = self.config.worker_count.max(1);
        let capacity = self.config.queue_capacity.max(1);
        let claims: Claims = Arc::new(Mutex::new(HashSet::new()));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

        let mut slots = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let ctx = WorkerContext {
                handler: Arc::clone(&self.handler),
                progress: Arc::new(self.progress.clone()),
                claims: Arc::clone(&claims),
                completions: done_tx.clone(),
                stop: stop_rx.clone(),
            };
            match spawn_worker(id, capacity, ctx) {
                Ok((slot, handle)) => {
                    slots.push(slot);
                    handles.push(handle);
                }
                Err(e) => {
                    drop(stop_tx);
                    join_all(handles);
                    return Err(e);
                }
            }
        }
        drop(done_tx);

        let dispatcher = Arc::new(Dispatcher {
            workers: slots,
            claims,
            policy: Arc::clone(&self.policy),
            jobs: Arc::clone(&self.jobs),
            pull_requested: AtomicBool::new(true),
            batch_size: self.config.pull_batch_size.max(1),
            waiting: Mutex::new(HashSet::new()),
        });

        let scheduler = {
            let dispatcher = Arc::clone(&dispatcher);
            let config = self.config.clone();
            thread::Builder::new()
                .name("paperflow-scheduler".to_string())
                .spawn(move || run_scheduler(dispatcher, config, done_rx, stop_rx))
        };
        let scheduler = match scheduler {
            Ok(handle) => handle,
            Err(e) => {
                drop(stop_tx);
                join_all(handles);
                return Err(WorkerError::SpawnFailed(e.to_string()));
            }
        };

        info!("Started {} workers", worker_count);
        *running = Some(Running {
            dispatcher,
            stop: stop_tx,
            scheduler,
            workers: handles,
        });
        Ok(())
    }

    /// Stops the pool after each worker finishes its current document.
    /// Calling it on a stopped manager does nothing.
    pub fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };

        info!("Stopping processing manager...");
        drop(running.stop);
        if running.scheduler.join().is_err() {
            error!("Scheduler thread panicked");
        }
        drop(running.dispatcher);
        join_all(running.workers);
        info!("All workers have stopped");
    }

    /// Hands a document to the least busy worker, even one waiting for a
    /// retry.
    pub fn add_document_for_processing(&self, document_id: &str) -> Result<Dispatch, WorkerError> {
        let dispatcher = self.dispatcher().ok_or(WorkerError::NotRunning)?;
        dispatcher.retry_now(document_id);
        dispatcher.dispatch(document_id)
    }

    /// Dispatches documents with pending steps unless every queue is full.
    pub fn pull_documents_to_process(&self) -> Result<usize, WorkerError> {
        let dispatcher = self.dispatcher().ok_or(WorkerError::NotRunning)?;
        dispatcher.pull()
    }

    pub fn processing_status(&self) -> ProcessingStatus {
        self.dispatcher()
            .map(|d| d.status())
            .unwrap_or_default()
    }

    /// Whether every worker queue is at capacity. False when stopped.
    pub fn queue_full(&self) -> bool {
        self.dispatcher().is_some_and(|d| d.queue_full())
    }

    /// Schedules `from` and every later step again and dispatches the
    /// document when the pool is running.
    pub fn force_process_document(
        &self,
        document_id: &str,
        from: ProcessStep,
    ) -> Result<Dispatch, WorkerError> {
        self.jobs.force_process_document(document_id, from)?;
        match self.dispatcher() {
            Some(dispatcher) => {
                dispatcher.retry_now(document_id);
                dispatcher.dispatch(document_id)
            }
            None => Ok(Dispatch::Deferred),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.progress.subscribe()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for (i, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            error!("Worker {} panicked", i);
        }
    }
}

fn run_scheduler(
    dispatcher: Arc<Dispatcher>,
    config: ProcessingConfig,
    completions: Receiver<Completion>,
    stop: Receiver<()>,
) {
    let idle = tick(config.idle_interval());
    let poll = tick(config.poll_interval());
    debug!("Scheduler started");

    let pull = |dispatcher: &Dispatcher| match dispatcher.pull() {
        Ok(0) => {}
        Ok(n) => debug!("Queued {} documents", n),
        Err(e) => warn!(error = %e, "Failed to pull pending documents"),
    };

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(completions) -> msg => match msg {
                Ok(done) => {
                    debug!(worker_id = done.worker_id, document_id = %done.document_id, "Worker finished document");
                    if done.retry_later {
                        dispatcher.retry_later(&done.document_id);
                    } else {
                        dispatcher.retry_now(&done.document_id);
                    }
                    dispatcher.request_pull();
                }
                Err(_) => break,
            },
            recv(idle) -> _ => {
                if dispatcher.take_pull_request() {
                    pull(&dispatcher);
                }
            },
            recv(poll) -> _ => {
                dispatcher.retry_all();
                pull(&dispatcher);
            },
        }
    }

    debug!("Scheduler stopped");
}
