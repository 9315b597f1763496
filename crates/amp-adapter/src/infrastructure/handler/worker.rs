//! A reusable [`Handler`] that runs stimuli on a dedicated worker thread.
//!
//! Stimuli are looked up in an [`ActionTable`] registered up front.
//! `stimulate` only checks the label name and queues the job, so it never
//! blocks the broker event loop; the worker executes jobs in FIFO order and
//! pushes any resulting response labels into the [`ResponseSink`].
//!
//! ```text
//! event loop ── stimulate() ──► job queue ──► worker thread ──► ResponseSink
//!                                  ▲               │
//! stop() ──────── stop signal ─────┴───────────────┘ (select!)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use amp_core::protocol::{Label, LabelType, Value};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::application::handler::{Handler, HandlerError, ResponseSink};

/// Executes one stimulus and returns the responses it produced.
pub type Action = Box<dyn Fn(&Label) -> Result<Vec<Label>, HandlerError> + Send + Sync>;

/// Declared labels plus the action behind each stimulus.
#[derive(Default)]
pub struct ActionTable {
    labels: Vec<Label>,
    actions: HashMap<String, Action>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a stimulus and the action that executes it.  Registering the
    /// same name twice replaces the earlier action.
    pub fn on_stimulus<F>(mut self, label: Label, action: F) -> Self
    where
        F: Fn(&Label) -> Result<Vec<Label>, HandlerError> + Send + Sync + 'static,
    {
        self.labels.retain(|l| l.name != label.name);
        self.actions.insert(label.name.clone(), Box::new(action));
        self.labels.push(label);
        self
    }

    /// Declares a response the SUT may emit.
    pub fn declare_response(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Every declared label, in registration order.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn supports(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    fn execute(&self, label: &Label) -> Result<Vec<Label>, HandlerError> {
        match self.actions.get(&label.name) {
            Some(action) => action(label),
            None => Err(HandlerError::UnsupportedLabel(label.name.clone())),
        }
    }
}

/// Reads a parameter an action cannot do without.
///
/// # Errors
///
/// Returns [`HandlerError::Sut`] naming the label and parameter when it is
/// missing or has no value.
pub fn required_param(label: &Label, name: &str) -> Result<Value, HandlerError> {
    label.param(name).ok_or_else(|| {
        HandlerError::Sut(format!(
            "label '{}' is missing parameter '{name}'",
            label.name
        ))
    })
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    jobs: Sender<Label>,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Handler backed by an [`ActionTable`] and one stimulus worker thread.
pub struct WorkerHandler {
    table: Arc<ActionTable>,
    sink: ResponseSink,
    worker: Mutex<Option<Worker>>,
}

impl WorkerHandler {
    pub fn new(table: ActionTable, sink: ResponseSink) -> Self {
        Self {
            table: Arc::new(table),
            sink,
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // A poisoned lock only means a previous holder panicked; the Option
        // inside is still consistent.
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Handler for WorkerHandler {
    fn supported_labels(&self) -> Vec<Label> {
        self.table.labels().to_vec()
    }

    fn start(&self) -> Result<(), HandlerError> {
        let mut slot = self.lock_worker();
        if slot.is_some() {
            debug!("stimulus worker already running");
            return Ok(());
        }

        let (jobs, job_rx) = unbounded();
        let (stop, stop_rx) = unbounded();
        let table = Arc::clone(&self.table);
        let sink = self.sink.clone();
        let thread = thread::Builder::new()
            .name("amp-stimulus-worker".into())
            .spawn(move || run_worker(&table, &sink, &job_rx, &stop_rx))
            .map_err(|e| HandlerError::Sut(format!("failed to spawn stimulus worker: {e}")))?;

        info!("stimulus worker started");
        *slot = Some(Worker { jobs, stop, thread });
        Ok(())
    }

    fn stop(&self) {
        // Take the worker out first so the join happens without the lock.
        let Some(worker) = self.lock_worker().take() else {
            return;
        };
        let _ = worker.stop.send(());
        if worker.thread.join().is_err() {
            warn!("stimulus worker panicked");
        }
        info!("stimulus worker stopped");
    }

    fn reset(&self) -> Result<(), HandlerError> {
        self.stop();
        self.start()
    }

    fn stimulate(&self, label: &Label) -> Result<Option<String>, HandlerError> {
        if !self.table.supports(&label.name) {
            return Err(HandlerError::UnsupportedLabel(label.name.clone()));
        }
        let slot = self.lock_worker();
        let worker = slot.as_ref().ok_or(HandlerError::NotRunning)?;
        worker
            .jobs
            .send(label.clone())
            .map_err(|_| HandlerError::NotRunning)?;
        Ok(Some(label.name.clone()))
    }
}

impl Drop for WorkerHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    table: &ActionTable,
    sink: &ResponseSink,
    jobs: &Receiver<Label>,
    stop: &Receiver<()>,
) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(jobs) -> job => {
                let Ok(label) = job else { break };
                debug!("executing stimulus '{}'", label.name);
                match table.execute(&label) {
                    Ok(responses) => {
                        for response in responses {
                            if response.kind() != LabelType::Response {
                                warn!("action for '{}' produced non-response '{}'", label.name, response.name);
                            }
                            sink.send_response(response, None, None);
                        }
                    }
                    Err(e) => sink.report_failure(format!("error while stimulating the SUT: {e}")),
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
