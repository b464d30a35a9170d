//! Background offload for work too heavy for the UI thread.
//!
//! An [`Offload`] owns one worker thread fed over a channel. Jobs run off
//! the UI thread; their results queue up and are delivered back on the
//! owning thread by [`Offload::drain`], matched to the callback registered
//! at submission by job id. Callbacks therefore always run on the thread
//! that owns the components, never on the worker.
//!
//! # Failure modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `run` after shutdown | `Err(OffloadError::TornDown)` immediately |
//! | Job returns an error | callback receives `Err(OffloadError::Failed)` |
//! | Worker dies mid-flight | remaining callbacks rejected on next drain |
//! | Shutdown with jobs pending | every pending callback rejected with `TornDown` |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

/// Work shipped to the worker thread.
pub type Job = Box<dyn FnOnce() -> Result<Value, String> + Send>;

/// Callback invoked on the owning thread with the job's outcome.
pub type TaskCallback = Box<dyn FnOnce(Result<Value, OffloadError>)>;

/// Errors delivered to task callbacks or returned from submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OffloadError {
    /// The offload was shut down before the job could complete.
    TornDown,
    /// The job itself reported failure.
    Failed(String),
}

impl fmt::Display for OffloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TornDown => write!(f, "offload worker was torn down"),
            Self::Failed(message) => write!(f, "background job failed: {message}"),
        }
    }
}

impl std::error::Error for OffloadError {}

struct Request {
    id: u64,
    job: Job,
}

struct Response {
    id: u64,
    result: Result<Value, String>,
}

/// One worker thread plus the owning-thread bookkeeping.
pub struct Offload {
    requests: Option<Sender<Request>>,
    responses: Receiver<Response>,
    pending: RefCell<FxHashMap<u64, TaskCallback>>,
    next_id: Cell<u64>,
    worker: Option<JoinHandle<()>>,
}

impl Offload {
    /// Spawn the worker thread.
    #[must_use]
    pub fn spawn() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (response_tx, response_rx) = mpsc::channel::<Response>();
        let worker = thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                let result = (request.job)();
                if response_tx
                    .send(Response {
                        id: request.id,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        Self {
            requests: Some(request_tx),
            responses: response_rx,
            pending: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(0),
            worker: Some(worker),
        }
    }

    /// Submit a job. The callback fires from a later [`drain`](Self::drain)
    /// on this thread. Returns the job id.
    pub fn run(
        &self,
        job: impl FnOnce() -> Result<Value, String> + Send + 'static,
        callback: impl FnOnce(Result<Value, OffloadError>) + 'static,
    ) -> Result<u64, OffloadError> {
        let Some(requests) = &self.requests else {
            return Err(OffloadError::TornDown);
        };
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        if requests
            .send(Request {
                id,
                job: Box::new(job),
            })
            .is_err()
        {
            warn!(id, "offload worker is gone; rejecting job");
            return Err(OffloadError::Failed("worker terminated".to_owned()));
        }
        self.pending.borrow_mut().insert(id, Box::new(callback));
        Ok(id)
    }

    /// Jobs submitted but not yet delivered.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Deliver every completed job's result to its callback. Returns the
    /// number of callbacks invoked.
    pub fn drain(&self) -> usize {
        let mut delivered = 0;
        loop {
            match self.responses.try_recv() {
                Ok(Response { id, result }) => {
                    let callback = self.pending.borrow_mut().remove(&id);
                    if let Some(callback) = callback {
                        callback(result.map_err(OffloadError::Failed));
                        delivered += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("offload worker terminated; rejecting pending jobs");
                    self.reject_all(&OffloadError::Failed("worker terminated".to_owned()));
                    break;
                }
            }
        }
        delivered
    }

    /// Stop the worker and reject everything still pending. Idempotent.
    pub fn shutdown(&mut self) {
        if self.requests.take().is_none() {
            return;
        }
        debug!(pending = self.pending_count(), "offload shutting down");
        self.reject_all(&OffloadError::TornDown);
        if let Some(worker) = self.worker.take() {
            // A panicked worker already rejected its jobs above.
            let _ = worker.join();
        }
    }

    fn reject_all(&self, error: &OffloadError) {
        let pending: Vec<TaskCallback> =
            self.pending.borrow_mut().drain().map(|(_, cb)| cb).collect();
        for callback in pending {
            callback(Err(error.clone()));
        }
    }
}

impl Drop for Offload {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Offload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Offload")
            .field("pending", &self.pending_count())
            .field("alive", &self.requests.is_some())
            .finish()
    }
}
