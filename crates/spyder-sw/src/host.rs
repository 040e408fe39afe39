//! Event loop that delivers host events to a worker.
//!
//! Lifecycle events run one at a time, in arrival order, and nothing
//! queued behind them starts until they finish. Fetch, push and click
//! events run concurrently once dequeued.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::worker::{EventOutcome, ServiceWorker, WorkerEvent};
use crate::WorkerError;

/// Events queued before the sender waits.
const QUEUE_DEPTH: usize = 64;

struct Envelope {
    event: WorkerEvent,
    reply: oneshot::Sender<Result<EventOutcome, WorkerError>>,
}

/// Owns the task driving a [`ServiceWorker`].
#[derive(Debug)]
pub struct WorkerHost {
    tx: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl WorkerHost {
    /// Start the event loop on the current runtime.
    pub fn spawn(worker: Arc<ServiceWorker>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(run(worker, rx));
        Self { tx, task }
    }

    /// Queue `event` and wait for its outcome.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Envelope { event, reply })
            .await
            .map_err(|_| WorkerError::HostClosed)?;
        outcome.await.map_err(|_| WorkerError::HostClosed)?
    }

    /// Stop accepting events and wait for in-flight ones to settle.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Worker host task failed");
        }
    }
}

async fn run(worker: Arc<ServiceWorker>, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { event, reply }) = rx.recv().await {
        debug!(event = event.name(), "Dispatching event");
        match event {
            WorkerEvent::Install => {
                let result = worker.handle(WorkerEvent::Install).await;
                let skip_waiting =
                    matches!(&result, Ok(EventOutcome::Installed(outcome)) if outcome.skip_waiting);
                if skip_waiting {
                    if let Err(e) = worker.handle(WorkerEvent::Activate).await {
                        warn!(error = %e, "Activation after install did not complete cleanly");
                    }
                }
                let _ = reply.send(result);
            }
            WorkerEvent::Activate => {
                let _ = reply.send(worker.handle(WorkerEvent::Activate).await);
            }
            event => {
                let guard = worker.keep_alive().extend();
                let worker = Arc::clone(&worker);
                tokio::spawn(async move {
                    let _guard = guard;
                    let _ = reply.send(worker.handle(event).await);
                });
            }
        }
    }

    worker.keep_alive().idle().await;
    debug!("Worker host stopped");
}
