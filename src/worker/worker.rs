use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Local;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::job::job::{HandlerRegistry, Job, ProcessInfo};
use crate::stats::server::StatsMessage;

/// Outcome a worker reports back to the manager.
#[derive(Debug)]
pub(crate) enum WorkerOutcome {
    Success {
        pid: String,
        host: String,
        job: Job,
    },
    Failure {
        pid: String,
        host: String,
        error: String,
        job: Job,
    },
    /// The popped payload could not be decoded; nothing was recorded beyond
    /// a log line, the manager only releases the slot.
    Skipped { pid: String },
}

/// Short-lived task that runs one job and reports its outcome.
///
/// The job is already gone from its queue list when a worker is built; the
/// worker never touches queue state. Handler panics are captured and
/// converted into failure outcomes, they never take down the process.
pub(crate) struct Worker {
    pid: String,
    host: String,
    payload: String,
    handlers: Arc<HandlerRegistry>,
    stats_tx: mpsc::UnboundedSender<StatsMessage>,
    outcome_tx: mpsc::UnboundedSender<WorkerOutcome>,
}

impl Worker {
    pub fn new(
        host: String,
        payload: String,
        handlers: Arc<HandlerRegistry>,
        stats_tx: mpsc::UnboundedSender<StatsMessage>,
        outcome_tx: mpsc::UnboundedSender<WorkerOutcome>,
    ) -> Self {
        Self {
            pid: crate::job::job::new_worker_pid(&host),
            host,
            payload,
            handlers,
            stats_tx,
            outcome_tx,
        }
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Run the full lifecycle on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let Worker {
            pid,
            host,
            payload,
            handlers,
            stats_tx,
            outcome_tx,
        } = self;

        let job: Job = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(err) => {
                warn!(error = %err, "skipping malformed job payload");
                let _ = outcome_tx.send(WorkerOutcome::Skipped { pid });
                return;
            }
        };

        let handler = match handlers.get(&job.class) {
            Some(handler) => Arc::clone(handler),
            None => {
                error!(jid = %job.jid, class = %job.class, "no handler registered");
                let error = format!("ClassNotFound: {}", job.class);
                let _ = outcome_tx.send(WorkerOutcome::Failure {
                    pid,
                    host,
                    error,
                    job,
                });
                return;
            }
        };

        // Registered before any user code runs, removed after the outcome
        // has been reported.
        let _ = stats_tx.send(StatsMessage::AddProcess(ProcessInfo {
            pid: pid.clone(),
            host: host.clone(),
            job: job.clone(),
            started_at: Local::now().to_rfc3339(),
        }));

        debug!(jid = %job.jid, class = %job.class, queue = %job.queue, "worker running job");

        let invocation = AssertUnwindSafe(handler.perform(job.args.clone())).catch_unwind();
        let outcome = match invocation.await {
            Ok(Ok(())) => {
                info!(jid = %job.jid, class = %job.class, "job done");
                WorkerOutcome::Success { pid, host, job }
            }
            Ok(Err(err)) => {
                warn!(jid = %job.jid, class = %job.class, error = %err, "job failed");
                WorkerOutcome::Failure {
                    pid,
                    host,
                    error: err.to_string(),
                    job,
                }
            }
            Err(panic) => {
                let error = panic_message(panic);
                error!(jid = %job.jid, class = %job.class, error = %error, "job panicked");
                WorkerOutcome::Failure {
                    pid,
                    host,
                    error,
                    job,
                }
            }
        };

        // The manager may already be gone during shutdown; late reports are
        // dropped.
        let _ = outcome_tx.send(outcome);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "job handler panicked".to_string()
    }
}
