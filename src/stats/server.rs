use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::stats::Stats;
use crate::job::job::{Job, ProcessInfo};
use crate::manager::error::EngineError;

/// Casts accepted by the stats loop.
#[derive(Debug)]
pub(crate) enum StatsMessage {
    AddProcess(ProcessInfo),
    RemoveProcess { host: String, pid: String },
    Processed(Job),
    Failed { error: String, job: Job },
    Stop,
}

/// Single-consumer loop applying stats casts one at a time; writes to the
/// stats keys land in cast order.
///
/// A failing cast is logged and dropped; the loop never crashes.
pub(crate) struct StatsServer {
    stats: Arc<Stats>,
    rx: mpsc::UnboundedReceiver<StatsMessage>,
}

impl StatsServer {
    pub fn new(stats: Arc<Stats>, rx: mpsc::UnboundedReceiver<StatsMessage>) -> Self {
        Self { stats, rx }
    }

    pub async fn run(mut self) {
        debug!("stats server started");
        while let Some(message) = self.rx.recv().await {
            if matches!(message, StatsMessage::Stop) {
                break;
            }
            if let Err(err) = self.apply(message).await {
                warn!(error = %err, "stats cast dropped");
            }
        }
        debug!("stats server stopped");
    }

    async fn apply(&self, message: StatsMessage) -> Result<(), EngineError> {
        match message {
            StatsMessage::AddProcess(process) => self.stats.add_process(&process).await,
            StatsMessage::RemoveProcess { host, pid } => {
                match self.stats.remove_process(&host, &pid).await {
                    // Jobs that never entered the table (unknown class) hit
                    // this on their cleanup pass.
                    Err(EngineError::NotFound(_)) => {
                        debug!(pid = %pid, "process entry already gone");
                        Ok(())
                    }
                    other => other,
                }
            }
            StatsMessage::Processed(job) => self.stats.record_processed(&job).await,
            StatsMessage::Failed { error, job } => self.stats.record_failure(&error, &job).await,
            StatsMessage::Stop => Ok(()),
        }
    }
}
