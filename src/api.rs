//! Administrative surface over the queue and stats data.
//!
//! Reads and maintenance operations go straight to Redis; they do not need
//! to serialize with the dispatcher's poll tick, so an [`Api`] can be built
//! from any gateway without a running manager.

use std::sync::Arc;

use crate::gateway::redis::RedisGateway;
use crate::job::job::{Job, ProcessInfo};
use crate::manager::error::EngineError;
use crate::queue::queue::JobQueue;
use crate::stats::stats::Stats;

pub struct Api {
    queue: JobQueue,
    stats: Stats,
}

impl Api {
    pub fn new(gateway: Arc<RedisGateway>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            queue: JobQueue::new(gateway.clone(), namespace.clone()),
            stats: Stats::new(gateway, namespace),
        }
    }

    /// Every queue that has ever been enqueued to.
    pub async fn queues(&self) -> Result<Vec<String>, EngineError> {
        self.queue.queues().await
    }

    /// Drop a queue from the registry along with its pending jobs.
    pub async fn remove_queue(&self, queue: &str) -> Result<(), EngineError> {
        self.queue.remove_queue(queue).await
    }

    /// Decoded peek at a queue's pending jobs, oldest first.
    pub async fn jobs(&self, queue: &str) -> Result<Vec<Job>, EngineError> {
        self.queue.jobs(queue).await
    }

    /// Number of pending jobs in a queue.
    pub async fn queue_size(&self, queue: &str) -> Result<u64, EngineError> {
        self.queue.queue_size(queue).await
    }

    /// Look up a pending job by jid.
    pub async fn find_job(
        &self,
        queue: &str,
        jid: &str,
    ) -> Result<Option<(Job, usize)>, EngineError> {
        self.queue.find_job(queue, jid).await
    }

    /// Remove one pending job by jid.
    pub async fn remove_job(&self, queue: &str, jid: &str) -> Result<bool, EngineError> {
        self.queue.remove_job(queue, jid).await
    }

    /// Number of currently executing workers across the fleet.
    pub async fn busy(&self) -> Result<u64, EngineError> {
        self.stats.busy().await
    }

    /// Decoded process-table entries.
    pub async fn processes(&self) -> Result<Vec<ProcessInfo>, EngineError> {
        self.stats.processes().await
    }

    /// Drop the entire process table.
    pub async fn clear_processes(&self) -> Result<(), EngineError> {
        self.stats.clear_processes().await
    }

    /// Lifetime processed counter.
    pub async fn processed_count(&self) -> Result<u64, EngineError> {
        self.stats.processed_count().await
    }

    /// Lifetime failed counter.
    pub async fn failed_count(&self) -> Result<i64, EngineError> {
        self.stats.failed_count().await
    }

    /// Per-second buckets as `(bucket label, count)` pairs: failures first,
    /// successes second.
    pub async fn realtime_stats(
        &self,
    ) -> Result<(Vec<(String, String)>, Vec<(String, String)>), EngineError> {
        self.stats.realtime_stats().await
    }

    /// All failed records, oldest first.
    pub async fn failed(&self) -> Result<Vec<Job>, EngineError> {
        self.stats.failed().await
    }

    /// Look up a failed record by jid.
    pub async fn find_failed(&self, jid: &str) -> Result<Option<(Job, usize)>, EngineError> {
        self.stats.find_failed(jid).await
    }

    /// Remove one failed record by jid.
    pub async fn remove_failed(&self, jid: &str) -> Result<(), EngineError> {
        self.stats.remove_failed(jid).await
    }

    /// Reset the failed counter and drop the failed list.
    pub async fn clear_failed(&self) -> Result<(), EngineError> {
        self.stats.clear_failed().await
    }

    /// Move a failed record back onto its queue for another attempt,
    /// bumping `retry_count` and clearing the failure fields. Returns the
    /// jid.
    pub async fn retry_failed(&self, jid: &str) -> Result<String, EngineError> {
        let Some((job, _)) = self.stats.find_failed(jid).await? else {
            return Err(EngineError::NotFound(format!("failed job {jid}")));
        };
        self.stats.remove_failed(jid).await?;

        let mut job = job;
        job.retry_count = Some(job.retry_count.unwrap_or(0) + 1);
        job.failed_at = None;
        job.error_class = None;
        job.error_message = None;
        let payload = serde_json::to_string(&job)?;
        self.queue.enqueue_raw(&job.queue, &payload).await
    }
}
