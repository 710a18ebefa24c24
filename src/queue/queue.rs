use std::sync::Arc;

use tracing::{debug, warn};

use crate::gateway::keys;
use crate::gateway::redis::RedisGateway;
use crate::job::job::Job;
use crate::manager::error::EngineError;

/// Enqueue, dequeue, peek, and removal over the named queue lists.
///
/// Queue priority is entirely the caller's policy: [`JobQueue::dequeue`]
/// tries queues in the order given and is not atomic across them, so under
/// multi-consumer load a strict priority policy is best-effort.
#[derive(Clone)]
pub struct JobQueue {
    gateway: Arc<RedisGateway>,
    namespace: String,
}

impl JobQueue {
    pub fn new(gateway: Arc<RedisGateway>, namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            namespace: namespace.into(),
        }
    }

    /// Enqueue a new job, registering its queue. Returns the generated jid.
    pub async fn enqueue(
        &self,
        queue: &str,
        class: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<String, EngineError> {
        let job = Job::new(queue, class, args);
        let payload = serde_json::to_string(&job)?;
        self.gateway
            .sadd(&keys::queues_key(&self.namespace), queue)
            .await?;
        self.gateway
            .rpush(&keys::queue_key(&self.namespace, queue), &payload)
            .await?;
        debug!(jid = %job.jid, queue = %queue, class = %class, "job enqueued");
        Ok(job.jid)
    }

    /// Push an already-serialized job payload verbatim. Used by retry and
    /// requeue paths; the stored bytes stay the caller's, only the jid is
    /// read out of them.
    pub async fn enqueue_raw(&self, queue: &str, payload: &str) -> Result<String, EngineError> {
        let job: Job = serde_json::from_str(payload)?;
        self.gateway
            .sadd(&keys::queues_key(&self.namespace), queue)
            .await?;
        self.gateway
            .rpush(&keys::queue_key(&self.namespace, queue), payload)
            .await?;
        debug!(jid = %job.jid, queue = %queue, "raw job enqueued");
        Ok(job.jid)
    }

    /// Pop the first available job payload, trying queues in the order
    /// given. Between two pops another consumer may drain a later queue.
    pub async fn dequeue(&self, queues: &[String]) -> Result<Option<String>, EngineError> {
        for queue in queues {
            let key = keys::queue_key(&self.namespace, queue);
            if let Some(payload) = self.gateway.lpop(&key).await? {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }

    /// Scan a queue for a jid, returning the decoded job and its position.
    /// Malformed entries are skipped.
    pub async fn find_job(
        &self,
        queue: &str,
        jid: &str,
    ) -> Result<Option<(Job, usize)>, EngineError> {
        Ok(self
            .find_raw(queue, jid)
            .await?
            .map(|(_, job, index)| (job, index)))
    }

    /// Remove one pending job by jid. Returns whether anything was removed.
    pub async fn remove_job(&self, queue: &str, jid: &str) -> Result<bool, EngineError> {
        match self.find_raw(queue, jid).await? {
            Some((raw, _, _)) => {
                let removed = self
                    .gateway
                    .lrem(&keys::queue_key(&self.namespace, queue), 1, &raw)
                    .await?;
                Ok(removed > 0)
            }
            None => Ok(false),
        }
    }

    /// Every queue that has ever been enqueued to.
    pub async fn queues(&self) -> Result<Vec<String>, EngineError> {
        self.gateway
            .smembers(&keys::queues_key(&self.namespace))
            .await
    }

    /// Drop a queue from the registry along with its pending jobs.
    pub async fn remove_queue(&self, queue: &str) -> Result<(), EngineError> {
        self.gateway
            .srem(&keys::queues_key(&self.namespace), queue)
            .await?;
        self.gateway
            .del(&keys::queue_key(&self.namespace, queue))
            .await?;
        Ok(())
    }

    /// Decoded peek at a queue's pending jobs, oldest first. Malformed
    /// entries are skipped.
    pub async fn jobs(&self, queue: &str) -> Result<Vec<Job>, EngineError> {
        let entries = self
            .gateway
            .lrange(&keys::queue_key(&self.namespace, queue), 0, -1)
            .await?;
        let mut jobs = Vec::with_capacity(entries.len());
        for raw in entries {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!(queue = %queue, error = %err, "skipping malformed job record"),
            }
        }
        Ok(jobs)
    }

    /// Number of pending jobs in a queue.
    pub async fn queue_size(&self, queue: &str) -> Result<u64, EngineError> {
        self.gateway
            .llen(&keys::queue_key(&self.namespace, queue))
            .await
    }

    async fn find_raw(
        &self,
        queue: &str,
        jid: &str,
    ) -> Result<Option<(String, Job, usize)>, EngineError> {
        let entries = self
            .gateway
            .lrange(&keys::queue_key(&self.namespace, queue), 0, -1)
            .await?;
        for (index, raw) in entries.into_iter().enumerate() {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) if job.jid == jid => return Ok(Some((raw, job, index))),
                Ok(_) => {}
                Err(err) => warn!(queue = %queue, error = %err, "skipping malformed job record"),
            }
        }
        Ok(None)
    }
}
