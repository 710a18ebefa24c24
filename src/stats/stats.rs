use std::sync::Arc;

use chrono::{Local, Utc};
use tracing::warn;

use crate::gateway::keys;
use crate::gateway::redis::RedisGateway;
use crate::job::job::{Job, ProcessInfo};
use crate::manager::error::EngineError;

/// Error class stamped on failure records.
const GENERIC_ERROR_CLASS: &str = "GenericError";

/// Counters, realtime time-bucketed histograms, the failed-job list, and the
/// live process table.
///
/// Every operation is idempotent at the Redis level, but the counters are
/// not: callers must invoke each at most once per job outcome. The manager
/// guarantees that by funneling worker outcomes through one loop.
#[derive(Clone)]
pub struct Stats {
    gateway: Arc<RedisGateway>,
    namespace: String,
}

impl Stats {
    pub fn new(gateway: Arc<RedisGateway>, namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            namespace: namespace.into(),
        }
    }

    /// Insert a worker into the live process table. Runs before the worker's
    /// user code.
    pub async fn add_process(&self, process: &ProcessInfo) -> Result<(), EngineError> {
        let payload = serde_json::to_string(process)?;
        self.gateway
            .sadd(&keys::processes_key(&self.namespace), &payload)
            .await?;
        Ok(())
    }

    /// Remove the first process-table entry matching `(pid, host)`.
    pub async fn remove_process(&self, host: &str, pid: &str) -> Result<(), EngineError> {
        let key = keys::processes_key(&self.namespace);
        for raw in self.gateway.smembers(&key).await? {
            match serde_json::from_str::<ProcessInfo>(&raw) {
                Ok(entry) if entry.pid == pid && entry.host == host => {
                    self.gateway.srem(&key, &raw).await?;
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "skipping malformed process entry"),
            }
        }
        Err(EngineError::NotFound(format!("process {pid}")))
    }

    /// Count a success in the lifetime, realtime, and daily buckets.
    pub async fn record_processed(&self, _job: &Job) -> Result<(), EngineError> {
        let now = Utc::now();
        self.gateway
            .incr(&keys::stat_processed_key(&self.namespace))
            .await?;
        let realtime =
            keys::realtime_processed_key(&self.namespace, &keys::realtime_bucket(now));
        self.gateway.incr(&realtime).await?;
        self.gateway
            .expire(&realtime, keys::REALTIME_BUCKET_TTL_SECS)
            .await?;
        self.gateway
            .incr(&keys::stat_processed_date_key(
                &self.namespace,
                &keys::date_bucket(now),
            ))
            .await?;
        Ok(())
    }

    /// Count a failure and append the failure record to the failed list,
    /// newest at the right.
    pub async fn record_failure(&self, error: &str, job: &Job) -> Result<(), EngineError> {
        let now = Utc::now();
        self.gateway
            .incr(&keys::stat_failed_key(&self.namespace))
            .await?;
        let realtime = keys::realtime_failed_key(&self.namespace, &keys::realtime_bucket(now));
        self.gateway.incr(&realtime).await?;
        self.gateway
            .expire(&realtime, keys::REALTIME_BUCKET_TTL_SECS)
            .await?;
        self.gateway
            .incr(&keys::stat_failed_date_key(
                &self.namespace,
                &keys::date_bucket(now),
            ))
            .await?;

        let mut record = job.clone();
        record.failed_at = Some(Local::now().to_rfc3339());
        record.error_class = Some(GENERIC_ERROR_CLASS.to_string());
        record.error_message = Some(error.to_string());
        self.gateway
            .rpush(
                &keys::failed_key(&self.namespace),
                &serde_json::to_string(&record)?,
            )
            .await?;
        Ok(())
    }

    /// Scan the failed list for a jid, returning the decoded record and its
    /// position.
    pub async fn find_failed(&self, jid: &str) -> Result<Option<(Job, usize)>, EngineError> {
        Ok(self
            .find_failed_raw(jid)
            .await?
            .map(|(_, job, index)| (job, index)))
    }

    /// Remove one failed record by jid.
    ///
    /// The counter is decremented before the removal is confirmed and is not
    /// compensated on a miss; with concurrent removals it can go negative.
    /// That matches the wire-compatible contract, so it stays.
    pub async fn remove_failed(&self, jid: &str) -> Result<(), EngineError> {
        self.gateway
            .decr(&keys::stat_failed_key(&self.namespace))
            .await?;
        match self.find_failed_raw(jid).await? {
            Some((raw, _, _)) => {
                self.gateway
                    .lrem(&keys::failed_key(&self.namespace), 1, &raw)
                    .await?;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("failed job {jid}"))),
        }
    }

    /// Reset the failed counter and drop the failed list.
    pub async fn clear_failed(&self) -> Result<(), EngineError> {
        self.gateway
            .set(&keys::stat_failed_key(&self.namespace), "0")
            .await?;
        self.gateway.del(&keys::failed_key(&self.namespace)).await?;
        Ok(())
    }

    /// Drop the entire process table.
    pub async fn clear_processes(&self) -> Result<(), EngineError> {
        self.gateway
            .del(&keys::processes_key(&self.namespace))
            .await?;
        Ok(())
    }

    /// All failed records, oldest first. Malformed entries are skipped.
    pub async fn failed(&self) -> Result<Vec<Job>, EngineError> {
        let entries = self
            .gateway
            .lrange(&keys::failed_key(&self.namespace), 0, -1)
            .await?;
        let mut jobs = Vec::with_capacity(entries.len());
        for raw in entries {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => jobs.push(job),
                Err(err) => warn!(error = %err, "skipping malformed failed record"),
            }
        }
        Ok(jobs)
    }

    /// Per-second buckets as `(bucket label, count)` pairs: failures first,
    /// successes second. The KEYS scan is bounded because the bucket TTL
    /// caps the cardinality.
    pub async fn realtime_stats(
        &self,
    ) -> Result<(Vec<(String, String)>, Vec<(String, String)>), EngineError> {
        let failures = self
            .realtime_series(&keys::realtime_failed_prefix(&self.namespace))
            .await?;
        let successes = self
            .realtime_series(&keys::realtime_processed_prefix(&self.namespace))
            .await?;
        Ok((failures, successes))
    }

    /// Number of currently executing workers across the fleet.
    pub async fn busy(&self) -> Result<u64, EngineError> {
        self.gateway
            .scard(&keys::processes_key(&self.namespace))
            .await
    }

    /// Decoded process-table entries. Malformed entries are skipped.
    pub async fn processes(&self) -> Result<Vec<ProcessInfo>, EngineError> {
        let members = self
            .gateway
            .smembers(&keys::processes_key(&self.namespace))
            .await?;
        let mut entries = Vec::with_capacity(members.len());
        for raw in members {
            match serde_json::from_str::<ProcessInfo>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(error = %err, "skipping malformed process entry"),
            }
        }
        Ok(entries)
    }

    /// Lifetime processed counter.
    pub async fn processed_count(&self) -> Result<u64, EngineError> {
        let value = self
            .gateway
            .get(&keys::stat_processed_key(&self.namespace))
            .await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Lifetime failed counter. Signed because `remove_failed` can drive it
    /// negative.
    pub async fn failed_count(&self) -> Result<i64, EngineError> {
        let value = self
            .gateway
            .get(&keys::stat_failed_key(&self.namespace))
            .await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn realtime_series(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, EngineError> {
        let mut series = Vec::new();
        for key in self.gateway.keys(&format!("{prefix}*")).await? {
            let label = key[prefix.len()..].to_string();
            // A bucket can expire between the scan and the read.
            if let Some(count) = self.gateway.get(&key).await? {
                series.push((label, count));
            }
        }
        Ok(series)
    }

    async fn find_failed_raw(
        &self,
        jid: &str,
    ) -> Result<Option<(String, Job, usize)>, EngineError> {
        let entries = self
            .gateway
            .lrange(&keys::failed_key(&self.namespace), 0, -1)
            .await?;
        for (index, raw) in entries.into_iter().enumerate() {
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) if job.jid == jid => return Ok(Some((raw, job, index))),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "skipping malformed failed record"),
            }
        }
        Ok(None)
    }
}
