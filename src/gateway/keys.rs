//! Redis key layout shared by every component.
//!
//! All persistent state lives under a configurable namespace prefix. The key
//! families and job field names are wire-compatible with the Sidekiq data
//! layout, so third-party dashboards reading that format keep working.

use chrono::{DateTime, Utc};

/// Namespace prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "exq";

/// TTL in seconds applied to per-second realtime counter buckets.
pub const REALTIME_BUCKET_TTL_SECS: i64 = 120;

/// Set of every queue name that has ever been enqueued to. Used for fast
/// lookups of all queue names without a scan; removal is explicit via the
/// admin surface.
pub fn queues_key(namespace: &str) -> String {
    format!("{namespace}:queues")
}

/// List of pending jobs for a single queue. Producers RPUSH, consumers LPOP,
/// so each queue is FIFO.
pub fn queue_key(namespace: &str, queue: &str) -> String {
    format!("{namespace}:queue:{queue}")
}

/// List of failed-job records, newest at the right.
pub fn failed_key(namespace: &str) -> String {
    format!("{namespace}:failed")
}

/// Set of currently executing workers across the fleet, one JSON entry per
/// worker.
pub fn processes_key(namespace: &str) -> String {
    format!("{namespace}:processes")
}

/// Lifetime processed counter.
pub fn stat_processed_key(namespace: &str) -> String {
    format!("{namespace}:stat:processed")
}

/// Lifetime failed counter.
pub fn stat_failed_key(namespace: &str) -> String {
    format!("{namespace}:stat:failed")
}

/// Persistent daily processed counter for a `%Y-%m-%d` UTC day.
pub fn stat_processed_date_key(namespace: &str, date: &str) -> String {
    format!("{namespace}:stat:processed:{date}")
}

/// Persistent daily failed counter for a `%Y-%m-%d` UTC day.
pub fn stat_failed_date_key(namespace: &str, date: &str) -> String {
    format!("{namespace}:stat:failed:{date}")
}

/// Per-second processed bucket; carries [`REALTIME_BUCKET_TTL_SECS`].
pub fn realtime_processed_key(namespace: &str, bucket: &str) -> String {
    format!("{}{bucket}", realtime_processed_prefix(namespace))
}

/// Per-second failed bucket; carries [`REALTIME_BUCKET_TTL_SECS`].
pub fn realtime_failed_key(namespace: &str, bucket: &str) -> String {
    format!("{}{bucket}", realtime_failed_prefix(namespace))
}

/// Prefix stripped from realtime processed keys to recover bucket labels.
pub fn realtime_processed_prefix(namespace: &str) -> String {
    format!("{namespace}:stat:processed_rt:")
}

/// Prefix stripped from realtime failed keys to recover bucket labels.
pub fn realtime_failed_prefix(namespace: &str) -> String {
    format!("{namespace}:stat:failed_rt:")
}

/// Second-resolution UTC label for realtime buckets.
pub fn realtime_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S %z").to_string()
}

/// UTC day label for daily counters.
pub fn date_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}
