use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::JobError;

/// One scheduled invocation `(class, args)` with metadata, serialized with
/// exactly the field names external Sidekiq-format tooling expects.
///
/// The failure fields are absent until the job lands on the failed list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 24-hex-char unique identifier.
    pub jid: String,
    /// Name of the handler to invoke.
    pub class: String,
    /// Ordered handler arguments.
    pub args: Vec<serde_json::Value>,
    /// Owning queue name.
    pub queue: String,
    /// Floating seconds since the Unix epoch.
    pub enqueued_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl Job {
    /// Build a fresh job with a generated jid, stamped now.
    pub fn new(queue: &str, class: &str, args: Vec<serde_json::Value>) -> Self {
        Self {
            jid: new_jid(),
            class: class.to_string(),
            args,
            queue: queue.to_string(),
            enqueued_at: unix_epoch_seconds(Utc::now()),
            failed_at: None,
            error_class: None,
            error_message: None,
            retry_count: None,
        }
    }
}

/// Process-table entry for one currently executing worker. Membership
/// comparison for removal is by exact `(pid, host)` match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: String,
    pub host: String,
    pub job: Job,
    /// ISO 8601 local time.
    pub started_at: String,
}

/// Generate a 24-hex-char job identifier from 12 random bytes.
pub fn new_jid() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Stable unique identity for one worker task: `"<host>:<uuid>"`.
pub fn new_worker_pid(host: &str) -> String {
    format!("{host}:{}", Uuid::new_v4())
}

/// Hostname reported in the process table.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Floating seconds since the Unix epoch, microsecond resolution.
pub fn unix_epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_micros() as f64 / 1_000_000.0
}

/// Trait all job handlers implement. The handler owns its own deadlines;
/// the engine enforces none.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one job with its decoded arguments. An `Err` is recorded verbatim
    /// as the failure message.
    async fn perform(&self, args: Vec<serde_json::Value>) -> Result<(), JobError>;

    /// Class name clients enqueue this handler under.
    fn class_name(&self) -> String;
}

/// Lookup from job class name to its handler.
pub(crate) type HandlerRegistry = HashMap<String, Arc<dyn JobHandler>>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn jids_are_24_hex_chars_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let jid = new_jid();
            assert_eq!(jid.len(), 24);
            assert!(jid.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(jid));
        }
    }

    #[test]
    fn worker_pids_carry_the_host_prefix() {
        let pid = new_worker_pid("box-1");
        assert!(pid.starts_with("box-1:"));
        assert_ne!(pid, new_worker_pid("box-1"));
    }

    #[test]
    fn epoch_seconds_keep_subsecond_precision() {
        let now = Utc.timestamp_micros(1_577_934_245_500_000).unwrap();
        assert_eq!(unix_epoch_seconds(now), 1_577_934_245.5);
    }

    #[test]
    fn job_serializes_with_the_wire_field_names() {
        let job = Job::new("default", "SendWorker", vec![serde_json::json!("a")]);
        let value: serde_json::Value = serde_json::to_value(&job).unwrap();
        let object = value.as_object().unwrap();
        for field in ["jid", "class", "args", "queue", "enqueued_at"] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        // Failure fields stay off the wire until the job actually fails.
        for field in ["failed_at", "error_class", "error_message", "retry_count"] {
            assert!(!object.contains_key(field), "unexpected field {field}");
        }
        assert!(object["enqueued_at"].is_f64());
    }

    #[test]
    fn job_decodes_from_an_external_payload() {
        let payload = r#"{
            "jid": "6dd00b8a92de9834c5bd4e71",
            "class": "HardWorker",
            "args": ["alice", 5],
            "queue": "critical",
            "enqueued_at": 1577934245.123456
        }"#;
        let job: Job = serde_json::from_str(payload).unwrap();
        assert_eq!(job.jid, "6dd00b8a92de9834c5bd4e71");
        assert_eq!(job.class, "HardWorker");
        assert_eq!(job.queue, "critical");
        assert_eq!(job.args.len(), 2);
        assert!(job.error_message.is_none());
    }

    #[test]
    fn process_entry_round_trips() {
        let job = Job::new("default", "SendWorker", vec![]);
        let entry = ProcessInfo {
            pid: "box-1:2b1f".to_string(),
            host: "box-1".to_string(),
            job,
            started_at: "2020-01-02T03:04:05+00:00".to_string(),
        };
        let raw = serde_json::to_string(&entry).unwrap();
        let decoded: ProcessInfo = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.pid, entry.pid);
        assert_eq!(decoded.host, entry.host);
        assert_eq!(decoded.job.jid, entry.job.jid);
    }
}
