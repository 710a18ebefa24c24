//! sideq: a Redis-backed distributed background job processor for Rust,
//! wire-compatible with the Sidekiq data layout.
//!
//! Clients enqueue named jobs with argument payloads onto named queues; one
//! or more worker processes, possibly on different hosts, dequeue those jobs
//! and execute them asynchronously with at-most-one-active-attempt
//! semantics. The crate provides:
//! - **Sidekiq-compatible Redis layout** with the job JSON, key families,
//!   and counters existing dashboards already read
//! - **Priority polling** across an ordered queue list, FIFO within each
//!   queue
//! - **Bounded concurrency** with a dispatcher that never runs more than
//!   the configured number of workers at once
//! - **Failure capture** with handler errors and panics recorded as
//!   failed-job records, counters, and per-second realtime buckets
//! - **Live process table** tracking every executing worker across the
//!   fleet
//! - **Admin surface** for queue, failed-list, and process-table
//!   maintenance, including requeueing failed jobs
//! - **Graceful shutdown** on request or on Ctrl+C / SIGTERM
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use sideq::{EngineConfig, JobError, JobHandler, Manager};
//!
//! struct EmailHandler;
//!
//! #[async_trait]
//! impl JobHandler for EmailHandler {
//!     async fn perform(&self, args: Vec<Value>) -> Result<(), JobError> {
//!         let to = args
//!             .first()
//!             .and_then(|v| v.as_str())
//!             .ok_or_else(|| JobError::new("missing recipient"))?;
//!         println!("sending email to {to}");
//!         Ok(())
//!     }
//!
//!     fn class_name(&self) -> String {
//!         "EmailWorker".to_string()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut manager = Manager::connect(EngineConfig::default()).await?;
//!     manager.register_handler("EmailWorker", Arc::new(EmailHandler));
//!
//!     let handle = manager.handle();
//!     let api = manager.api();
//!     let engine = tokio::spawn(manager.run());
//!
//!     let jid = handle
//!         .enqueue("default", "EmailWorker", vec!["user@example.com".into()])
//!         .await?;
//!     println!("enqueued {jid}");
//!
//!     // ... later, from a dashboard or an operator shell:
//!     println!("processed so far: {}", api.processed_count().await?);
//!
//!     handle.stop().await?;
//!     engine.await??;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod gateway;
pub mod job;
pub mod manager;
pub mod queue;
pub mod stats;
pub(crate) mod worker;

pub use crate::api::Api;
pub use crate::config::EngineConfig;
pub use crate::gateway::redis::{create_redis_pool, RedisGateway, RedisPoolConfig};
pub use crate::job::error::JobError;
pub use crate::job::job::{Job, JobHandler, ProcessInfo};
pub use crate::manager::error::EngineError;
pub use crate::manager::manager::{EngineHandle, Manager};
pub use crate::queue::queue::JobQueue;
pub use crate::stats::stats::Stats;
