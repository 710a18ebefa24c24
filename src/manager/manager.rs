use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::api::Api;
use crate::config::EngineConfig;
use crate::gateway::redis::RedisGateway;
use crate::job::job::{local_hostname, HandlerRegistry, Job, JobHandler};
use crate::manager::error::EngineError;
use crate::queue::queue::JobQueue;
use crate::stats::server::{StatsMessage, StatsServer};
use crate::stats::stats::Stats;
use crate::worker::worker::{Worker, WorkerOutcome};

/// Requests the manager serializes with its poll tick.
#[derive(Debug)]
enum Command {
    Enqueue {
        queue: String,
        class: String,
        args: Vec<serde_json::Value>,
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
    FindJob {
        queue: String,
        jid: String,
        reply: oneshot::Sender<Result<Option<(Job, usize)>, EngineError>>,
    },
    FindFailed {
        jid: String,
        reply: oneshot::Sender<Result<Option<(Job, usize)>, EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable client for a running [`Manager`].
///
/// Requests travel over the manager's command channel and are handled
/// between poll ticks, so external callers and the dispatcher cannot
/// interleave on shared state.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Enqueue a job. Returns the generated jid.
    pub async fn enqueue(
        &self,
        queue: &str,
        class: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Enqueue {
                queue: queue.to_string(),
                class: class.to_string(),
                args,
                reply,
            })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Look up a pending job by jid.
    pub async fn find_job(
        &self,
        queue: &str,
        jid: &str,
    ) -> Result<Option<(Job, usize)>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::FindJob {
                queue: queue.to_string(),
                jid: jid.to_string(),
                reply,
            })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Look up a failed record by jid.
    pub async fn find_failed(&self, jid: &str) -> Result<Option<(Job, usize)>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::FindFailed {
                jid: jid.to_string(),
                reply,
            })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Stop the manager. Resolves once the stats loop has drained and
    /// exited; in-flight workers are not awaited and their reports may be
    /// dropped.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stop { reply })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }
}

/// The dispatcher: polls the queues on a timer, obeys the concurrency
/// budget, spawns workers, and forwards their outcomes to the stats engine.
///
/// Exactly one of {poll, external request, worker outcome} executes at a
/// time; workers run as parallel independent tasks, up to `concurrency` of
/// them.
pub struct Manager {
    config: EngineConfig,
    gateway: Arc<RedisGateway>,
    queue: JobQueue,
    stats: Arc<Stats>,
    handlers: HandlerRegistry,
    host: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl Manager {
    /// Build a manager over an existing gateway.
    pub fn new(gateway: Arc<RedisGateway>, config: EngineConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let queue = JobQueue::new(gateway.clone(), config.namespace.clone());
        let stats = Arc::new(Stats::new(gateway.clone(), config.namespace.clone()));
        Self {
            config,
            gateway,
            queue,
            stats,
            handlers: HandlerRegistry::new(),
            host: local_hostname(),
            cmd_tx,
            cmd_rx,
        }
    }

    /// Connect to Redis per the config and build a manager.
    pub async fn connect(config: EngineConfig) -> Result<Self, EngineError> {
        let gateway = RedisGateway::connect(&config.redis_url()).await?;
        Ok(Self::new(Arc::new(gateway), config))
    }

    /// Register the handler invoked for jobs enqueued under `class`.
    pub fn register_handler(&mut self, class: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(class.into(), handler);
    }

    /// Client for the running manager. May be taken before `run`.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.cmd_tx.clone(),
        }
    }

    /// Admin surface sharing this manager's connection and namespace.
    pub fn api(&self) -> Api {
        Api::new(self.gateway.clone(), self.config.namespace.clone())
    }

    /// Run the dispatch loop until [`EngineHandle::stop`] or a termination
    /// signal. Consumes the manager; handles stay valid until it returns.
    pub async fn run(self) -> Result<(), EngineError> {
        let Manager {
            config,
            gateway: _gateway,
            queue,
            stats,
            handlers,
            host,
            cmd_tx: _cmd_tx,
            mut cmd_rx,
        } = self;

        info!(
            queues = ?config.queues,
            concurrency = config.concurrency,
            namespace = %config.namespace,
            "starting job manager"
        );

        let (stats_tx, stats_rx) = mpsc::unbounded_channel();
        let stats_server = tokio::spawn(StatsServer::new(stats.clone(), stats_rx).run());

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<WorkerOutcome>();
        let handlers = Arc::new(handlers);
        let mut busy: HashSet<String> = HashSet::new();
        let mut stop_reply: Option<oneshot::Sender<()>> = None;

        let poll_timeout = Duration::from_millis(config.poll_timeout_ms);
        let reconnect_sleep = Duration::from_millis(config.reconnect_on_sleep_ms);
        let mut delay = Duration::ZERO;

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                Some(command) = cmd_rx.recv() => match command {
                    Command::Enqueue { queue: name, class, args, reply } => {
                        let _ = reply.send(queue.enqueue(&name, &class, args).await);
                    }
                    Command::FindJob { queue: name, jid, reply } => {
                        let _ = reply.send(queue.find_job(&name, &jid).await);
                    }
                    Command::FindFailed { jid, reply } => {
                        let _ = reply.send(stats.find_failed(&jid).await);
                    }
                    Command::Stop { reply } => {
                        stop_reply = Some(reply);
                        break;
                    }
                },
                Some(outcome) = outcome_rx.recv() => match outcome {
                    WorkerOutcome::Success { pid, host, job } => {
                        busy.remove(&pid);
                        let _ = stats_tx.send(StatsMessage::Processed(job));
                        let _ = stats_tx.send(StatsMessage::RemoveProcess { host, pid });
                    }
                    WorkerOutcome::Failure { pid, host, error, job } => {
                        busy.remove(&pid);
                        let _ = stats_tx.send(StatsMessage::Failed { error, job });
                        let _ = stats_tx.send(StatsMessage::RemoveProcess { host, pid });
                    }
                    WorkerOutcome::Skipped { pid } => {
                        busy.remove(&pid);
                    }
                },
                _ = &mut shutdown => {
                    info!("termination signal received, stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    delay = if busy.len() >= config.concurrency {
                        poll_timeout
                    } else {
                        match queue.dequeue(&config.queues).await {
                            Ok(Some(payload)) => {
                                let worker = Worker::new(
                                    host.clone(),
                                    payload,
                                    handlers.clone(),
                                    stats_tx.clone(),
                                    outcome_tx.clone(),
                                );
                                busy.insert(worker.pid().to_string());
                                worker.spawn();
                                // Queue is hot: re-poll without sleeping.
                                Duration::ZERO
                            }
                            Ok(None) => poll_timeout,
                            Err(err) => {
                                warn!(error = %err, "dequeue failed, retrying after backoff");
                                reconnect_sleep
                            }
                        }
                    };
                }
            }
        }

        // Stop the stats loop after the casts already queued; anything a
        // still-running worker reports from here on is dropped.
        let _ = stats_tx.send(StatsMessage::Stop);
        let _ = stats_server.await;
        if let Some(reply) = stop_reply {
            let _ = reply.send(());
        }
        info!("job manager stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C signal"); },
        _ = terminate => { info!("received SIGTERM signal"); },
    }
}
