use serde::{Deserialize, Serialize};

/// Engine configuration. Every field has a deployment-friendly default, so
/// partial config files deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: String,
    /// Redis key prefix isolating one logical deployment.
    pub namespace: String,
    /// Queues polled, in priority order.
    pub queues: Vec<String>,
    /// Sleep between polls when the queues are empty or the budget is full.
    pub poll_timeout_ms: u64,
    /// Sleep before re-polling after a Redis failure.
    pub reconnect_on_sleep_ms: u64,
    /// Maximum number of simultaneously executing workers.
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: String::new(),
            namespace: "exq".to_string(),
            queues: vec!["default".to_string()],
            poll_timeout_ms: 50,
            reconnect_on_sleep_ms: 100,
            concurrency: 25,
        }
    }
}

impl EngineConfig {
    /// Connection URL for the configured Redis server.
    pub fn redis_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.database
            )
        }
    }
}
