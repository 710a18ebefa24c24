use redis::RedisError;
use thiserror::Error;

/// Engine-level error kinds. Worker-level failures never surface here; they
/// are reported as job failure outcomes instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection or command failure. Fatal to the current operation; the
    /// caller retries on its next tick.
    #[error("redis unavailable: {0}")]
    RedisUnavailable(String),

    #[error("malformed job JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no handler registered for class {0}")]
    ClassNotFound(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The manager is no longer accepting requests.
    #[error("engine stopped")]
    Stopped,
}

impl From<RedisError> for EngineError {
    fn from(err: RedisError) -> Self {
        EngineError::RedisUnavailable(err.to_string())
    }
}
