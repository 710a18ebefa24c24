use thiserror::Error;

/// Failure reported by a job handler. The message is recorded verbatim in
/// the failed-job record's `error_message` field.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct JobError(pub String);

impl JobError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
