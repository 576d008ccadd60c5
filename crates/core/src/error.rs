//! Error model shared by the worker and its collaborators.

use thiserror::Error;

/// Failure raised by a database connection.
///
/// A probe failure is never surfaced to the worker's caller; it drives the
/// close + reconnect path instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The link to the server went away (server restart, idle timeout, ...).
    #[error("connection lost: {0}")]
    Lost(String),

    /// A statement could not be executed.
    #[error("query failed: {0}")]
    Query(String),

    /// Opening a fresh link failed.
    #[error("connect failed: {0}")]
    Connect(String),
}

impl ConnectionError {
    pub fn lost(msg: impl Into<String>) -> Self {
        Self::Lost(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }
}

/// Failure raised by a queue backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No queue is configured under the requested connection name.
    #[error("unknown queue connection: {0}")]
    UnknownConnection(String),

    /// The backend failed to serve the request.
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl QueueError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Anything the worker hands to the exception reporter.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job body returned an error.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The job body panicked.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// The job was attempted more times than allowed.
    #[error("job {job_id} has been attempted too many times ({attempts} of {max_tries})")]
    MaxAttemptsExceeded {
        job_id: String,
        attempts: u32,
        max_tries: u32,
    },

    /// Resolving or popping from the queue failed.
    #[error("queue unavailable: {0}")]
    Queue(#[from] QueueError),

    /// Reconnecting to the database failed.
    #[error("database reconnect failed: {0}")]
    Connection(#[from] ConnectionError),
}

impl JobError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_stringified() {
        let err = JobError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "job panicked: boom");

        let err = JobError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "job panicked: owned boom");

        let err = JobError::from_panic(Box::new(42_u8));
        assert_eq!(err.to_string(), "job panicked: non-string panic payload");
    }

    #[test]
    fn job_body_errors_display_transparently() {
        let err: JobError = anyhow::anyhow!("mailbox full").into();
        assert_eq!(err.to_string(), "mailbox full");
    }

    #[test]
    fn reconnect_errors_convert() {
        let err: JobError = ConnectionError::connect("refused").into();
        assert!(matches!(err, JobError::Connection(ConnectionError::Connect(_))));
        assert_eq!(err.to_string(), "database reconnect failed: connect failed: refused");
    }
}
