//! `jobguard-core`: collaborator contracts for the queue worker.
//!
//! This crate holds the seams the worker talks through (queue, job, persistence
//! session, connection, exception reporter) plus the shared error model. It
//! contains **no worker logic**.

pub mod error;
pub mod id;
pub mod job;
pub mod queue;
pub mod report;
pub mod session;

pub use error::{ConnectionError, JobError, QueueError};
pub use id::WorkerId;
pub use job::{Job, JobDisposition};
pub use queue::{Queue, QueueManager};
pub use report::{ExceptionReporter, TracingReporter};
pub use session::{Connection, PersistenceSession, Platform};
