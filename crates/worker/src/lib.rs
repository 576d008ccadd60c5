//! Queue worker that keeps a persistence session healthy around each job.
//!
//! ## Design
//!
//! - One job per iteration, synchronous, no internal parallelism
//! - Session and connection are checked (and the connection repaired) before
//!   any business logic runs
//! - A closed session halts the worker; everything else keeps it running
//! - Job failures are reported and turned into a requeue decision
//!
//! ## Components
//!
//! - `Worker`: single iteration (`run_next_job`) and the outer `daemon` loop
//! - `WorkerOptions`: per-invocation configuration
//! - `memory`: in-memory queue adapters for tests/dev

pub mod memory;
pub mod options;
pub mod worker;

pub use memory::{FailedJob, InMemoryJob, InMemoryQueue, InMemoryQueueManager, JobControl};
pub use options::{ConfigError, ReconnectPolicy, WorkerOptions};
pub use worker::{ConnectionCheck, HaltFlag, RunOutcome, StopReason, Worker};
