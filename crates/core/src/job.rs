//! Unit-of-work contract.
//!
//! A job is popped from a queue, fired once by the worker, and reports its own
//! disposition afterwards. Running a job may change its disposition (a job can
//! delete, release or fail itself), so the worker asks again at every decision
//! point instead of caching the answer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Where a job stands after (or before) it runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobDisposition {
    /// None of the terminal states apply; the job may still be released.
    Pending,
    /// Removed from the queue.
    Deleted,
    /// Already pushed back onto the queue.
    Released,
    /// Marked as permanently failed.
    Failed,
}

impl JobDisposition {
    /// Collapse the three independent probes into one disposition.
    ///
    /// Priority is fixed: deleted, then released, then failed.
    pub fn from_probes(deleted: bool, released: bool, failed: bool) -> Self {
        if deleted {
            Self::Deleted
        } else if released {
            Self::Released
        } else if failed {
            Self::Failed
        } else {
            Self::Pending
        }
    }

    /// Only a pending job may be released back onto its queue.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl core::fmt::Display for JobDisposition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Deleted => "deleted",
            Self::Released => "released",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A job popped from a queue.
pub trait Job: Send {
    /// Backend-assigned identifier.
    fn id(&self) -> &str;

    /// Human-readable job name (usually the handler type).
    fn name(&self) -> &str;

    /// Run the job's business logic.
    fn fire(&mut self) -> anyhow::Result<()>;

    /// Current disposition, evaluated fresh on every call.
    fn disposition(&self) -> JobDisposition;

    /// Push the job back onto its queue, visible again after `delay`.
    fn release(&mut self, delay: Duration);

    /// How many times the job has been reserved, including the current one.
    fn attempts(&self) -> u32;

    /// Mark the job as permanently failed.
    fn fail(&mut self, error: &JobError);
}
