//! Job lifecycle events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use jobguard_core::{Job, WorkerId};

/// Identity of the job an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub id: String,
    pub name: String,
}

impl JobRef {
    pub fn of(job: &dyn Job) -> Self {
        Self {
            id: job.id().to_string(),
            name: job.name().to_string(),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// About to fire the job.
    Processing,
    /// The job ran to completion (or was already deleted).
    Processed,
    /// The job body returned an error or panicked.
    ExceptionOccurred { error: String },
    /// The job reports itself as permanently failed.
    Failed { error: String },
    /// The worker is leaving its loop.
    WorkerStopping { reason: String },
}

/// A lifecycle event emitted by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    event_id: Uuid,
    worker_id: WorkerId,
    connection_name: String,

    /// Absent for worker-level events.
    job: Option<JobRef>,

    kind: JobEventKind,
    occurred_at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(
        worker_id: WorkerId,
        connection_name: impl Into<String>,
        job: Option<JobRef>,
        kind: JobEventKind,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            worker_id,
            connection_name: connection_name.into(),
            job,
            kind,
            occurred_at: Utc::now(),
        }
    }

    pub fn processing(worker_id: WorkerId, connection_name: &str, job: &dyn Job) -> Self {
        Self::new(worker_id, connection_name, Some(JobRef::of(job)), JobEventKind::Processing)
    }

    pub fn processed(worker_id: WorkerId, connection_name: &str, job: &dyn Job) -> Self {
        Self::new(worker_id, connection_name, Some(JobRef::of(job)), JobEventKind::Processed)
    }

    pub fn exception_occurred(
        worker_id: WorkerId,
        connection_name: &str,
        job: &dyn Job,
        error: &dyn core::fmt::Display,
    ) -> Self {
        Self::new(
            worker_id,
            connection_name,
            Some(JobRef::of(job)),
            JobEventKind::ExceptionOccurred {
                error: error.to_string(),
            },
        )
    }

    pub fn failed(
        worker_id: WorkerId,
        connection_name: &str,
        job: &dyn Job,
        error: &dyn core::fmt::Display,
    ) -> Self {
        Self::new(
            worker_id,
            connection_name,
            Some(JobRef::of(job)),
            JobEventKind::Failed {
                error: error.to_string(),
            },
        )
    }

    pub fn worker_stopping(
        worker_id: WorkerId,
        connection_name: &str,
        reason: &dyn core::fmt::Display,
    ) -> Self {
        Self::new(
            worker_id,
            connection_name,
            None,
            JobEventKind::WorkerStopping {
                reason: reason.to_string(),
            },
        )
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn job(&self) -> Option<&JobRef> {
        self.job.as_ref()
    }

    pub fn kind(&self) -> &JobEventKind {
        &self.kind
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
