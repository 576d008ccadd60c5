//! In-memory queue adapters for tests/dev.
//!
//! Jobs are closures pushed onto named FIFO queues. A released job goes back
//! to the tail of its queue and stays invisible until its delay expires; a
//! failed job is moved to a failed-job list for inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use jobguard_core::{Job, JobDisposition, JobError, Queue, QueueError, QueueManager};

/// Job body: receives a control handle, returns the job's result.
pub type JobHandler = Arc<dyn Fn(&mut JobControl) -> anyhow::Result<()> + Send + Sync>;

/// Handle a running job body uses to act on its own queue entry.
#[derive(Debug)]
pub struct JobControl {
    attempts: u32,
    delete: bool,
    release: Option<Duration>,
}

impl JobControl {
    /// Attempts so far, including the running one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Remove the job once the body returns.
    pub fn delete(&mut self) {
        self.delete = true;
    }

    /// Put the job back on its queue once the body returns.
    pub fn release(&mut self, delay: Duration) {
        self.release = Some(delay);
    }
}

#[derive(Clone)]
struct Envelope {
    id: String,
    name: String,
    attempts: u32,
    available_at: DateTime<Utc>,
    handler: JobHandler,
}

impl core::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .field("available_at", &self.available_at)
            .finish_non_exhaustive()
    }
}

/// A job that was failed permanently.
#[derive(Debug, Clone, Serialize)]
pub struct FailedJob {
    pub id: String,
    pub name: String,
    pub queue: String,
    pub attempts: u32,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Shelves {
    ready: HashMap<String, VecDeque<Envelope>>,
    failed: Vec<FailedJob>,
}

/// Saturates at the latest representable instant.
fn delay_from_now(delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// In-memory queue connection.
#[derive(Debug)]
pub struct InMemoryQueue {
    connection_name: String,
    shelves: Arc<RwLock<Shelves>>,
}

impl InMemoryQueue {
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            shelves: Arc::new(RwLock::new(Shelves::default())),
        }
    }

    pub fn arc(connection_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(connection_name))
    }

    /// Push a job onto `queue`; returns its id.
    pub fn push<F>(&self, queue: &str, name: impl Into<String>, handler: F) -> String
    where
        F: Fn(&mut JobControl) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push_envelope(queue, name.into(), Arc::new(handler), Utc::now())
    }

    /// Push a job that only becomes visible after `delay`.
    pub fn later<F>(&self, delay: Duration, queue: &str, name: impl Into<String>, handler: F) -> String
    where
        F: Fn(&mut JobControl) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push_envelope(queue, name.into(), Arc::new(handler), delay_from_now(delay))
    }

    fn push_envelope(
        &self,
        queue: &str,
        name: String,
        handler: JobHandler,
        available_at: DateTime<Utc>,
    ) -> String {
        let id = Uuid::now_v7().to_string();
        let envelope = Envelope {
            id: id.clone(),
            name,
            attempts: 0,
            available_at,
            handler,
        };
        if let Ok(mut shelves) = self.shelves.write() {
            shelves.ready.entry(queue.to_string()).or_default().push_back(envelope);
        }
        id
    }

    /// Jobs waiting on `queue`, delayed ones included.
    pub fn size(&self, queue: &str) -> usize {
        self.shelves
            .read()
            .map(|s| s.ready.get(queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Permanently failed jobs, oldest first.
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        self.shelves.read().map(|s| s.failed.clone()).unwrap_or_default()
    }
}

impl Queue for InMemoryQueue {
    fn connection_name(&self) -> &str {
        &self.connection_name
    }

    fn pop(&self, queue: &str) -> Result<Option<Box<dyn Job>>, QueueError> {
        let mut shelves = self
            .shelves
            .write()
            .map_err(|_| QueueError::backend("in-memory queue lock poisoned"))?;

        let Some(waiting) = shelves.ready.get_mut(queue) else {
            return Ok(None);
        };

        let now = Utc::now();
        let Some(pos) = waiting.iter().position(|e| e.available_at <= now) else {
            return Ok(None);
        };

        let Some(mut envelope) = waiting.remove(pos) else {
            return Ok(None);
        };
        envelope.attempts += 1;

        Ok(Some(Box::new(InMemoryJob {
            envelope,
            queue: queue.to_string(),
            shelves: Arc::clone(&self.shelves),
            deleted: false,
            released: false,
            failed: false,
        })))
    }
}

/// A job reserved from an [`InMemoryQueue`].
#[derive(Debug)]
pub struct InMemoryJob {
    envelope: Envelope,
    queue: String,
    shelves: Arc<RwLock<Shelves>>,
    deleted: bool,
    released: bool,
    failed: bool,
}

impl InMemoryJob {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn delete(&mut self) {
        self.deleted = true;
    }
}

impl Job for InMemoryJob {
    fn id(&self) -> &str {
        &self.envelope.id
    }

    fn name(&self) -> &str {
        &self.envelope.name
    }

    fn fire(&mut self) -> anyhow::Result<()> {
        let mut control = JobControl {
            attempts: self.envelope.attempts,
            delete: false,
            release: None,
        };

        let handler = Arc::clone(&self.envelope.handler);
        let result = handler(&mut control);

        if control.delete {
            self.delete();
        }
        if let Some(delay) = control.release {
            self.release(delay);
        }

        // A body that finished without touching its entry is done with it.
        if result.is_ok() && self.disposition().is_pending() {
            self.delete();
        }

        result
    }

    fn disposition(&self) -> JobDisposition {
        JobDisposition::from_probes(self.deleted, self.released, self.failed)
    }

    fn release(&mut self, delay: Duration) {
        self.released = true;

        let mut envelope = self.envelope.clone();
        envelope.available_at = delay_from_now(delay);
        if let Ok(mut shelves) = self.shelves.write() {
            shelves.ready.entry(self.queue.clone()).or_default().push_back(envelope);
        }
    }

    fn attempts(&self) -> u32 {
        self.envelope.attempts
    }

    fn fail(&mut self, error: &JobError) {
        self.failed = true;

        let record = FailedJob {
            id: self.envelope.id.clone(),
            name: self.envelope.name.clone(),
            queue: self.queue.clone(),
            attempts: self.envelope.attempts,
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        if let Ok(mut shelves) = self.shelves.write() {
            shelves.failed.push(record);
        }
    }
}

/// Resolves [`InMemoryQueue`]s by connection name.
#[derive(Debug, Default)]
pub struct InMemoryQueueManager {
    connections: HashMap<String, Arc<InMemoryQueue>>,
}

impl InMemoryQueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under its own connection name.
    pub fn with_queue(mut self, queue: Arc<InMemoryQueue>) -> Self {
        self.connections.insert(queue.connection_name.clone(), queue);
        self
    }
}

impl QueueManager for InMemoryQueueManager {
    fn connection(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError> {
        self.connections
            .get(name)
            .map(|q| Arc::clone(q) as Arc<dyn Queue>)
            .ok_or_else(|| QueueError::UnknownConnection(name.to_string()))
    }
}
