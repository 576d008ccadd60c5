//! Single-job execution loop guarded by persistence-session health checks.
//!
//! ## Iteration
//!
//! ```text
//! resolve queue → pop job
//!   ↓
//! session open?        no → release pending job, raise halt flag, stop
//!   ↓ yes
//! connection probe ok? no → close + reconnect, release pending job, stop
//!   ↓ yes                   (unless ReconnectPolicy::Continue)
//! clear session
//!   ↓
//! fire job → processed | exception → report, release pending job
//! ```
//!
//! The halt flag is the only stop signal this module produces. It is raised
//! when the session is found closed and never lowered again: a closed session
//! cannot be reopened from inside the process.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use jobguard_core::{
    Connection, ConnectionError, ExceptionReporter, Job, JobDisposition, JobError,
    PersistenceSession, Queue, QueueError, QueueManager, WorkerId,
};
use jobguard_events::{Dispatcher, JobEvent};

use crate::options::{ReconnectPolicy, WorkerOptions};

/// Read-only view of a worker's halt flag, shareable with a supervisor thread.
#[derive(Debug, Clone, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Result of the connection check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    /// The probe round-tripped; nothing else was touched.
    Healthy,
    /// The probe failed; the connection was closed and reopened.
    Reconnected,
    /// The probe failed and so did reopening the connection.
    ReconnectFailed(ConnectionError),
}

/// What a single `run_next_job` call did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No job was available.
    Idle,
    /// The queue could not be resolved or popped.
    QueueUnavailable,
    /// The session was closed; the halt flag is now set.
    Halted,
    /// The connection was repaired instead of running the job.
    Reconnected,
    /// The connection could not be repaired.
    ReconnectFailed,
    /// The job ran to completion.
    Processed,
    /// The job errored and was released back onto its queue.
    Requeued,
    /// The job errored and is now marked failed.
    Failed,
    /// The job errored and had already been deleted or released by its body.
    Errored,
}

/// Why the daemon loop returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The halt flag was raised by a closed session.
    Halted,
    /// The shutdown signal was raised.
    Interrupted,
    /// The memory gauge reached the configured limit.
    MemoryExceeded,
    /// The queue was empty and `stop_when_empty` is set.
    QueueEmpty,
}

impl core::fmt::Display for StopReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            StopReason::Halted => "halted",
            StopReason::Interrupted => "interrupted",
            StopReason::MemoryExceeded => "memory_exceeded",
            StopReason::QueueEmpty => "queue_empty",
        };
        f.write_str(s)
    }
}

type Predicate = Box<dyn Fn() -> bool + Send + Sync>;
type MemoryGauge = Box<dyn Fn() -> u64 + Send + Sync>;

/// Queue worker bound to one persistence session.
pub struct Worker<M, S> {
    id: WorkerId,
    manager: M,
    dispatcher: Arc<dyn Dispatcher>,
    session: S,
    reporter: Arc<dyn ExceptionReporter>,
    is_down_for_maintenance: Predicate,
    memory_gauge: Option<MemoryGauge>,
    halt: HaltFlag,
}

impl<M, S> core::fmt::Debug for Worker<M, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("should_quit", &self.halt.is_set())
            .finish_non_exhaustive()
    }
}

impl<M, S> Worker<M, S>
where
    M: QueueManager,
    S: PersistenceSession,
{
    pub fn new<F>(
        manager: M,
        dispatcher: Arc<dyn Dispatcher>,
        session: S,
        reporter: Arc<dyn ExceptionReporter>,
        is_down_for_maintenance: F,
    ) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            id: WorkerId::new(),
            manager,
            dispatcher,
            session,
            reporter,
            is_down_for_maintenance: Box::new(is_down_for_maintenance),
            memory_gauge: None,
            halt: HaltFlag::default(),
        }
    }

    pub fn with_id(mut self, id: WorkerId) -> Self {
        self.id = id;
        self
    }

    /// Install a gauge returning the process's current memory use in bytes.
    ///
    /// Without a gauge the daemon never stops for memory.
    pub fn with_memory_gauge<G>(mut self, gauge: G) -> Self
    where
        G: Fn() -> u64 + Send + Sync + 'static,
    {
        self.memory_gauge = Some(Box::new(gauge));
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Whether the worker must stop accepting iterations.
    pub fn should_quit(&self) -> bool {
        self.halt.is_set()
    }

    pub fn halt_flag(&self) -> HaltFlag {
        self.halt.clone()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Pop and process at most one job.
    ///
    /// Never fails: every error is either recovered, reported, or turned into
    /// the halt flag.
    pub fn run_next_job(
        &mut self,
        connection_name: &str,
        queue_name: &str,
        options: &WorkerOptions,
    ) -> RunOutcome {
        let queue = match self.manager.connection(connection_name) {
            Ok(queue) => queue,
            Err(err) => {
                warn!(worker = %self.id, connection = connection_name, error = %err, "queue connection unavailable");
                self.report(JobError::Queue(err));
                return RunOutcome::QueueUnavailable;
            }
        };

        let mut job = match next_job(queue.as_ref(), queue_name) {
            Ok(Some(job)) => job,
            Ok(None) => return RunOutcome::Idle,
            Err(err) => {
                warn!(worker = %self.id, queue = queue_name, error = %err, "failed to pop job");
                self.report(JobError::Queue(err));
                return RunOutcome::QueueUnavailable;
            }
        };

        debug!(worker = %self.id, job_id = job.id(), job = job.name(), queue = queue_name, "popped job");

        if !self.session.is_open() {
            self.release_if_pending(&mut *job, options.delay);
            self.halt.set();
            error!(
                worker = %self.id,
                job_id = job.id(),
                "persistence session is closed; worker must be restarted"
            );
            return RunOutcome::Halted;
        }

        match self.check_connection() {
            ConnectionCheck::Healthy => {}
            ConnectionCheck::Reconnected
                if options.reconnect_policy == ReconnectPolicy::Continue => {}
            ConnectionCheck::Reconnected => {
                self.release_if_pending(&mut *job, options.delay);
                return RunOutcome::Reconnected;
            }
            ConnectionCheck::ReconnectFailed(err) => {
                self.release_if_pending(&mut *job, options.delay);
                self.report(JobError::Connection(err));
                return RunOutcome::ReconnectFailed;
            }
        }

        self.session.clear();

        self.process(queue.connection_name(), &mut *job, options)
    }

    /// Probe the session's connection, reopening it if the probe fails.
    ///
    /// Never fails. On a healthy connection this costs one round-trip and
    /// touches nothing else.
    pub fn check_connection(&mut self) -> ConnectionCheck {
        let connection = self.session.connection();

        let Err(err) = connection.ping() else {
            return ConnectionCheck::Healthy;
        };

        warn!(worker = %self.id, error = %err, "database connection probe failed; reconnecting");
        connection.close();

        match connection.connect() {
            Ok(()) => {
                info!(worker = %self.id, "database connection reopened");
                ConnectionCheck::Reconnected
            }
            Err(err) => {
                error!(worker = %self.id, error = %err, "database reconnect failed");
                ConnectionCheck::ReconnectFailed(err)
            }
        }
    }

    /// Process jobs until a stop condition is met.
    ///
    /// Between iterations: stop on the halt flag, the `shutdown` signal, or the
    /// memory limit; while in maintenance mode, sleep instead of popping.
    /// Iterations that find no job or hit a connection error sleep for
    /// `options.sleep` before the next attempt.
    pub fn daemon(
        &mut self,
        connection_name: &str,
        queue_name: &str,
        options: &WorkerOptions,
        shutdown: &AtomicBool,
    ) -> StopReason {
        info!(worker = %self.id, connection = connection_name, queue = queue_name, "worker started");

        loop {
            if let Some(reason) = self.stop_reason(options, shutdown) {
                return self.stop(connection_name, reason);
            }

            if (self.is_down_for_maintenance)() {
                debug!(worker = %self.id, "down for maintenance; not popping");
                pause(options.sleep);
                continue;
            }

            match self.run_next_job(connection_name, queue_name, options) {
                RunOutcome::Idle if options.stop_when_empty => {
                    return self.stop(connection_name, StopReason::QueueEmpty);
                }
                RunOutcome::Idle | RunOutcome::QueueUnavailable | RunOutcome::ReconnectFailed => {
                    pause(options.sleep);
                }
                _ => {}
            }
        }
    }

    fn stop_reason(&self, options: &WorkerOptions, shutdown: &AtomicBool) -> Option<StopReason> {
        if self.halt.is_set() {
            return Some(StopReason::Halted);
        }
        if shutdown.load(Ordering::SeqCst) {
            return Some(StopReason::Interrupted);
        }
        if self.memory_exceeded(options.memory_limit_mb) {
            return Some(StopReason::MemoryExceeded);
        }
        None
    }

    fn memory_exceeded(&self, limit_mb: u64) -> bool {
        match &self.memory_gauge {
            Some(gauge) if limit_mb > 0 => gauge() / 1024 / 1024 >= limit_mb,
            _ => false,
        }
    }

    fn stop(&self, connection_name: &str, reason: StopReason) -> StopReason {
        info!(worker = %self.id, %reason, "worker stopping");
        self.dispatcher
            .dispatch(JobEvent::worker_stopping(self.id, connection_name, &reason));
        reason
    }

    fn process(&mut self, connection_name: &str, job: &mut dyn Job, options: &WorkerOptions) -> RunOutcome {
        self.dispatcher
            .dispatch(JobEvent::processing(self.id, connection_name, &*job));

        if options.max_tries > 0 && job.attempts() > options.max_tries {
            let err = max_attempts_error(job, options.max_tries);
            warn!(worker = %self.id, job_id = job.id(), attempts = job.attempts(), "job exceeded max attempts before running");
            job.fail(&err);
            self.dispatcher
                .dispatch(JobEvent::exception_occurred(self.id, connection_name, &*job, &err));
            self.dispatcher
                .dispatch(JobEvent::failed(self.id, connection_name, &*job, &err));
            self.report(err);
            return RunOutcome::Failed;
        }

        if job.disposition() == JobDisposition::Deleted {
            self.dispatcher
                .dispatch(JobEvent::processed(self.id, connection_name, &*job));
            return RunOutcome::Processed;
        }

        let started = Instant::now();
        let result = fire_guarded(job);
        let elapsed = started.elapsed();

        if !options.timeout.is_zero() && elapsed > options.timeout {
            warn!(
                worker = %self.id,
                job_id = job.id(),
                ?elapsed,
                timeout_secs = options.timeout.as_secs(),
                "job ran past its timeout"
            );
        }

        match result {
            Ok(()) => {
                debug!(worker = %self.id, job_id = job.id(), ?elapsed, "job processed");
                self.dispatcher
                    .dispatch(JobEvent::processed(self.id, connection_name, &*job));
                RunOutcome::Processed
            }
            Err(err) => self.handle_job_exception(connection_name, job, err, options),
        }
    }

    fn handle_job_exception(
        &mut self,
        connection_name: &str,
        job: &mut dyn Job,
        err: JobError,
        options: &WorkerOptions,
    ) -> RunOutcome {
        warn!(worker = %self.id, job_id = job.id(), error = %err, "job raised an error");

        if job.disposition() != JobDisposition::Failed
            && options.max_tries > 0
            && job.attempts() >= options.max_tries
        {
            let exhausted = max_attempts_error(job, options.max_tries);
            job.fail(&exhausted);
        }

        self.dispatcher
            .dispatch(JobEvent::exception_occurred(self.id, connection_name, &*job, &err));

        let outcome = match job.disposition() {
            JobDisposition::Failed => {
                self.dispatcher
                    .dispatch(JobEvent::failed(self.id, connection_name, &*job, &err));
                RunOutcome::Failed
            }
            JobDisposition::Pending => {
                self.release_if_pending(job, options.delay);
                RunOutcome::Requeued
            }
            JobDisposition::Deleted | JobDisposition::Released => RunOutcome::Errored,
        };

        self.report(err);
        outcome
    }

    fn release_if_pending(&self, job: &mut dyn Job, delay: Duration) -> bool {
        let disposition = job.disposition();
        if !disposition.is_pending() {
            debug!(worker = %self.id, job_id = job.id(), %disposition, "job left as is");
            return false;
        }

        job.release(delay);
        warn!(worker = %self.id, job_id = job.id(), delay_secs = delay.as_secs(), "job released back onto queue");
        true
    }

    fn report(&self, err: JobError) {
        self.reporter.report(&err);
    }
}

/// Pop from each comma-separated queue in turn; the first job found wins.
fn next_job(queue: &dyn Queue, queue_name: &str) -> Result<Option<Box<dyn Job>>, QueueError> {
    for name in queue_name.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(job) = queue.pop(name)? {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

/// Fire a job, capturing both returned errors and panics.
fn fire_guarded(job: &mut dyn Job) -> Result<(), JobError> {
    match catch_unwind(AssertUnwindSafe(|| job.fire())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(JobError::Failed(err)),
        Err(payload) => Err(JobError::from_panic(payload)),
    }
}

fn max_attempts_error(job: &dyn Job, max_tries: u32) -> JobError {
    JobError::MaxAttemptsExceeded {
        job_id: job.id().to_string(),
        attempts: job.attempts(),
        max_tries,
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
