//! Recording fakes shared by the worker scenario tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobguard_core::{
    Connection, ConnectionError, ExceptionReporter, Job, JobDisposition, JobError,
    PersistenceSession, Platform, Queue, QueueError, QueueManager,
};
use jobguard_events::{BusDispatcher, EventBus, InMemoryEventBus, JobEvent, Subscription};
use jobguard_worker::{Worker, WorkerOptions};

// ---------------------------------------------------------------------------
// Session / connection
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeConnection {
    /// Number of upcoming probes that fail.
    pub failing_probes: usize,
    pub fail_connect: bool,
    pub platform_calls: usize,
    pub queries: Vec<String>,
    pub closes: usize,
    pub connects: usize,
}

impl Connection for FakeConnection {
    fn database_platform(&mut self) -> Result<Platform, ConnectionError> {
        self.platform_calls += 1;
        if self.failing_probes > 0 {
            self.failing_probes -= 1;
            return Err(ConnectionError::lost("MySQL server has gone away"));
        }
        Ok(Platform::MySql)
    }

    fn execute_query(&mut self, sql: &str) -> Result<(), ConnectionError> {
        self.queries.push(sql.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }

    fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connects += 1;
        if self.fail_connect {
            return Err(ConnectionError::connect("connection refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeSession {
    pub open: bool,
    pub clears: usize,
    pub conn: FakeConnection,
}

impl FakeSession {
    pub fn open() -> Self {
        Self {
            open: true,
            ..Default::default()
        }
    }

    pub fn closed() -> Self {
        Self::default()
    }

    pub fn with_broken_connection() -> Self {
        let mut session = Self::open();
        session.conn.failing_probes = 1;
        session
    }
}

impl PersistenceSession for FakeSession {
    type Conn = FakeConnection;

    fn is_open(&self) -> bool {
        self.open
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn connection(&mut self) -> &mut FakeConnection {
        &mut self.conn
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Fire {
    Succeed,
    Error(&'static str),
    Panic(&'static str),
    /// Switch to the given disposition, then error.
    MarkThenError(JobDisposition, &'static str),
}

#[derive(Debug)]
pub struct JobState {
    pub disposition: JobDisposition,
    pub attempts: u32,
    pub fire: Fire,
    pub fires: usize,
    pub releases: Vec<Duration>,
    pub fails: Vec<String>,
}

/// Job whose behaviour is scripted and whose calls are observable after it
/// has been handed to the worker.
#[derive(Debug)]
pub struct ScriptedJob {
    id: String,
    state: Arc<Mutex<JobState>>,
}

/// Test-side view of a [`ScriptedJob`].
#[derive(Debug, Clone)]
pub struct JobProbe(Arc<Mutex<JobState>>);

impl JobProbe {
    pub fn fires(&self) -> usize {
        self.0.lock().unwrap().fires
    }

    pub fn releases(&self) -> Vec<Duration> {
        self.0.lock().unwrap().releases.clone()
    }

    pub fn fails(&self) -> Vec<String> {
        self.0.lock().unwrap().fails.clone()
    }

    pub fn disposition(&self) -> JobDisposition {
        self.0.lock().unwrap().disposition
    }
}

impl ScriptedJob {
    pub fn new(fire: Fire) -> (Self, JobProbe) {
        Self::with(JobDisposition::Pending, 1, fire)
    }

    pub fn with(disposition: JobDisposition, attempts: u32, fire: Fire) -> (Self, JobProbe) {
        let state = Arc::new(Mutex::new(JobState {
            disposition,
            attempts,
            fire,
            fires: 0,
            releases: Vec::new(),
            fails: Vec::new(),
        }));
        let job = Self {
            id: "job-1".to_string(),
            state: Arc::clone(&state),
        };
        (job, JobProbe(state))
    }
}

impl Job for ScriptedJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "ScriptedJob"
    }

    fn fire(&mut self) -> anyhow::Result<()> {
        // Release the lock before a scripted panic so the probe stays readable.
        let script = {
            let mut state = self.state.lock().unwrap();
            state.fires += 1;
            state.fire.clone()
        };

        match script {
            Fire::Succeed => Ok(()),
            Fire::Error(msg) => Err(anyhow::anyhow!(msg)),
            Fire::Panic(msg) => panic!("{msg}"),
            Fire::MarkThenError(disposition, msg) => {
                self.state.lock().unwrap().disposition = disposition;
                Err(anyhow::anyhow!(msg))
            }
        }
    }

    fn disposition(&self) -> JobDisposition {
        self.state.lock().unwrap().disposition
    }

    fn release(&mut self, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.releases.push(delay);
        state.disposition = JobDisposition::Released;
    }

    fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }

    fn fail(&mut self, error: &JobError) {
        let mut state = self.state.lock().unwrap();
        state.fails.push(error.to_string());
        state.disposition = JobDisposition::Failed;
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedQueue {
    jobs: Mutex<VecDeque<Box<dyn Job>>>,
    popped: Mutex<Vec<String>>,
}

impl ScriptedQueue {
    pub fn push(&self, job: impl Job + 'static) {
        self.jobs.lock().unwrap().push_back(Box::new(job));
    }

    pub fn popped(&self) -> Vec<String> {
        self.popped.lock().unwrap().clone()
    }
}

impl Queue for ScriptedQueue {
    fn connection_name(&self) -> &str {
        "connection"
    }

    fn pop(&self, queue: &str) -> Result<Option<Box<dyn Job>>, QueueError> {
        self.popped.lock().unwrap().push(queue.to_string());
        Ok(self.jobs.lock().unwrap().pop_front())
    }
}

pub struct ScriptedManager {
    pub queue: Arc<ScriptedQueue>,
}

impl QueueManager for ScriptedManager {
    fn connection(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError> {
        if name != "connection" {
            return Err(QueueError::UnknownConnection(name.to_string()));
        }
        Ok(Arc::clone(&self.queue) as Arc<dyn Queue>)
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingReporter {
    errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn reported(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ExceptionReporter for RecordingReporter {
    fn report(&self, error: &JobError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness<M> {
    pub worker: Worker<M, FakeSession>,
    pub reporter: Arc<RecordingReporter>,
    pub events: Subscription<JobEvent>,
}

impl<M: QueueManager> Harness<M> {
    pub fn session(&self) -> &FakeSession {
        self.worker.session()
    }
}

pub fn harness<M: QueueManager>(manager: M, session: FakeSession) -> Harness<M> {
    harness_with_maintenance(manager, session, || false)
}

pub fn harness_with_maintenance<M, F>(manager: M, session: FakeSession, maintenance: F) -> Harness<M>
where
    M: QueueManager,
    F: Fn() -> bool + Send + Sync + 'static,
{
    jobguard_observability::init_for_tests();

    let bus = Arc::new(InMemoryEventBus::<JobEvent>::new());
    let events = bus.subscribe();
    let reporter = Arc::new(RecordingReporter::default());

    let worker = Worker::new(
        manager,
        Arc::new(BusDispatcher::new(bus)),
        session,
        reporter.clone(),
        maintenance,
    );

    Harness {
        worker,
        reporter,
        events,
    }
}

/// Harness around a scripted queue pre-loaded with `jobs`.
pub fn scripted(session: FakeSession, jobs: Vec<ScriptedJob>) -> (Harness<ScriptedManager>, Arc<ScriptedQueue>) {
    let queue = Arc::new(ScriptedQueue::default());
    for job in jobs {
        queue.push(job);
    }
    let manager = ScriptedManager {
        queue: Arc::clone(&queue),
    };
    (harness(manager, session), queue)
}

/// Options mirroring a typical deployment: 5s release delay, 3 tries, no sleep.
pub fn options() -> WorkerOptions {
    WorkerOptions::default()
        .with_delay(Duration::from_secs(5))
        .with_max_tries(3)
        .with_sleep(Duration::ZERO)
}
