//! Mock executors and worker spawners
//!
//! Executors misbehave inside a real worker loop; scripted spawners replace the
//! worker loop itself so tests can exercise the scheduler's timeout, crash and
//! integrity handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scaffolder_domain::{Task, TaskKind, TaskOutcome, WorkerReply};
use scaffolder_errors::{PoolError, PoolResult};
use scaffolder_worker::{
    run_blocking, BatchExecutor, ExecutorRegistry, TaskExecutor, WorkerEnvelope, WorkerHandle, WorkerSpawner,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Tracks how many executions overlap
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Sleeps for `delay`, then returns the task id
pub struct SlowExecutor {
    kind: TaskKind,
    delay: Duration,
    probe: Arc<ConcurrencyProbe>,
}

impl SlowExecutor {
    pub fn new(kind: TaskKind, delay: Duration, probe: Arc<ConcurrencyProbe>) -> Self {
        Self { kind, delay, probe }
    }
}

#[async_trait]
impl TaskExecutor for SlowExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        self.probe.enter();
        tokio::time::sleep(self.delay).await;
        self.probe.exit();
        Ok(json!(task.id()))
    }
}

/// Never finishes
pub struct HangingExecutor {
    kind: TaskKind,
}

impl HangingExecutor {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl TaskExecutor for HangingExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        "hanging"
    }

    async fn execute(&self, _task: &Task) -> PoolResult<Value> {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    }
}

/// Blocks an OS thread for `delay` through `run_blocking`, counting finished runs
pub struct BlockingExecutor {
    kind: TaskKind,
    delay: Duration,
    finished: Arc<AtomicUsize>,
}

impl BlockingExecutor {
    pub fn new(kind: TaskKind, delay: Duration) -> Self {
        Self {
            kind,
            delay,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn finished(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.finished)
    }
}

#[async_trait]
impl TaskExecutor for BlockingExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        "blocking"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        let delay = self.delay;
        let finished = Arc::clone(&self.finished);
        let id = task.id().to_string();
        run_blocking(move || {
            std::thread::sleep(delay);
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(json!(id))
        })
        .await
    }
}

/// Panics when the payload contains `"panic": true`, otherwise echoes the payload
pub struct PanickingExecutor {
    kind: TaskKind,
}

impl PanickingExecutor {
    pub fn new(kind: TaskKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl TaskExecutor for PanickingExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        "panicking"
    }

    async fn execute(&self, task: &Task) -> PoolResult<Value> {
        if task.payload().get("panic") == Some(&Value::Bool(true)) {
            panic!("executor panicked on task {}", task.id());
        }
        Ok(task.payload().clone())
    }
}

/// Always returns a task execution error
pub struct FailingExecutor {
    kind: TaskKind,
    message: String,
}

impl FailingExecutor {
    pub fn new(kind: TaskKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
impl TaskExecutor for FailingExecutor {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _task: &Task) -> PoolResult<Value> {
        Err(PoolError::task_execution(self.message.clone()))
    }
}

/// Default executors with `overrides` registered on top
pub fn registry_with(overrides: Vec<Arc<dyn TaskExecutor>>) -> Arc<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::with_defaults();
    for executor in overrides {
        registry.register(executor);
    }
    Arc::new(registry)
}

/// Delegates to `inner` for the first `successes` spawns, then fails
pub struct FailingSpawner {
    remaining: AtomicUsize,
    attempts: AtomicUsize,
    inner: Arc<dyn WorkerSpawner>,
}

impl FailingSpawner {
    pub fn after(successes: usize, inner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            remaining: AtomicUsize::new(successes),
            attempts: AtomicUsize::new(0),
            inner,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for FailingSpawner {
    fn spawn(&self, worker_id: &str) -> PoolResult<WorkerHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if granted {
            self.inner.spawn(worker_id)
        } else {
            Err(PoolError::worker_spawn(format!("refusing to spawn {worker_id}")))
        }
    }
}

/// What a scripted worker does with every request it receives
#[derive(Clone)]
pub enum WorkerBehavior {
    /// Reply `success=false`
    Reject(String),
    /// Keep the reply channel open and never answer
    Hang,
    /// Drop the reply channel and exit the worker loop
    Crash,
    /// Panic inside the worker task
    Panic,
    /// Answer under a different correlation id
    WrongCorrelation,
    /// Answer with no results
    ShortReply,
    /// Reject the first `failures` requests across all workers, then execute normally
    FailFirst {
        failures: usize,
        registry: Arc<ExecutorRegistry>,
    },
}

/// Shared record of the requests scripted workers received
#[derive(Debug, Default)]
pub struct RequestLog {
    entries: Mutex<Vec<(String, Instant)>>,
}

impl RequestLog {
    fn record(&self, worker_id: &str) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push((worker_id.to_string(), Instant::now()));
        entries.len() - 1
    }

    pub fn count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn workers(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Time between consecutive requests
    pub fn gaps(&self) -> Vec<Duration> {
        self.entries
            .lock()
            .map(|e| e.windows(2).map(|w| w[1].1.duration_since(w[0].1)).collect())
            .unwrap_or_default()
    }
}

/// Spawns workers that follow a fixed [`WorkerBehavior`]
pub struct ScriptedSpawner {
    behavior: WorkerBehavior,
    log: Arc<RequestLog>,
    spawned: AtomicUsize,
}

impl ScriptedSpawner {
    pub fn new(behavior: WorkerBehavior) -> Self {
        Self {
            behavior,
            log: Arc::new(RequestLog::default()),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn log(&self) -> Arc<RequestLog> {
        Arc::clone(&self.log)
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for ScriptedSpawner {
    fn spawn(&self, worker_id: &str) -> PoolResult<WorkerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::worker_spawn(e.to_string()))?;
        let (sender, receiver) = mpsc::channel(1);
        let join = runtime.spawn(run_scripted(
            worker_id.to_string(),
            self.behavior.clone(),
            receiver,
            Arc::clone(&self.log),
        ));
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(WorkerHandle::new(worker_id.to_string(), sender, join))
    }
}

async fn run_scripted(
    worker_id: String,
    behavior: WorkerBehavior,
    mut receiver: mpsc::Receiver<WorkerEnvelope>,
    log: Arc<RequestLog>,
) {
    while let Some(WorkerEnvelope { request, reply_tx }) = receiver.recv().await {
        let seq = log.record(&worker_id);
        let reply = match &behavior {
            WorkerBehavior::Reject(message) => WorkerReply::rejected(&request.task_id, message.clone()),
            WorkerBehavior::Hang => {
                let _held = reply_tx;
                std::future::pending::<()>().await;
                return;
            }
            WorkerBehavior::Crash => return,
            WorkerBehavior::Panic => panic!("scripted worker {worker_id} panicked"),
            WorkerBehavior::WrongCorrelation => WorkerReply::completed(
                format!("not-{}", request.task_id),
                request
                    .batch
                    .tasks()
                    .iter()
                    .map(|task| TaskOutcome::succeeded(task.id(), Value::Null))
                    .collect(),
            ),
            WorkerBehavior::ShortReply => WorkerReply::completed(&request.task_id, Vec::new()),
            WorkerBehavior::FailFirst { failures, registry } => {
                if seq < *failures {
                    WorkerReply::rejected(&request.task_id, format!("scripted failure #{}", seq + 1))
                } else {
                    BatchExecutor::new(worker_id.clone(), Arc::clone(registry))
                        .execute(&request)
                        .await
                }
            }
        };
        let _ = reply_tx.send(reply);
    }
}
