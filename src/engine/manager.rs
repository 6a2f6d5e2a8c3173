use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{Result, SqlOffloadError};

use super::channel::{
    Baton, Callback, Completion, CompletionSender, Reply, Task, Work, run_work,
};
use super::lane::SerialLane;

/// Worker pool settings for [`TaskEngine::start`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads running blocking native calls.
    pub workers: usize,
    /// Thread name prefix; workers are named `{prefix}-{index}`.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            thread_name: "sql-offload-worker".into(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }
}

enum Job {
    Single(Box<dyn Task>),
    Lane(Arc<SerialLane>),
}

/// Bounded worker pool plus the caller-side completion queue.
///
/// Blocking native calls run on the workers. Callback outcomes are queued and only delivered
/// when the caller drains the queue with [`run_pending`](Self::run_pending),
/// [`wait_and_run`](Self::wait_and_run) or [`run_until_idle`](Self::run_until_idle), so
/// callbacks always run on the thread that dispatches.
pub struct TaskEngine {
    jobs: Mutex<Option<Sender<Job>>>,
    completions_tx: CompletionSender,
    completions_rx: Mutex<Receiver<Box<dyn Completion>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: AtomicUsize,
    next_lane_id: AtomicU64,
    config: EngineConfig,
}

impl TaskEngine {
    /// Spawn the worker threads. Call once during process setup and share the returned handle.
    ///
    /// # Errors
    /// Returns [`SqlOffloadError::Initialization`] when `workers` is zero or a worker thread
    /// cannot be spawned.
    pub fn start(config: EngineConfig) -> Result<Arc<Self>> {
        if config.workers == 0 {
            return Err(SqlOffloadError::Initialization(
                "task engine needs at least one worker".into(),
            ));
        }
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (completions_tx, completions_rx) = mpsc::channel::<Box<dyn Completion>>();
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let jobs_rx = Arc::clone(&jobs_rx);
            let completions = completions_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name))
                .spawn(move || run_worker(&jobs_rx, &completions))
                .map_err(|err| {
                    SqlOffloadError::Initialization(format!(
                        "failed to spawn worker thread: {err}"
                    ))
                })?;
            workers.push(handle);
        }
        tracing::info!(workers = config.workers, "task engine started");

        Ok(Arc::new(Self {
            jobs: Mutex::new(Some(jobs_tx)),
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
            workers: Mutex::new(workers),
            in_flight: AtomicUsize::new(0),
            next_lane_id: AtomicU64::new(1),
            config,
        }))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Callbacks submitted but not yet delivered.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        lock(&self.jobs).is_none()
    }

    pub(crate) fn new_lane(&self) -> Arc<SerialLane> {
        Arc::new(SerialLane::new(
            self.next_lane_id.fetch_add(1, Ordering::Relaxed),
        ))
    }

    fn enqueue(&self, job: Job) -> std::result::Result<(), Job> {
        let jobs = lock(&self.jobs);
        match jobs.as_ref() {
            Some(sender) => sender.send(job).map_err(|mpsc::SendError(job)| job),
            None => Err(job),
        }
    }

    fn track<T: Send + 'static>(&self, baton: &Baton<T>) {
        if baton.is_callback() {
            self.in_flight.fetch_add(1, Ordering::AcqRel);
        }
        tracing::trace!(task = baton.label(), "task submitted");
    }

    /// Schedule an unordered baton on any free worker.
    pub(crate) fn submit<T: Send + 'static>(&self, baton: Baton<T>) {
        self.track(&baton);
        if let Err(Job::Single(task)) = self.enqueue(Job::Single(Box::new(baton))) {
            task.reject(SqlOffloadError::EngineShutdown, &self.completions_tx);
        }
    }

    /// Schedule a baton behind everything already queued on `lane`.
    pub(crate) fn submit_serial<T: Send + 'static>(&self, lane: &Arc<SerialLane>, baton: Baton<T>) {
        self.track(&baton);
        if lane.push(Box::new(baton)) {
            self.schedule_lane(lane);
        }
    }

    fn schedule_lane(&self, lane: &Arc<SerialLane>) {
        if self.enqueue(Job::Lane(Arc::clone(lane))).is_err() {
            for task in lane.drain() {
                task.reject(SqlOffloadError::EngineShutdown, &self.completions_tx);
            }
        }
    }

    /// Queue a callback-style operation on `lane`.
    pub(crate) fn call_serial_async<T: Send + 'static>(
        &self,
        lane: &Arc<SerialLane>,
        label: &'static str,
        work: Work<T>,
        callback: Callback<T>,
    ) {
        self.submit_serial(lane, Baton::new(label, work, Reply::Callback(callback)));
    }

    /// Run `work` in program order on `lane` and block the caller for its outcome.
    ///
    /// When the lane is idle the work runs inline on the calling thread; otherwise it is queued
    /// behind the pending tasks and the caller waits for a worker to reach it.
    pub(crate) fn call_serial<T: Send + 'static>(
        &self,
        lane: &Arc<SerialLane>,
        label: &'static str,
        work: Work<T>,
    ) -> Result<T> {
        if lane.claim_idle() {
            let outcome = run_work(label, work);
            if lane.release_claim() {
                self.schedule_lane(lane);
            }
            return outcome;
        }
        let (respond_to, response) = oneshot::channel();
        self.submit_serial(lane, Baton::new(label, work, Reply::Blocking(respond_to)));
        response
            .blocking_recv()
            .map_err(|_| SqlOffloadError::EngineShutdown)?
    }

    /// Run `work` on `lane` without waiting: inline if the lane is idle, otherwise queued.
    pub(crate) fn call_serial_detached(
        &self,
        lane: &Arc<SerialLane>,
        label: &'static str,
        work: Work<()>,
    ) {
        if lane.claim_idle() {
            if let Err(err) = run_work(label, work) {
                tracing::warn!(task = label, error = %err, "inline task failed");
            }
            if lane.release_claim() {
                self.schedule_lane(lane);
            }
        } else {
            self.submit_serial(lane, Baton::new(label, work, Reply::Detached));
        }
    }

    /// Queue an unordered callback-style operation.
    pub(crate) fn call_async<T: Send + 'static>(
        &self,
        label: &'static str,
        work: Work<T>,
        callback: Callback<T>,
    ) {
        self.submit(Baton::new(label, work, Reply::Callback(callback)));
    }

    /// Deliver every completion already queued, without blocking. Returns how many callbacks ran.
    pub fn run_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = lock(&self.completions_rx).try_recv();
            match next {
                Ok(completion) => {
                    self.deliver(completion);
                    delivered += 1;
                }
                Err(_) => return delivered,
            }
        }
    }

    /// Block up to `timeout` for at least one completion, then deliver everything queued.
    pub fn wait_and_run(&self, timeout: Duration) -> usize {
        let first = lock(&self.completions_rx).recv_timeout(timeout);
        match first {
            Ok(completion) => {
                self.deliver(completion);
                1 + self.run_pending()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Dispatch completions until no callback is in flight or `timeout` elapses.
    /// Returns how many callbacks ran; check [`in_flight`](Self::in_flight) for leftovers.
    pub fn run_until_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut delivered = self.run_pending();
        while self.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            delivered += self.wait_and_run(deadline - now);
        }
        delivered
    }

    fn deliver(&self, completion: Box<dyn Completion>) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        completion.complete();
    }

    /// Stop accepting work, let the workers finish what is already queued, and join them.
    ///
    /// Later submissions fail with [`SqlOffloadError::EngineShutdown`], delivered through the
    /// same channel as any other outcome. Completions already queued can still be dispatched.
    pub fn shutdown(&self) {
        let sender = lock(&self.jobs).take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        let handles: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("worker thread exited with a panic");
            }
        }
        tracing::info!("task engine shut down");
    }
}

impl Drop for TaskEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("workers", &self.config.workers)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker(jobs: &Mutex<Receiver<Job>>, completions: &CompletionSender) {
    loop {
        let next = lock(jobs).recv();
        match next {
            Ok(Job::Single(task)) => task.run(completions),
            Ok(Job::Lane(lane)) => {
                while let Some(task) = lane.next() {
                    task.run(completions);
                }
            }
            Err(_) => break,
        }
    }
}
