/// Execution Scheduler - Admission Control and Worker Pool
///
/// **Core Responsibility:**
/// Accept requests, bound concurrency, apply fairness and backpressure, and
/// hold each request's state until the caller collects it.
///
/// **Admission Rules:**
/// 1. Unsupported language or oversized source: refused
/// 2. Waiting requests at `max_queue_depth`: refused with `Busy`
/// 3. Requester at their per-mode cap: refused (`Reject`) or admitted and
///    held back by dispatch (`Queue`), up to `QUEUED_PER_REQUESTER_FACTOR`
///    times the cap in waiting requests
///
/// **Dispatch Rules:**
/// - FIFO per mode; `Run` is preferred over `Submit` when both were admitted
///   within `RUN_PREFERENCE_WINDOW` of each other, otherwise the older wins
/// - A requester at their cap is skipped, never run in parallel past it
/// - A request whose queue-wait deadline passed is expired, never run
///
/// **Worker Isolation:**
/// Each request runs on its own task. A panic or infrastructure failure
/// becomes an `InternalError` verdict for that request only.
///
/// The job table is the only state shared between workers and callers; it is
/// reachable only through this type's methods.

use crate::error::JudgeError;
use crate::executor::{internal_error_verdict, Judge, Progress};
use crate::metrics;
use crate::store::ResultSink;
use async_trait::async_trait;
use codecraft_common::config::{RequesterLimitPolicy, ServiceConfig};
use codecraft_common::types::{
    ExecutionRequest, JobPhase, Language, Mode, UnsupportedLanguage, Verdict, VerdictStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Sources above this size are refused at admission.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// A waiting `Run` is dispatched ahead of a waiting `Submit` only if the
/// `Submit` was not admitted more than this much earlier.
pub const RUN_PREFERENCE_WINDOW: Duration = Duration::from_millis(250);

/// Under the `Queue` policy a requester may hold at most this many times
/// their per-mode cap in waiting requests.
pub const QUEUED_PER_REQUESTER_FACTOR: usize = 4;

pub type RequestHandle = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("judge is busy: {depth} requests already waiting")]
    Busy { depth: usize },

    #[error("requester {requester} already has {limit} {mode} request(s) in flight")]
    RequesterLimit {
        requester: String,
        mode: Mode,
        limit: usize,
    },

    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("judge is shutting down")]
    ShuttingDown,
}

impl AdmissionError {
    /// Label for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::Busy { .. } => "busy",
            AdmissionError::RequesterLimit { .. } => "requester_limit",
            AdmissionError::UnsupportedLanguage(_) => "unsupported_language",
            AdmissionError::InvalidRequest(_) => "invalid_request",
            AdmissionError::ShuttingDown => "shutting_down",
        }
    }
}

/// What a worker runs for each dispatched request.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    fn supports(&self, language: Language) -> bool;

    async fn run(
        &self,
        request_id: Uuid,
        request: &ExecutionRequest,
        progress: Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Verdict, JudgeError>;
}

#[async_trait]
impl JobRunner for Judge {
    fn supports(&self, language: Language) -> bool {
        self.languages().is_enabled(&language)
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &ExecutionRequest,
        progress: Progress<'_>,
        cancel: &CancellationToken,
    ) -> Result<Verdict, JudgeError> {
        self.judge(request_id, request, progress, cancel).await
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_workers: usize,
    pub max_queue_depth: usize,
    pub max_submits_per_user: usize,
    pub max_runs_per_user: usize,
    pub requester_limit_policy: RequesterLimitPolicy,
    pub run_queue_timeout: Duration,
    pub submit_queue_timeout: Duration,
    pub max_retained_results: usize,
}

impl From<&ServiceConfig> for SchedulerConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            max_queue_depth: config.max_queue_depth,
            max_submits_per_user: config.max_submits_per_user,
            max_runs_per_user: config.max_runs_per_user,
            requester_limit_policy: config.requester_limit_policy,
            run_queue_timeout: config.run_queue_timeout,
            submit_queue_timeout: config.submit_queue_timeout,
            max_retained_results: config.max_retained_results,
        }
    }
}

impl SchedulerConfig {
    fn requester_cap(&self, mode: Mode) -> usize {
        match mode {
            Mode::Run => self.max_runs_per_user,
            Mode::Submit => self.max_submits_per_user,
        }
    }

    fn queue_timeout(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Run => self.run_queue_timeout,
            Mode::Submit => self.submit_queue_timeout,
        }
    }
}

/// Answer to a result query.
#[derive(Debug, Clone, PartialEq)]
pub enum JobLookup {
    Pending(JobPhase),
    Done(Arc<Verdict>),
    Cancelled,
    /// Waited in the queue past its deadline; never ran.
    Expired,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyFinished,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    pub workers: usize,
    pub running: usize,
    pub queued_runs: usize,
    pub queued_submits: usize,
    pub retained: usize,
}

#[derive(Debug, Clone)]
enum JobState {
    Queued,
    Running(JobPhase),
    Completed(Arc<Verdict>),
    Cancelled,
    Expired,
}

struct Job {
    request: Arc<ExecutionRequest>,
    state: JobState,
    cancel: CancellationToken,
    enqueued_at: Instant,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    run_queue: VecDeque<Uuid>,
    submit_queue: VecDeque<Uuid>,
    running_by_requester: HashMap<(String, Mode), usize>,
    running: usize,
    /// Finished jobs, oldest first, for bounded retention.
    finished: VecDeque<Uuid>,
    shutting_down: bool,
}

impl State {
    fn depth(&self) -> usize {
        self.run_queue.len() + self.submit_queue.len()
    }

    fn queue_mut(&mut self, mode: Mode) -> &mut VecDeque<Uuid> {
        match mode {
            Mode::Run => &mut self.run_queue,
            Mode::Submit => &mut self.submit_queue,
        }
    }

    fn running_for(&self, requester: &str, mode: Mode) -> usize {
        self.running_by_requester
            .get(&(requester.to_string(), mode))
            .copied()
            .unwrap_or(0)
    }

    fn queued_for(&self, requester: &str, mode: Mode) -> usize {
        let queue = match mode {
            Mode::Run => &self.run_queue,
            Mode::Submit => &self.submit_queue,
        };
        queue
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| job.request.requester_id == requester)
            .count()
    }

    fn retire(&mut self, id: Uuid, max_retained: usize) {
        self.finished.push_back(id);
        while self.finished.len() > max_retained {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }

    /// Expire every queued job whose deadline has passed.
    fn expire_overdue(&mut self, now: Instant, max_retained: usize) {
        let mut expired = Vec::new();
        for queue in [&mut self.run_queue, &mut self.submit_queue] {
            let jobs = &self.jobs;
            queue.retain(|id| match jobs.get(id) {
                Some(job) if job.deadline <= now => {
                    expired.push(*id);
                    false
                }
                Some(_) => true,
                None => false,
            });
        }

        for id in expired {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Expired;
                info!(request_id = %id, mode = %job.request.mode, "Request expired in queue");
            }
            metrics::ADMISSION_REJECTIONS
                .with_label_values(&["expired"])
                .inc();
            self.retire(id, max_retained);
        }
        metrics::QUEUE_DEPTH.set(self.depth() as i64);
    }

    /// Position of the first job in `mode`'s queue whose requester is below
    /// their cap, with the time it was admitted.
    fn eligible_head(&self, mode: Mode, cap: usize) -> Option<(usize, Instant)> {
        let queue = match mode {
            Mode::Run => &self.run_queue,
            Mode::Submit => &self.submit_queue,
        };
        queue.iter().enumerate().find_map(|(position, id)| {
            let job = self.jobs.get(id)?;
            (self.running_for(&job.request.requester_id, mode) < cap)
                .then_some((position, job.enqueued_at))
        })
    }

    /// Pop the next dispatchable job. FIFO within a mode, skipping requesters
    /// at their cap. A `Run` head wins unless the `Submit` head was admitted
    /// more than `RUN_PREFERENCE_WINDOW` before it.
    fn take_next(&mut self, config: &SchedulerConfig) -> Option<(Uuid, Arc<ExecutionRequest>, CancellationToken)> {
        let run = self.eligible_head(Mode::Run, config.requester_cap(Mode::Run));
        let submit = self.eligible_head(Mode::Submit, config.requester_cap(Mode::Submit));

        let (mode, position) = match (run, submit) {
            (None, None) => return None,
            (Some((position, _)), None) => (Mode::Run, position),
            (None, Some((position, _))) => (Mode::Submit, position),
            (Some((run_pos, run_at)), Some((submit_pos, submit_at))) => {
                if submit_at + RUN_PREFERENCE_WINDOW < run_at {
                    (Mode::Submit, submit_pos)
                } else {
                    (Mode::Run, run_pos)
                }
            }
        };

        let id = self.queue_mut(mode).remove(position)?;
        let job = self.jobs.get_mut(&id)?;

        job.state = JobState::Running(JobPhase::Queued);
        let request = job.request.clone();
        let cancel = job.cancel.clone();

        *self
            .running_by_requester
            .entry((request.requester_id.clone(), mode))
            .or_insert(0) += 1;
        self.running += 1;
        metrics::RUNNING_JOBS.set(self.running as i64);
        metrics::QUEUE_DEPTH.set(self.depth() as i64);
        Some((id, request, cancel))
    }
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    notify: Notify,
    shutdown: CancellationToken,
    runner: Arc<dyn JobRunner>,
    sink: Arc<dyn ResultSink>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, id: Uuid, phase: JobPhase) {
        let mut state = self.state();
        if let Some(job) = state.jobs.get_mut(&id) {
            if matches!(job.state, JobState::Running(_)) {
                job.state = JobState::Running(phase);
            }
        }
    }

    fn next_job(&self) -> Next {
        let mut state = self.state();
        if state.shutting_down {
            return Next::Shutdown;
        }
        state.expire_overdue(Instant::now(), self.config.max_retained_results);
        match state.take_next(&self.config) {
            Some((id, request, cancel)) => Next::Job(id, request, cancel),
            None => Next::Idle,
        }
    }

    /// Record a dispatched job's end. `verdict` is `None` when it was cancelled.
    fn finish(&self, id: Uuid, request: &ExecutionRequest, verdict: Option<Arc<Verdict>>) {
        let mut state = self.state();

        let key = (request.requester_id.clone(), request.mode);
        if let Some(count) = state.running_by_requester.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.running_by_requester.remove(&key);
            }
        }
        state.running = state.running.saturating_sub(1);
        metrics::RUNNING_JOBS.set(state.running as i64);

        if let Some(job) = state.jobs.get_mut(&id) {
            job.state = match verdict {
                Some(verdict) => JobState::Completed(verdict),
                None => JobState::Cancelled,
            };
        }
        state.retire(id, self.config.max_retained_results);
        drop(state);

        // A capped requester may now be dispatchable.
        self.notify.notify_waiters();
    }
}

enum Next {
    Job(Uuid, Arc<ExecutionRequest>, CancellationToken),
    Idle,
    Shutdown,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Scheduler {
    /// Create the scheduler and spawn `config.max_workers` workers.
    pub fn start(
        config: SchedulerConfig,
        runner: Arc<dyn JobRunner>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let worker_count = config.max_workers;
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            runner,
            sink,
        });

        let workers = (0..worker_count)
            .map(|worker_id| tokio::spawn(worker_loop(inner.clone(), worker_id)))
            .collect();

        info!(workers = worker_count, "Scheduler started");
        Self {
            inner,
            workers: Arc::new(Mutex::new(workers)),
        }
    }

    /// Admit a request. Never blocks on execution.
    pub fn submit(&self, request: ExecutionRequest) -> Result<RequestHandle, AdmissionError> {
        let result = self.admit(request);
        if let Err(e) = &result {
            metrics::ADMISSION_REJECTIONS
                .with_label_values(&[e.reason()])
                .inc();
            debug!(reason = e.reason(), error = %e, "Request refused at admission");
        }
        result
    }

    fn admit(&self, request: ExecutionRequest) -> Result<RequestHandle, AdmissionError> {
        if !self.inner.runner.supports(request.language) {
            return Err(UnsupportedLanguage(request.language.to_string()).into());
        }
        if request.source_code.len() > MAX_SOURCE_BYTES {
            return Err(AdmissionError::InvalidRequest(format!(
                "source is {} bytes (limit {})",
                request.source_code.len(),
                MAX_SOURCE_BYTES
            )));
        }
        if request.requester_id.trim().is_empty() {
            return Err(AdmissionError::InvalidRequest(
                "requester_id is empty".to_string(),
            ));
        }

        let config = &self.inner.config;
        let mut state = self.inner.state();
        if state.shutting_down {
            return Err(AdmissionError::ShuttingDown);
        }

        let now = Instant::now();
        state.expire_overdue(now, config.max_retained_results);

        let depth = state.depth();
        if depth >= config.max_queue_depth {
            return Err(AdmissionError::Busy { depth });
        }

        let mode = request.mode;
        let cap = config.requester_cap(mode);
        let queued = state.queued_for(&request.requester_id, mode);
        let (in_flight, limit) = match config.requester_limit_policy {
            RequesterLimitPolicy::Reject => {
                (state.running_for(&request.requester_id, mode) + queued, cap)
            }
            RequesterLimitPolicy::Queue => (queued, cap.saturating_mul(QUEUED_PER_REQUESTER_FACTOR)),
        };
        if in_flight >= limit {
            return Err(AdmissionError::RequesterLimit {
                requester: request.requester_id,
                mode,
                limit,
            });
        }

        let id = Uuid::new_v4();
        info!(
            request_id = %id,
            language = %request.language,
            mode = %mode,
            problem_id = request.problem_id,
            requester = %request.requester_id,
            "Request admitted"
        );

        state.jobs.insert(
            id,
            Job {
                request: Arc::new(request),
                state: JobState::Queued,
                cancel: CancellationToken::new(),
                enqueued_at: now,
                deadline: now + config.queue_timeout(mode),
            },
        );
        state.queue_mut(mode).push_back(id);
        metrics::QUEUE_DEPTH.set(state.depth() as i64);
        drop(state);

        self.inner.notify.notify_waiters();
        Ok(id)
    }

    pub fn result(&self, handle: &RequestHandle) -> JobLookup {
        let mut state = self.inner.state();
        state.expire_overdue(Instant::now(), self.inner.config.max_retained_results);

        match state.jobs.get(handle).map(|job| &job.state) {
            None => JobLookup::NotFound,
            Some(JobState::Queued) => JobLookup::Pending(JobPhase::Queued),
            Some(JobState::Running(phase)) => JobLookup::Pending(*phase),
            Some(JobState::Completed(verdict)) => JobLookup::Done(verdict.clone()),
            Some(JobState::Cancelled) => JobLookup::Cancelled,
            Some(JobState::Expired) => JobLookup::Expired,
        }
    }

    /// Cancel a queued or running request. A running request's sandbox is
    /// killed and its partial results are discarded.
    pub fn cancel(&self, handle: &RequestHandle) -> CancelOutcome {
        let mut state = self.inner.state();
        let max_retained = self.inner.config.max_retained_results;

        let Some(job) = state.jobs.get_mut(handle) else {
            return CancelOutcome::NotFound;
        };

        match job.state {
            JobState::Queued => {
                job.state = JobState::Cancelled;
                job.cancel.cancel();
                let mode = job.request.mode;
                state.queue_mut(mode).retain(|id| id != handle);
                state.retire(*handle, max_retained);
                metrics::QUEUE_DEPTH.set(state.depth() as i64);
                info!(request_id = %handle, "Queued request cancelled");
                CancelOutcome::Cancelled
            }
            JobState::Running(_) => {
                // The worker records the final state once the runner returns.
                job.state = JobState::Cancelled;
                job.cancel.cancel();
                info!(request_id = %handle, "Running request cancelled");
                CancelOutcome::Cancelled
            }
            JobState::Completed(_) | JobState::Cancelled | JobState::Expired => {
                CancelOutcome::AlreadyFinished
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state();
        SchedulerStats {
            workers: self.inner.config.max_workers,
            running: state.running,
            queued_runs: state.run_queue.len(),
            queued_submits: state.submit_queue.len(),
            retained: state.jobs.len(),
        }
    }

    /// Stop admitting, cancel everything still queued, and wait for running
    /// requests to finish.
    pub async fn shutdown(&self) {
        {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            state.shutting_down = true;
            let queued: Vec<Uuid> = state
                .run_queue
                .drain(..)
                .chain(state.submit_queue.drain(..))
                .collect();
            for id in &queued {
                if let Some(job) = state.jobs.get_mut(id) {
                    job.state = JobState::Cancelled;
                    job.cancel.cancel();
                }
                state.retire(*id, self.inner.config.max_retained_results);
            }
            metrics::QUEUE_DEPTH.set(0);
            warn!(cancelled = queued.len(), running = state.running, "Scheduler shutting down");
        }
        self.inner.shutdown.cancel();
        self.inner.notify.notify_waiters();

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed during shutdown");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn worker_loop(inner: Arc<Inner>, worker_id: usize) {
    debug!(worker_id, "Worker started");
    loop {
        // Register for wakeups before looking at the queue so a submit landing
        // in between is not missed.
        let notified = inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match inner.next_job() {
            Next::Job(id, request, cancel) => run_job(&inner, worker_id, id, request, cancel).await,
            Next::Idle => {
                tokio::select! {
                    _ = notified.as_mut() => {}
                    _ = inner.shutdown.cancelled() => {}
                }
            }
            Next::Shutdown => break,
        }
    }
    debug!(worker_id, "Worker stopped");
}

async fn run_job(
    inner: &Arc<Inner>,
    worker_id: usize,
    id: Uuid,
    request: Arc<ExecutionRequest>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    debug!(worker_id, request_id = %id, "Dispatching request");

    // The job gets its own task so a panic stays inside it.
    let task = {
        let inner = inner.clone();
        let request = request.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let progress_inner = inner.clone();
            let progress = move |phase: JobPhase| progress_inner.set_phase(id, phase);
            inner.runner.run(id, &request, &progress, &cancel).await
        })
    };

    let verdict = match task.await {
        _ if cancel.is_cancelled() => None,
        Ok(Ok(verdict)) => Some(verdict),
        Ok(Err(JudgeError::Cancelled)) => None,
        Ok(Err(e)) => Some(internal_error_verdict(id, &request, e.to_string())),
        Err(join_error) => Some(internal_error_verdict(
            id,
            &request,
            format!("worker crashed: {}", join_error),
        )),
    };

    let Some(verdict) = verdict else {
        info!(request_id = %id, "Request cancelled; partial results discarded");
        inner.finish(id, &request, None);
        return;
    };

    let elapsed = started.elapsed();
    metrics::JUDGE_DURATION
        .with_label_values(&[request.language.as_str()])
        .observe(elapsed.as_secs_f64());
    let mode = request.mode.to_string();
    metrics::VERDICTS_TOTAL
        .with_label_values(&[mode.as_str(), verdict.status.as_str()])
        .inc();

    if verdict.status == VerdictStatus::InternalError {
        metrics::INTERNAL_ERRORS.inc();
        error!(
            request_id = %id,
            language = %request.language,
            mode = %request.mode,
            problem_id = request.problem_id,
            message = verdict.message.as_deref().unwrap_or(""),
            "Request ended in internal error"
        );
    } else {
        info!(
            request_id = %id,
            language = %request.language,
            mode = %request.mode,
            requester = %request.requester_id,
            status = %verdict.status,
            passed = verdict.passed_count(),
            executed = verdict.results.len(),
            total_time_ms = verdict.total_time_ms,
            peak_memory_kb = verdict.peak_memory_kb,
            elapsed_ms = elapsed.as_millis() as u64,
            "Verdict ready"
        );
    }

    if request.mode == Mode::Submit {
        if let Err(e) = inner.sink.emit(&verdict).await {
            error!(request_id = %id, error = %e, "Failed to emit submission verdict");
        }
    }

    inner.finish(id, &request, Some(Arc::new(verdict)));
}
