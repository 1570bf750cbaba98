// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cooperative job scheduler.
//!
//! Named jobs are submitted from the frame loop and executed on a bounded
//! worker pool. A name can only be in flight once: submitting a job whose
//! name is still tracked is rejected, which keeps slow work (entity
//! collection in particular) from piling up when it overruns a frame.
//!
//! ```text
//!   submit(job) ──▶ ┌──────────────┐  run_pending  ┌─────────────────┐
//!                   │ tracked jobs │──────────────▶│ worker pool     │
//!   (rejected if    │ name → state │  launches     │ (permit-bounded)│
//!    name tracked)  └──────┬───────┘  queued       └────────┬────────┘
//!                          │ run_pending sweeps finished    │ finish
//!                          ▼                                ▼
//!                   ┌──────────────┐                 handle.wait()
//!                   │ history ring │
//!                   └──────────────┘
//! ```
//!
//! Jobs run as blocking tasks on a runtime owned by the scheduler, each
//! holding one pool permit for its whole run. A job that returns an error
//! or panics is marked failed; neither takes the worker down.

pub mod job;

pub use job::{wait_all, Job, JobError, JobHandle, JobKind, JobRecord, JobStatus};

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::metrics;
use job::{JobState, JobWork};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("failed to start job runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

struct TrackedJob {
    state: Arc<JobState>,
    /// Taken when the job is launched
    work: Option<JobWork>,
}

/// Bounded, single-flight-per-name job executor.
pub struct JobScheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    jobs: DashMap<String, TrackedJob>,
    history: Mutex<VecDeque<JobRecord>>,
    history_capacity: usize,
    slow_job: Duration,
}

impl JobScheduler {
    /// Start a scheduler with its own runtime.
    ///
    /// At most `worker_threads` jobs run at once.
    pub fn new(config: &EngineConfig) -> Result<Self, SchedulerError> {
        let workers = config.worker_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("entity-engine-jobs")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();

        info!(workers, history = config.job_history_capacity, "Job scheduler started");
        Ok(Self {
            runtime: Some(runtime),
            handle,
            permits: Arc::new(Semaphore::new(workers)),
            jobs: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(config.job_history_capacity.min(4096))),
            history_capacity: config.job_history_capacity,
            slow_job: config.slow_job_threshold(),
        })
    }

    /// Runtime the jobs run on. Also usable for background listeners.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Track `job` under its name. Returns false if that name is already
    /// queued or running; the rejected job is dropped without running.
    pub fn submit(&self, job: Job, kind: JobKind) -> bool {
        let Job { state, work } = job;
        let accepted = match self.jobs.entry(state.name().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                state.set_kind(kind);
                slot.insert(TrackedJob { state: Arc::clone(&state), work: Some(work) });
                true
            }
        };

        if accepted {
            debug!(job = state.name(), %kind, "Job queued");
            metrics::set_jobs_in_flight(self.jobs.len());
        } else {
            debug!(job = state.name(), %kind, "Job rejected, already in flight");
            metrics::record_job_rejected(kind.as_str());
        }
        accepted
    }

    pub fn submit_core(&self, job: Job) -> bool {
        self.submit(job, JobKind::Core)
    }

    pub fn submit_plugin(&self, job: Job) -> bool {
        self.submit(job, JobKind::Plugin)
    }

    /// Sweep finished jobs into the history and launch queued ones.
    ///
    /// Returns the number of jobs launched.
    pub fn run_pending(&self) -> usize {
        let mut finished = Vec::new();
        let mut launch = Vec::new();

        for mut entry in self.jobs.iter_mut() {
            match entry.value().state.status() {
                JobStatus::Completed | JobStatus::Failed => finished.push(entry.key().clone()),
                JobStatus::Running => {}
                JobStatus::Queued => {
                    let tracked = entry.value_mut();
                    // None means launched and waiting for a permit
                    if let Some(work) = tracked.work.take() {
                        launch.push((Arc::clone(&tracked.state), work));
                    }
                }
            }
        }

        for name in finished {
            if let Some((_, tracked)) = self.jobs.remove(&name) {
                self.archive(tracked.state.record());
            }
        }

        let launched = launch.len();
        for (state, work) in launch {
            self.launch(state, work);
        }
        metrics::set_jobs_in_flight(self.jobs.len());
        launched
    }

    fn launch(&self, state: Arc<JobState>, work: JobWork) {
        let permits = Arc::clone(&self.permits);
        let slow_job = self.slow_job;

        self.handle.spawn(async move {
            let Ok(permit) = permits.acquire_owned().await else {
                state.finish(Err(JobError::Cancelled));
                return;
            };
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                execute(&state, work, slow_job);
            });
        });
    }

    fn archive(&self, record: JobRecord) {
        if self.history_capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Whether a job with `name` is queued, running or finished-but-unswept.
    #[must_use]
    pub fn is_tracked(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Names of all tracked jobs.
    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        self.jobs.iter().map(|e| e.key().clone()).collect()
    }

    /// Swept jobs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<JobRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Stop the runtime, giving running jobs up to `timeout` to finish.
    ///
    /// Jobs that never started are failed with [`JobError::Cancelled`].
    pub fn shutdown(mut self, timeout: Duration) {
        let tracked = self.jobs.len();
        if let Some(runtime) = self.runtime.take() {
            info!(tracked, "Job scheduler shutting down");
            runtime.shutdown_timeout(timeout);
        }
        self.cancel_unstarted();
    }

    fn cancel_unstarted(&self) -> usize {
        let cancelled = self.jobs.iter().filter(|e| e.value().state.cancel()).count();
        if cancelled > 0 {
            warn!(cancelled, "Cancelled jobs that never started");
        }
        cancelled
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        self.cancel_unstarted();
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("tracked", &self.jobs.len())
            .field("history", &self.history.lock().len())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// Run `work` on the current (blocking) thread and record the outcome.
fn execute(state: &JobState, work: JobWork, slow_job: Duration) {
    if !state.mark_running() {
        return;
    }
    let started = Instant::now();

    let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(JobError::Panicked(panic_message(payload))),
    };
    let elapsed = started.elapsed();
    let kind = state.kind();

    if let Err(e) = &result {
        error!(job = state.name(), %kind, error = %e, "Job failed");
    } else if elapsed > slow_job {
        warn!(
            job = state.name(),
            %kind,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = slow_job.as_millis() as u64,
            "Slow job"
        );
    }

    let status = state.finish(result);
    metrics::record_job(kind.as_str(), status.as_str(), elapsed);
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
