// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Jobs and their observable state.
//!
//! A [`Job`] is a named unit of work that runs once. Submitting it hands the
//! work to the scheduler; a [`JobHandle`] taken beforehand keeps observing
//! it:
//!
//! ```text
//! Queued ──launch──▶ Running ──Ok──▶ Completed
//!                       │
//!                       └──Err / panic──▶ Failed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Why a job did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("job panicked: {0}")]
    Panicked(String),

    #[error("job cancelled before it ran")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who submitted the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobKind {
    /// Engine-internal work such as entity collection
    Core,
    /// Work submitted on behalf of an extension
    #[default]
    Plugin,
}

impl JobKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type JobWork = Box<dyn FnOnce() -> Result<(), JobError> + Send + 'static>;

#[derive(Debug)]
struct Progress {
    status: JobStatus,
    kind: JobKind,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    error: Option<JobError>,
}

/// State shared between a job, its handles and the scheduler.
#[derive(Debug)]
pub(crate) struct JobState {
    name: String,
    progress: Mutex<Progress>,
    finished: Condvar,
}

impl JobState {
    fn new(name: String) -> Self {
        Self {
            name,
            progress: Mutex::new(Progress {
                status: JobStatus::Queued,
                kind: JobKind::default(),
                started: None,
                elapsed: None,
                error: None,
            }),
            finished: Condvar::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn status(&self) -> JobStatus {
        self.progress.lock().status
    }

    pub(crate) fn kind(&self) -> JobKind {
        self.progress.lock().kind
    }

    pub(crate) fn set_kind(&self, kind: JobKind) {
        self.progress.lock().kind = kind;
    }

    /// Move a queued job to running. Returns false if it was cancelled.
    pub(crate) fn mark_running(&self) -> bool {
        let mut progress = self.progress.lock();
        if progress.status != JobStatus::Queued {
            return false;
        }
        progress.status = JobStatus::Running;
        progress.started = Some(Instant::now());
        true
    }

    /// Fail a job that never started with [`JobError::Cancelled`] and wake
    /// its waiters. Returns false if the job had already started.
    pub(crate) fn cancel(&self) -> bool {
        let mut progress = self.progress.lock();
        if progress.status != JobStatus::Queued {
            return false;
        }
        progress.status = JobStatus::Failed;
        progress.elapsed = Some(Duration::ZERO);
        progress.error = Some(JobError::Cancelled);
        drop(progress);
        self.finished.notify_all();
        true
    }

    /// Record the outcome and wake every waiter. Returns the final status.
    pub(crate) fn finish(&self, result: Result<(), JobError>) -> JobStatus {
        let mut progress = self.progress.lock();
        progress.elapsed = Some(progress.started.map_or(Duration::ZERO, |s| s.elapsed()));
        progress.status = match result {
            Ok(()) => JobStatus::Completed,
            Err(e) => {
                progress.error = Some(e);
                JobStatus::Failed
            }
        };
        let status = progress.status;
        drop(progress);
        self.finished.notify_all();
        status
    }

    pub(crate) fn record(&self) -> JobRecord {
        let progress = self.progress.lock();
        JobRecord {
            name: self.name.clone(),
            kind: progress.kind,
            status: progress.status,
            elapsed: progress.elapsed,
            error: progress.error.clone(),
        }
    }
}

/// A named, run-once unit of work.
pub struct Job {
    pub(crate) state: Arc<JobState>,
    pub(crate) work: JobWork,
}

impl Job {
    pub fn new(name: impl Into<String>, work: impl FnOnce() -> Result<(), JobError> + Send + 'static) -> Self {
        Self {
            state: Arc::new(JobState::new(name.into())),
            work: Box::new(work),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Observer for this job that outlives submission.
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle { state: Arc::clone(&self.state) }
    }

    /// Run on the current thread, bypassing any scheduler.
    pub fn run_inline(self) -> Result<(), JobError> {
        self.state.mark_running();
        let result = (self.work)();
        self.state.finish(result.clone());
        result
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.state.name).finish_non_exhaustive()
    }
}

/// Read side of a job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    state: Arc<JobState>,
}

impl JobHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        self.state.name()
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.state.kind()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == JobStatus::Running
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status() == JobStatus::Completed
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status() == JobStatus::Failed
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    /// Wall time from start to finish; time so far while running.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let progress = self.state.progress.lock();
        progress.elapsed.or_else(|| progress.started.map(|s| s.elapsed()))
    }

    #[must_use]
    pub fn error(&self) -> Option<JobError> {
        self.state.progress.lock().error.clone()
    }

    /// Block until the job finishes or `timeout` passes (`None` waits
    /// forever). Returns whether the job finished.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut progress = self.state.progress.lock();
        while !progress.status.is_finished() {
            match deadline {
                Some(deadline) => {
                    if self.state.finished.wait_until(&mut progress, deadline).timed_out() {
                        return progress.status.is_finished();
                    }
                }
                None => self.state.finished.wait(&mut progress),
            }
        }
        true
    }
}

/// Wait for every handle against one shared deadline.
pub fn wait_all(handles: &[JobHandle], timeout: Option<Duration>) -> bool {
    let deadline = timeout.map(|t| Instant::now() + t);
    handles.iter().all(|handle| {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        handle.wait(remaining)
    })
}

/// A finished job, as kept in the scheduler history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub name: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub elapsed: Option<Duration>,
    pub error: Option<JobError>,
}
