// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Frame-loop driver.
//!
//! The [`Engine`] ties the [`EntityCache`] to the [`JobScheduler`]. The host
//! calls [`tick`](Engine::tick) once per frame:
//!
//! ```text
//! tick ─┬─ sweep finished jobs
//!       ├─ every N ticks: submit collect (core) ── barrier
//!       └─ submit plugin jobs ───────────────────── barrier
//! ```
//!
//! Each barrier waits for the jobs submitted in its phase, bounded by
//! `barrier_timeout_ms` when configured. A collect job that overruns its
//! barrier keeps running; later ticks skip collection until it finishes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use entity_engine::{Engine, EngineConfig};
//! use entity_engine::memory::simulated::{SimulatedProcess, SimulatedResolver};
//!
//! let config = EngineConfig::default();
//! let process = Arc::new(SimulatedProcess::new(&config));
//! let mut engine = Engine::new(
//!     config,
//!     process.clone(),
//!     process.clone(),
//!     Arc::new(SimulatedResolver::new()),
//! )
//! .expect("scheduler starts");
//!
//! let report = engine.tick(Vec::new());
//! assert!(report.collected());
//! assert_eq!(engine.cache().version(), 1);
//! ```

mod types;

pub use types::TickReport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{AreaInstance, EntityCache};
use crate::config::EngineConfig;
use crate::entity::EntityResolver;
use crate::memory::{GameContext, MemoryReader};
use crate::metrics;
use crate::scheduler::{wait_all, Job, JobKind, JobScheduler, SchedulerError};

/// Entity cache plus job scheduler, driven one frame at a time.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    cache: Arc<EntityCache>,
    scheduler: JobScheduler,
    ticks: u64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        memory: Arc<dyn MemoryReader>,
        context: Arc<dyn GameContext>,
        resolver: Arc<dyn EntityResolver>,
    ) -> Result<Self, SchedulerError> {
        let cache = Arc::new(EntityCache::new(config.clone(), memory, context, resolver));
        let scheduler = JobScheduler::new(&config)?;
        Ok(Self::from_parts(config, cache, scheduler))
    }

    /// Assemble from a prepared cache (listeners registered, filters set).
    #[must_use]
    pub fn from_parts(config: EngineConfig, cache: Arc<EntityCache>, scheduler: JobScheduler) -> Self {
        Self { config, cache, scheduler, ticks: 0 }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    #[must_use]
    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one frame: collection (when due) followed by `plugin_jobs`.
    pub fn tick(&mut self, plugin_jobs: Vec<Job>) -> TickReport {
        let start = Instant::now();
        self.ticks += 1;
        let mut report = TickReport { tick: self.ticks, ..TickReport::default() };
        let timeout = self.config.barrier_timeout();

        self.scheduler.run_pending();

        if self.ticks % self.config.collect_every_n_ticks.max(1) == 0 {
            let job = self.cache.collect_job();
            let handle = job.handle();
            if self.scheduler.submit(job, JobKind::Core) {
                self.scheduler.run_pending();
                if !handle.wait(timeout) {
                    self.barrier_timeout("collect", timeout);
                    report.barrier_timed_out = true;
                }
                report.collect = Some(handle);
            } else {
                debug!(tick = self.ticks, "Previous collection still running, skipping");
                report.collect_skipped = true;
            }
        }

        let mut handles = Vec::with_capacity(plugin_jobs.len());
        for job in plugin_jobs {
            let handle = job.handle();
            if self.scheduler.submit(job, JobKind::Plugin) {
                handles.push(handle);
            } else {
                report.plugins_rejected += 1;
            }
        }
        report.plugins_submitted = handles.len();
        if !handles.is_empty() {
            self.scheduler.run_pending();
            if !wait_all(&handles, timeout) {
                self.barrier_timeout("plugin", timeout);
                report.barrier_timed_out = true;
            }
        }

        report.elapsed = start.elapsed();
        metrics::record_tick_latency(report.elapsed);
        report
    }

    fn barrier_timeout(&self, phase: &str, timeout: Option<Duration>) {
        warn!(
            tick = self.ticks,
            phase,
            timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64),
            "Tick barrier timed out"
        );
        metrics::record_barrier_timeout();
    }

    /// Reset the cache for a new area, waiting for a running pass.
    pub fn area_changed(&self, area: &AreaInstance) {
        self.cache.on_area_change(area);
    }

    /// Follow `areas` on the scheduler's runtime until the sender is dropped.
    pub fn watch_area_changes(&self, areas: watch::Receiver<AreaInstance>) -> JoinHandle<()> {
        self.scheduler.handle().spawn(Arc::clone(&self.cache).watch_area_changes(areas))
    }

    /// Stop the scheduler, giving running jobs up to `timeout` to finish.
    pub fn shutdown(self, timeout: Duration) {
        info!(ticks = self.ticks, "Engine shutting down");
        self.scheduler.shutdown(timeout);
    }
}
