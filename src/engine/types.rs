//! Types for the engine tick driver.

use std::time::Duration;

use crate::scheduler::JobHandle;

/// What happened during one [`Engine::tick`](super::Engine::tick).
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// 1-based tick counter
    pub tick: u64,
    /// Handle of the collect job submitted this tick, if any
    pub collect: Option<JobHandle>,
    /// The collect job was due but an earlier one was still in flight
    pub collect_skipped: bool,
    pub plugins_submitted: usize,
    /// Plugin jobs rejected because their name was still in flight
    pub plugins_rejected: usize,
    /// A barrier gave up before its jobs finished
    pub barrier_timed_out: bool,
    pub elapsed: Duration,
}

impl TickReport {
    /// Whether this tick ran a collection pass to completion.
    #[must_use]
    pub fn collected(&self) -> bool {
        self.collect.as_ref().is_some_and(JobHandle::is_completed)
    }
}

impl std::fmt::Display for TickReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tick {}", self.tick)?;
        match &self.collect {
            Some(handle) => write!(f, " collect={}", handle.status())?,
            None if self.collect_skipped => write!(f, " collect=skipped")?,
            None => {}
        }
        write!(f, " plugins={}", self.plugins_submitted)?;
        if self.plugins_rejected > 0 {
            write!(f, " rejected={}", self.plugins_rejected)?;
        }
        if self.barrier_timed_out {
            write!(f, " (barrier timeout)")?;
        }
        Ok(())
    }
}
