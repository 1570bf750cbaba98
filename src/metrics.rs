// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for entity-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `entity_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `stage`: node, entity, reference
//! - `reason`: eviction rule that fired
//! - `kind`: core, plugin
//! - `status`: completed, failed

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// RECONCILIATION - Per-pass cache maintenance
// ═══════════════════════════════════════════════════════════════════════════

/// Record reconciliation pass duration
pub fn record_pass_latency(duration: Duration) {
    histogram!("entity_engine_pass_seconds").record(duration.as_secs_f64());
}

/// Record candidate count produced by the walker
pub fn record_candidates(count: usize) {
    histogram!("entity_engine_pass_candidates").record(count as f64);
}

/// Record entities inserted this pass
pub fn record_entities_added(count: usize) {
    counter!("entity_engine_entities_added_total").increment(count as u64);
}

/// Record entities removed from the cache
pub fn record_entities_removed(count: usize) {
    counter!("entity_engine_entities_removed_total").increment(count as u64);
}

/// Record an eviction decision
pub fn record_eviction(reason: &str) {
    counter!(
        "entity_engine_evictions_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Set cache partition sizes
pub fn set_cache_entities(valid: usize, invalid: usize) {
    gauge!("entity_engine_cache_entities", "state" => "valid").set(valid as f64);
    gauge!("entity_engine_cache_entities", "state" => "invalid").set(invalid as f64);
}

/// Record a pass that could not reach the list
pub fn record_pass_skipped(reason: &str) {
    counter!(
        "entity_engine_passes_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// TRAVERSAL - Walker health
// ═══════════════════════════════════════════════════════════════════════════

/// Record a walk aborted by the iteration ceiling
pub fn record_walk_aborted() {
    counter!("entity_engine_walk_aborted_total").increment(1);
}

/// Record a failed read
pub fn record_read_failure(stage: &str) {
    counter!(
        "entity_engine_read_failures_total",
        "stage" => stage.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTEXT - Area changes and reference record
// ═══════════════════════════════════════════════════════════════════════════

/// Record an area change reset
pub fn record_area_change() {
    counter!("entity_engine_area_changes_total").increment(1);
}

/// Record a reference record swap
pub fn record_player_updated() {
    counter!("entity_engine_player_updates_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEDULER - Job execution
// ═══════════════════════════════════════════════════════════════════════════

/// Record a finished job
pub fn record_job(kind: &str, status: &str, duration: Duration) {
    counter!(
        "entity_engine_jobs_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "entity_engine_job_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a submission rejected by single-flight
pub fn record_job_rejected(kind: &str) {
    counter!(
        "entity_engine_jobs_rejected_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set number of tracked (queued or running) jobs
pub fn set_jobs_in_flight(count: usize) {
    gauge!("entity_engine_jobs_in_flight").set(count as f64);
}

/// Record a tick barrier that gave up waiting
pub fn record_barrier_timeout() {
    counter!("entity_engine_barrier_timeouts_total").increment(1);
}

/// Record full tick duration
pub fn record_tick_latency(duration: Duration) {
    histogram!("entity_engine_tick_seconds").record(duration.as_secs_f64());
}

/// A timing guard that records pass latency on drop
pub struct PassTimer {
    start: Instant,
}

impl PassTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for PassTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        record_pass_latency(self.start.elapsed());
    }
}
