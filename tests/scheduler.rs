//! Scheduler tests.
//!
//! Run with: `cargo test --test scheduler`
//!
//! # Test Organization
//! - `single_flight_*` - One job per name in flight
//! - `pool_*` - Concurrency bound and isolation
//! - `history_*` - Swept job records
//! - `shutdown_*` - Runtime teardown

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use entity_engine::{EngineConfig, Job, JobError, JobHandle, JobKind, JobScheduler, JobStatus};
use entity_engine::scheduler::wait_all;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn scheduler(workers: usize) -> JobScheduler {
    JobScheduler::new(&EngineConfig { worker_threads: workers, ..EngineConfig::default() }).expect("runtime")
}

/// Job that blocks until `gate` is released.
fn gated(name: &str, gate: &Arc<(parking_lot::Mutex<bool>, parking_lot::Condvar)>) -> Job {
    let gate = Arc::clone(gate);
    Job::new(name, move || {
        let (open, cv) = &*gate;
        let mut open = open.lock();
        while !*open {
            cv.wait(&mut open);
        }
        Ok(())
    })
}

fn release(gate: &Arc<(parking_lot::Mutex<bool>, parking_lot::Condvar)>) {
    *gate.0.lock() = true;
    gate.1.notify_all();
}

// =============================================================================
// Single flight
// =============================================================================

#[test]
fn single_flight_running_job_blocks_resubmission() {
    let scheduler = scheduler(2);
    let gate = Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new()));
    let job = gated("collect", &gate);
    let handle = job.handle();

    assert!(scheduler.submit(job, JobKind::Core));
    scheduler.run_pending();

    for _ in 0..10 {
        assert!(!scheduler.submit(Job::new("collect", || Ok(())), JobKind::Core));
        scheduler.run_pending();
    }

    release(&gate);
    assert!(handle.wait(WAIT));
    scheduler.run_pending();
    assert!(scheduler.submit(Job::new("collect", || Ok(())), JobKind::Core));
}

#[test]
fn single_flight_rejected_job_never_runs() {
    let scheduler = scheduler(2);
    let ran = Arc::new(AtomicUsize::new(0));
    let make = |ran: &Arc<AtomicUsize>| {
        let ran = Arc::clone(ran);
        Job::new("once", move || {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    let first = make(&ran);
    let first_handle = first.handle();
    let second = make(&ran);
    let second_handle = second.handle();

    assert!(scheduler.submit_plugin(first));
    assert!(!scheduler.submit_plugin(second));
    scheduler.run_pending();
    assert!(first_handle.wait(WAIT));

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(second_handle.status(), JobStatus::Queued, "rejected job stays untouched");
}

#[test]
fn single_flight_distinct_names_run_together() {
    let scheduler = scheduler(4);
    let handles: Vec<JobHandle> = (0..4)
        .map(|i| {
            let job = Job::new(format!("job-{i}"), || Ok(()));
            let handle = job.handle();
            assert!(scheduler.submit_plugin(job));
            handle
        })
        .collect();
    assert_eq!(scheduler.run_pending(), 4);
    assert!(wait_all(&handles, WAIT));
    assert!(handles.iter().all(JobHandle::is_completed));
}

// =============================================================================
// Pool
// =============================================================================

#[test]
fn pool_concurrency_is_bounded() {
    let scheduler = scheduler(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<JobHandle> = (0..8)
        .map(|i| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let job = Job::new(format!("bounded-{i}"), move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
            let handle = job.handle();
            scheduler.submit_plugin(job);
            handle
        })
        .collect();

    scheduler.run_pending();
    assert!(wait_all(&handles, WAIT));
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak {} exceeds pool", peak.load(Ordering::SeqCst));
}

#[test]
fn pool_survives_panics_and_failures() {
    let scheduler = scheduler(1);
    let panicking = Job::new("panics", || panic!("plugin bug"));
    let failing = Job::new("fails", || Err(JobError::Failed("read error".into())));
    let fine = Job::new("fine", || Ok(()));
    let handles = [panicking.handle(), failing.handle(), fine.handle()];

    scheduler.submit_plugin(panicking);
    scheduler.submit_plugin(failing);
    scheduler.submit_plugin(fine);
    scheduler.run_pending();
    assert!(wait_all(&handles, WAIT));

    assert!(matches!(handles[0].error(), Some(JobError::Panicked(msg)) if msg == "plugin bug"));
    assert!(handles[1].is_failed());
    assert!(handles[2].is_completed());
}

#[test]
fn pool_elapsed_reported() {
    let scheduler = scheduler(1);
    let job = Job::new("timed", || {
        std::thread::sleep(Duration::from_millis(15));
        Ok(())
    });
    let handle = job.handle();
    scheduler.submit_core(job);
    scheduler.run_pending();
    assert!(handle.wait(WAIT));
    assert!(handle.elapsed().unwrap() >= Duration::from_millis(15));
}

// =============================================================================
// History
// =============================================================================

#[test]
fn history_keeps_most_recent() {
    let config = EngineConfig { worker_threads: 2, job_history_capacity: 4, ..EngineConfig::default() };
    let scheduler = JobScheduler::new(&config).unwrap();

    for i in 0..10 {
        let job = Job::new(format!("h-{i}"), || Ok(()));
        let handle = job.handle();
        scheduler.submit_plugin(job);
        scheduler.run_pending();
        handle.wait(WAIT);
    }
    scheduler.run_pending();

    let history = scheduler.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history.last().unwrap().name, "h-9");
    assert!(history.iter().all(|r| r.status == JobStatus::Completed));
}

#[test]
fn history_disabled_with_zero_capacity() {
    let config = EngineConfig { worker_threads: 1, job_history_capacity: 0, ..EngineConfig::default() };
    let scheduler = JobScheduler::new(&config).unwrap();
    let job = Job::new("unrecorded", || Ok(()));
    let handle = job.handle();
    scheduler.submit_plugin(job);
    scheduler.run_pending();
    handle.wait(WAIT);
    scheduler.run_pending();

    assert!(scheduler.history().is_empty());
    assert!(!scheduler.is_tracked("unrecorded"));
}

#[test]
fn shutdown_waits_for_running_job() {
    let scheduler = scheduler(1);
    let job = Job::new("finishing", || {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    });
    let handle = job.handle();
    scheduler.submit_core(job);
    scheduler.run_pending();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while handle.status() == JobStatus::Queued && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }

    scheduler.shutdown(Duration::from_secs(5));
    assert!(handle.is_completed());
}

#[test]
fn shutdown_cancels_jobs_that_never_started() {
    let scheduler = scheduler(1);
    let gate = Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new()));
    let blocker = gated("blocker", &gate);
    let blocker_handle = blocker.handle();
    let waiting_for_permit = Job::new("waiting", || Ok(()));
    let never_launched = Job::new("unlaunched", || Ok(()));
    let handles = [waiting_for_permit.handle(), never_launched.handle()];

    scheduler.submit_core(blocker);
    scheduler.submit_plugin(waiting_for_permit);
    scheduler.run_pending();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !blocker_handle.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(blocker_handle.is_running());
    scheduler.submit_plugin(never_launched);

    scheduler.shutdown(Duration::from_millis(50));

    for handle in &handles {
        assert!(handle.wait(WAIT), "{} still waits after shutdown", handle.name());
        assert_eq!(handle.status(), JobStatus::Failed);
        assert_eq!(handle.error(), Some(JobError::Cancelled));
    }

    // The job that had started is left to finish on its own
    release(&gate);
    assert!(blocker_handle.wait(WAIT));
    assert!(blocker_handle.is_completed());
}
