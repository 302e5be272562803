//! Worker utilization bookkeeping for dashboards.
//!
//! Reporting only: nothing here influences assignment, scoring, or ordering.
//! Utilization is the share of the batch wall time a worker spent scoring.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker: usize,
    pub is_active: bool,
    /// Attempt being scored right now, if any.
    pub current_attempt: Option<String>,
    /// Busy time over batch wall time, 0–100.
    pub utilization: f64,
    pub attempts_processed: usize,
    /// Total time spent scoring, in microseconds.
    pub busy_us: u64,
}

impl WorkerSnapshot {
    fn idle(worker: usize) -> Self {
        Self {
            worker,
            is_active: false,
            current_attempt: None,
            utilization: 0.0,
            attempts_processed: 0,
            busy_us: 0,
        }
    }
}

/// Aggregate processing state exposed through `BatchEvaluator::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Attempts accepted into the current (or last) batch.
    pub total_attempts: usize,
    /// Attempts that reached a terminal state.
    pub processed_attempts: usize,
    /// Attempts dispatched but not finished.
    pub currently_processing: usize,
    /// Mean scoring time per processed attempt, in microseconds.
    pub average_processing_us: f64,
    pub is_processing: bool,
    pub workers: Vec<WorkerSnapshot>,
}

impl ProcessingStats {
    fn new(worker_count: usize) -> Self {
        Self {
            total_attempts: 0,
            processed_attempts: 0,
            currently_processing: 0,
            average_processing_us: 0.0,
            is_processing: false,
            workers: (0..worker_count).map(WorkerSnapshot::idle).collect(),
        }
    }
}

/// Shared, lock-protected processing stats.
///
/// Written by the batch collector only; read from anywhere.
pub struct WorkerMonitor {
    inner: Mutex<MonitorState>,
}

struct MonitorState {
    stats: ProcessingStats,
    batch_started: Option<Instant>,
    total_busy_us: u64,
}

impl WorkerMonitor {
    pub fn new(worker_count: usize) -> Self {
        Self {
            inner: Mutex::new(MonitorState {
                stats: ProcessingStats::new(worker_count),
                batch_started: None,
                total_busy_us: 0,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MonitorState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Copy of the current stats.
    pub fn snapshot(&self) -> ProcessingStats {
        self.with_state(|s| {
            let mut stats = s.stats.clone();
            if let Some(started) = s.batch_started {
                refresh_utilization(&mut stats, started.elapsed());
            }
            stats
        })
    }

    pub fn is_processing(&self) -> bool {
        self.with_state(|s| s.stats.is_processing)
    }

    /// Atomically mark a batch as running. Returns `false` if one already is.
    pub fn try_begin_batch(&self, total_attempts: usize) -> bool {
        self.with_state(|s| {
            if s.stats.is_processing {
                return false;
            }
            let worker_count = s.stats.workers.len();
            s.stats = ProcessingStats::new(worker_count);
            s.stats.total_attempts = total_attempts;
            s.stats.is_processing = true;
            s.batch_started = Some(Instant::now());
            s.total_busy_us = 0;
            true
        })
    }

    /// Like [`try_begin_batch`](Self::try_begin_batch), but the batch ends
    /// when the returned guard is dropped.
    pub fn begin_batch(&self, total_attempts: usize) -> Option<BatchGuard<'_>> {
        self.try_begin_batch(total_attempts).then_some(BatchGuard(self))
    }

    pub fn on_dispatch(&self, worker: usize, attempt_id: &str) {
        self.with_state(|s| {
            s.stats.currently_processing += 1;
            if let Some(w) = s.stats.workers.get_mut(worker) {
                w.is_active = true;
                w.current_attempt = Some(attempt_id.to_string());
            }
        });
    }

    pub fn on_finish(&self, worker: usize, busy: Duration) {
        let busy_us = busy.as_micros() as u64;
        self.with_state(|s| {
            s.stats.currently_processing = s.stats.currently_processing.saturating_sub(1);
            s.stats.processed_attempts += 1;
            s.total_busy_us += busy_us;
            s.stats.average_processing_us =
                s.total_busy_us as f64 / s.stats.processed_attempts as f64;
            if let Some(w) = s.stats.workers.get_mut(worker) {
                w.is_active = false;
                w.current_attempt = None;
                w.attempts_processed += 1;
                w.busy_us += busy_us;
            }
        });
    }

    /// Freeze utilization at the final wall time and mark the batch done.
    pub fn end_batch(&self) {
        self.with_state(|s| {
            if let Some(started) = s.batch_started.take() {
                refresh_utilization(&mut s.stats, started.elapsed());
            }
            s.stats.is_processing = false;
            s.stats.currently_processing = 0;
            for w in &mut s.stats.workers {
                w.is_active = false;
                w.current_attempt = None;
            }
        });
    }

    /// Change the number of tracked workers. Refused while a batch runs.
    pub fn resize(&self, worker_count: usize) -> bool {
        self.with_state(|s| {
            if s.stats.is_processing {
                return false;
            }
            if s.stats.workers.len() != worker_count {
                s.stats.workers = (0..worker_count).map(WorkerSnapshot::idle).collect();
            }
            true
        })
    }
}

/// Running batch on a [`WorkerMonitor`]. Dropping it ends the batch.
#[must_use = "the batch ends as soon as the guard is dropped"]
pub struct BatchGuard<'a>(&'a WorkerMonitor);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.end_batch();
    }
}

fn refresh_utilization(stats: &mut ProcessingStats, wall: Duration) {
    let wall_us = wall.as_micros().max(1) as f64;
    for w in &mut stats.workers {
        w.utilization = (w.busy_us as f64 / wall_us * 100.0).min(100.0);
    }
}
