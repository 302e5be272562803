//! Batch evaluation engine.
//!
//! Scores a batch of pending attempts on a fixed pool of worker tasks.
//! Attempt `i` of the pending list always goes to worker `i % worker_count`,
//! so assignments are reproducible for the same input order. Workers report
//! back through a channel and a single collector loop applies status
//! transitions, records results and errors, and drives progress callbacks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{AttemptError, EvalError};
use crate::model::{Attempt, AttemptStatus, EvaluationResult, ExamDefinition, ProcessingInfo};
use crate::monitor::{ProcessingStats, WorkerMonitor};
use crate::scorer;
use crate::statistics::{average_processing_us, BatchSummary, WorkerStats};
use crate::traits::{AttemptSource, ExamCatalog, ResultSink};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduling label shown on dashboards. Does not change assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduling {
    Static,
    #[default]
    Dynamic,
    Guided,
}

impl fmt::Display for Scheduling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduling::Static => write!(f, "static"),
            Scheduling::Dynamic => write!(f, "dynamic"),
            Scheduling::Guided => write!(f, "guided"),
        }
    }
}

impl FromStr for Scheduling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(Scheduling::Static),
            "dynamic" => Ok(Scheduling::Dynamic),
            "guided" => Ok(Scheduling::Guided),
            other => Err(format!("unknown scheduling strategy: {other}")),
        }
    }
}

/// What to do with attempts that are not `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonPendingPolicy {
    /// Fail the whole call before anything is dispatched.
    Reject,
    /// Leave them untouched and list them in `BatchOutcome::skipped`.
    #[default]
    Skip,
}

/// Configuration for the batch evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Number of worker tasks.
    pub worker_count: usize,
    /// Reporting tag only.
    pub scheduling: Scheduling,
    /// Reporting tag only.
    pub chunk_size: usize,
    /// Handling of non-pending attempts.
    pub non_pending: NonPendingPolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            scheduling: Scheduling::default(),
            chunk_size: 1,
            non_pending: NonPendingPolicy::default(),
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.worker_count == 0 {
            return Err(EvalError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(EvalError::InvalidConfig(
                "chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancels a running batch. Dispatched attempts still finish.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by workers before they pick up each attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Option<watch::Receiver<bool>>);

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self(None)
    }

    /// A connected handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(Arc::new(tx)), CancelSignal(Some(rx)))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_attempt_start(&self, attempt_id: &str, worker: usize);
    fn on_attempt_complete(&self, result: &EvaluationResult);
    fn on_attempt_error(&self, attempt_id: &str, error: &EvalError);
    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_attempt_start(&self, _: &str, _: usize) {}
    fn on_attempt_complete(&self, _: &EvaluationResult) {}
    fn on_attempt_error(&self, _: &str, _: &EvalError) {}
    fn on_batch_complete(&self, _: &BatchSummary) {}
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Worker an attempt was assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub attempt_id: String,
    pub worker: usize,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Results in completion order.
    pub results: Vec<EvaluationResult>,
    /// Per-attempt failures.
    pub errors: Vec<AttemptError>,
    /// Worker assignment of every pending attempt, in input order.
    pub assignments: Vec<Assignment>,
    /// Non-pending attempts left untouched.
    pub skipped: Vec<String>,
    /// Pending attempts not dispatched because the batch was cancelled.
    pub undispatched: Vec<String>,
    pub workers: Vec<WorkerStats>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// Results ordered by attempt id.
    pub fn sorted_results(&self) -> Vec<&EvaluationResult> {
        let mut sorted: Vec<&EvaluationResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.attempt_id.cmp(&b.attempt_id));
        sorted
    }

    pub fn result_for(&self, attempt_id: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.attempt_id == attempt_id)
    }

    pub fn error_for(&self, attempt_id: &str) -> Option<&EvalError> {
        self.errors
            .iter()
            .find(|e| e.attempt_id == attempt_id)
            .map(|e| &e.error)
    }

    pub fn was_cancelled(&self) -> bool {
        !self.undispatched.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Worker plumbing
// ---------------------------------------------------------------------------

struct Job {
    /// Position in the caller's slice.
    index: usize,
    attempt: Attempt,
    exam: Result<Arc<ExamDefinition>, EvalError>,
}

enum WorkerEvent {
    Dispatched {
        index: usize,
        worker: usize,
    },
    Finished {
        index: usize,
        worker: usize,
        elapsed: Duration,
        outcome: Result<EvaluationResult, EvalError>,
    },
}

fn score_job(
    job: &Job,
    worker: usize,
    batch_id: Uuid,
) -> (Result<EvaluationResult, EvalError>, Duration) {
    let start = Instant::now();
    let scored = match &job.exam {
        Ok(exam) => scorer::evaluate_str(&job.attempt.answers, &exam.answer_key, &exam.rules),
        Err(e) => Err(e.clone()),
    };
    let elapsed = start.elapsed();

    let outcome = scored.map(|breakdown| EvaluationResult {
        id: EvaluationResult::id_for(&job.attempt.id),
        attempt_id: job.attempt.id.clone(),
        exam_id: job.attempt.exam_id.clone(),
        student_id: job.attempt.student_id.clone(),
        student_name: job.attempt.student_name.clone(),
        breakdown,
        submitted_at: job.attempt.submitted_at,
        evaluated_at: Utc::now(),
        processing: ProcessingInfo {
            worker,
            duration_us: elapsed.as_micros() as u64,
        },
        batch_id,
    });
    (outcome, elapsed)
}

async fn run_worker(
    worker: usize,
    jobs: Vec<Job>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    cancel: CancelSignal,
    batch_id: Uuid,
) {
    for job in jobs {
        if cancel.is_cancelled() {
            tracing::debug!("worker {worker} stopping, batch cancelled");
            break;
        }
        let index = job.index;
        if events.send(WorkerEvent::Dispatched { index, worker }).is_err() {
            break;
        }
        let (outcome, elapsed) = score_job(&job, worker, batch_id);
        if events
            .send(WorkerEvent::Finished {
                index,
                worker,
                elapsed,
                outcome,
            })
            .is_err()
        {
            break;
        }
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// The batch evaluator.
pub struct BatchEvaluator {
    catalog: Arc<dyn ExamCatalog>,
    config: RwLock<EvaluatorConfig>,
    monitor: WorkerMonitor,
}

impl BatchEvaluator {
    pub fn new(catalog: Arc<dyn ExamCatalog>, config: EvaluatorConfig) -> Self {
        let monitor = WorkerMonitor::new(config.worker_count);
        Self {
            catalog,
            config: RwLock::new(config),
            monitor,
        }
    }

    pub fn config(&self) -> EvaluatorConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration. Refused while a batch is running.
    pub fn update_config(&self, config: EvaluatorConfig) -> Result<(), EvalError> {
        config.validate()?;
        if !self.monitor.resize(config.worker_count) {
            return Err(EvalError::BatchInProgress);
        }
        tracing::info!(
            "evaluator reconfigured: {} workers, {} scheduling",
            config.worker_count,
            config.scheduling
        );
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    /// Current processing state, for dashboards.
    pub fn status(&self) -> ProcessingStats {
        self.monitor.snapshot()
    }

    pub fn is_processing(&self) -> bool {
        self.monitor.is_processing()
    }

    /// Evaluate every pending attempt in `attempts`.
    ///
    /// Statuses in `attempts` are updated in place. Configuration problems and
    /// (under [`NonPendingPolicy::Reject`]) non-pending attempts abort the
    /// call before any attempt changes state. Per-attempt problems land in
    /// [`BatchOutcome::errors`] and never stop the rest of the batch.
    pub async fn evaluate_batch(
        &self,
        attempts: &mut [Attempt],
        progress: &dyn ProgressReporter,
        cancel: CancelSignal,
    ) -> Result<BatchOutcome, EvalError> {
        let config = self.config();
        config.validate()?;

        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for (index, attempt) in attempts.iter().enumerate() {
            if attempt.status == AttemptStatus::Pending {
                pending.push(index);
                continue;
            }
            match config.non_pending {
                NonPendingPolicy::Reject => {
                    return Err(EvalError::NonPendingAttempt {
                        attempt_id: attempt.id.clone(),
                        status: attempt.status,
                    });
                }
                NonPendingPolicy::Skip => {
                    tracing::warn!(
                        "skipping attempt {} with status {}",
                        attempt.id,
                        attempt.status
                    );
                    skipped.push(attempt.id.clone());
                }
            }
        }

        let exams = self.resolve_exams(attempts, &pending).await?;

        let Some(batch) = self.monitor.begin_batch(pending.len()) else {
            return Err(EvalError::BatchInProgress);
        };

        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(
            "batch {batch_id}: {} attempts on {} workers ({} scheduling), {} skipped",
            pending.len(),
            config.worker_count,
            config.scheduling,
            skipped.len()
        );

        // Static round-robin: pending attempt i goes to worker i % n.
        let mut queues: Vec<Vec<Job>> = (0..config.worker_count).map(|_| Vec::new()).collect();
        let mut assignments = Vec::with_capacity(pending.len());
        for (position, &index) in pending.iter().enumerate() {
            let worker = position % config.worker_count;
            let attempt = attempts[index].clone();
            let exam = exams
                .get(attempt.exam_id.as_str())
                .cloned()
                .unwrap_or_else(|| {
                    Err(EvalError::UnknownExamReference {
                        exam_id: attempt.exam_id.clone(),
                    })
                });
            assignments.push(Assignment {
                attempt_id: attempt.id.clone(),
                worker,
            });
            queues[worker].push(Job {
                index,
                attempt,
                exam,
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for (worker, jobs) in queues.into_iter().enumerate() {
            if jobs.is_empty() {
                continue;
            }
            pool.spawn(run_worker(worker, jobs, tx.clone(), cancel.clone(), batch_id));
        }
        drop(tx);

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut workers: Vec<WorkerStats> = (0..config.worker_count)
            .map(|worker| WorkerStats {
                worker,
                evaluated: 0,
                failed: 0,
                busy_us: 0,
            })
            .collect();

        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Dispatched { index, worker } => {
                    let attempt = &mut attempts[index];
                    if let Err(e) = attempt.advance(AttemptStatus::Evaluating) {
                        tracing::warn!("{e}");
                    }
                    self.monitor.on_dispatch(worker, &attempt.id);
                    progress.on_attempt_start(&attempt.id, worker);
                }
                WorkerEvent::Finished {
                    index,
                    worker,
                    elapsed,
                    outcome,
                } => {
                    self.monitor.on_finish(worker, elapsed);
                    let stats = &mut workers[worker];
                    stats.busy_us += elapsed.as_micros() as u64;
                    let attempt = &mut attempts[index];
                    match outcome {
                        Ok(result) => {
                            if let Err(e) = attempt.advance(AttemptStatus::Evaluated) {
                                tracing::warn!("{e}");
                            }
                            stats.evaluated += 1;
                            tracing::debug!(
                                "attempt {} scored {:.3} on worker {worker}",
                                attempt.id,
                                result.breakdown.clamped_score
                            );
                            progress.on_attempt_complete(&result);
                            results.push(result);
                        }
                        Err(error) => {
                            if let Err(e) = attempt.advance(AttemptStatus::Failed) {
                                tracing::warn!("{e}");
                            }
                            stats.failed += 1;
                            tracing::warn!("attempt {} failed: {error}", attempt.id);
                            progress.on_attempt_error(&attempt.id, &error);
                            errors.push(AttemptError {
                                attempt_id: attempt.id.clone(),
                                worker: Some(worker),
                                error,
                            });
                        }
                    }
                }
            }
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("evaluation worker terminated abnormally: {e}");
            }
        }

        drop(batch);

        let undispatched: Vec<String> = pending
            .iter()
            .map(|&index| &attempts[index])
            .filter(|a| a.status == AttemptStatus::Pending)
            .map(|a| a.id.clone())
            .collect();
        if !undispatched.is_empty() {
            tracing::info!(
                "batch {batch_id} cancelled, {} attempts left pending",
                undispatched.len()
            );
        }

        let elapsed = start.elapsed();
        let summary = BatchSummary {
            submitted: attempts.len(),
            evaluated: results.len(),
            failed: errors.len(),
            skipped: skipped.len(),
            undispatched: undispatched.len(),
            average_processing_us: average_processing_us(&results),
            wall_time_ms: elapsed.as_millis() as u64,
        };
        progress.on_batch_complete(&summary);
        tracing::info!(
            "batch {batch_id} complete: {} evaluated, {} failed in {}ms",
            summary.evaluated,
            summary.failed,
            summary.wall_time_ms
        );

        Ok(BatchOutcome {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            results,
            errors,
            assignments,
            skipped,
            undispatched,
            workers,
            summary,
        })
    }

    /// Fetch pending attempts from `source`, evaluate them, hand the results
    /// to `sink`, and write final statuses back.
    ///
    /// An attempt is only marked `Evaluated` in `source` once `sink` accepted
    /// its result. If storing fails, evaluated attempts stay `Pending` there
    /// and a later call scores them again. A failed status write is logged
    /// and does not stop the remaining writes.
    pub async fn evaluate_pending(
        &self,
        source: &dyn AttemptSource,
        sink: &dyn ResultSink,
        progress: &dyn ProgressReporter,
        cancel: CancelSignal,
    ) -> anyhow::Result<BatchOutcome> {
        let mut attempts = source.pending_attempts().await?;
        let outcome = self.evaluate_batch(&mut attempts, progress, cancel).await?;

        let stored = if outcome.results.is_empty() {
            Ok(())
        } else {
            sink.store_results(&outcome.results).await
        };
        if let Err(e) = &stored {
            tracing::error!(
                "storing {} results for batch {} failed: {e:#}",
                outcome.results.len(),
                outcome.batch_id
            );
        }

        let mut first_write_error = None;
        let mut write_failures = 0;
        for attempt in &attempts {
            let write = match attempt.status {
                AttemptStatus::Failed => true,
                AttemptStatus::Evaluated => stored.is_ok(),
                AttemptStatus::Pending | AttemptStatus::Evaluating => false,
            };
            if !write {
                continue;
            }
            if let Err(e) = source.update_status(&attempt.id, attempt.status).await {
                tracing::error!("status update for {} failed: {e:#}", attempt.id);
                write_failures += 1;
                if first_write_error.is_none() {
                    first_write_error = Some(e);
                }
            }
        }

        stored.map_err(|e| e.context("failed to store results"))?;
        if let Some(e) = first_write_error {
            return Err(e.context(format!(
                "{write_failures} status updates failed for batch {}",
                outcome.batch_id
            )));
        }
        Ok(outcome)
    }

    /// Resolve each distinct exam once. Unknown exams and catalog failures
    /// become per-attempt errors; unusable scoring rules abort the call.
    async fn resolve_exams(
        &self,
        attempts: &[Attempt],
        pending: &[usize],
    ) -> Result<HashMap<String, Result<Arc<ExamDefinition>, EvalError>>, EvalError> {
        let mut seen = HashSet::new();
        let exam_ids: Vec<&str> = pending
            .iter()
            .map(|&i| attempts[i].exam_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let lookups = exam_ids.iter().map(|id| self.catalog.find_exam(id));
        let found = futures::future::join_all(lookups).await;

        let mut exams = HashMap::new();
        for (exam_id, lookup) in exam_ids.into_iter().zip(found) {
            let resolved = match lookup {
                Ok(Some(exam)) => {
                    exam.rules.validate().map_err(|e| {
                        EvalError::InvalidConfig(format!("exam {exam_id}: {e}"))
                    })?;
                    Ok(Arc::new(exam))
                }
                Ok(None) => Err(EvalError::UnknownExamReference {
                    exam_id: exam_id.to_string(),
                }),
                Err(e) => {
                    tracing::error!("catalog lookup for {exam_id} failed: {e:#}");
                    Err(EvalError::Catalog(format!("{e:#}")))
                }
            };
            exams.insert(exam_id.to_string(), resolved);
        }
        Ok(exams)
    }
}
