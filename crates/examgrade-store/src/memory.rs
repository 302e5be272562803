//! In-memory stores for exams, attempts, and results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use examgrade_core::error::EvalError;
use examgrade_core::model::{
    AnswerKey, Area, Attempt, AttemptStatus, EvaluationResult, ExamDefinition,
    DEFAULT_QUESTION_COUNT,
};
use examgrade_core::statistics::{
    rank_results, score_stats, ExamStats, RankedResult, DEFAULT_PASS_THRESHOLD_PCT,
};
use examgrade_core::traits::{AttemptSource, ExamCatalog, ResultSink};

use crate::error::StoreError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Exams
// ---------------------------------------------------------------------------

/// Exam catalog backed by a map.
///
/// Every registered key must have exactly `question_count` questions.
pub struct MemoryExamCatalog {
    exams: Mutex<HashMap<String, ExamDefinition>>,
    question_count: usize,
    lookup_count: AtomicU32,
}

impl Default for MemoryExamCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTION_COUNT)
    }
}

impl MemoryExamCatalog {
    pub fn new(question_count: usize) -> Self {
        Self {
            exams: Mutex::new(HashMap::new()),
            question_count,
            lookup_count: AtomicU32::new(0),
        }
    }

    /// A catalog with one exam per admission area, `exam_A` through
    /// `exam_E`, each keyed with its own area letter.
    pub fn with_area_exams(question_count: usize) -> Result<Self, StoreError> {
        let catalog = Self::new(question_count);
        for area in Area::ALL {
            let key = AnswerKey::uniform(area.code(), question_count)?;
            catalog.insert(
                ExamDefinition::new(format!("exam_{area}"), key)
                    .with_area(area)
                    .with_title(format!("Admission Exam - Area {area}: {}", area.name())),
            )?;
        }
        Ok(catalog)
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }

    fn check(&self, exam: &ExamDefinition) -> Result<(), StoreError> {
        exam.answer_key
            .clone()
            .expect_len(self.question_count)
            .map_err(|e| e.for_exam(&exam.id))?;
        exam.rules
            .validate()
            .map_err(|e| EvalError::InvalidConfig(format!("exam {}: {e}", exam.id)))?;
        Ok(())
    }

    /// Register a new exam.
    pub fn insert(&self, exam: ExamDefinition) -> Result<(), StoreError> {
        self.check(&exam)?;
        let mut exams = lock(&self.exams);
        if exams.contains_key(&exam.id) {
            return Err(StoreError::DuplicateExam(exam.id));
        }
        tracing::debug!("registered exam {}", exam.id);
        exams.insert(exam.id.clone(), exam);
        Ok(())
    }

    pub fn get(&self, exam_id: &str) -> Option<ExamDefinition> {
        lock(&self.exams).get(exam_id).cloned()
    }

    /// All exams, sorted by id.
    pub fn list(&self) -> Vec<ExamDefinition> {
        let mut exams: Vec<_> = lock(&self.exams).values().cloned().collect();
        exams.sort_by(|a, b| a.id.cmp(&b.id));
        exams
    }

    pub fn list_by_area(&self, area: Area) -> Vec<ExamDefinition> {
        self.list()
            .into_iter()
            .filter(|e| e.area == Some(area))
            .collect()
    }

    pub fn list_active(&self) -> Vec<ExamDefinition> {
        self.list().into_iter().filter(|e| e.is_active).collect()
    }

    /// Replace an existing exam.
    pub fn update(&self, exam: ExamDefinition) -> Result<(), StoreError> {
        self.check(&exam)?;
        let mut exams = lock(&self.exams);
        match exams.get_mut(&exam.id) {
            Some(slot) => {
                *slot = exam;
                Ok(())
            }
            None => Err(StoreError::ExamNotFound(exam.id)),
        }
    }

    pub fn remove(&self, exam_id: &str) -> Result<ExamDefinition, StoreError> {
        lock(&self.exams)
            .remove(exam_id)
            .ok_or_else(|| StoreError::ExamNotFound(exam_id.to_string()))
    }

    /// Flip the active flag and return the new value.
    pub fn toggle_active(&self, exam_id: &str) -> Result<bool, StoreError> {
        let mut exams = lock(&self.exams);
        let exam = exams
            .get_mut(exam_id)
            .ok_or_else(|| StoreError::ExamNotFound(exam_id.to_string()))?;
        exam.is_active = !exam.is_active;
        Ok(exam.is_active)
    }

    /// Number of `find_exam` calls served.
    pub fn lookup_count(&self) -> u32 {
        self.lookup_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExamCatalog for MemoryExamCatalog {
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<ExamDefinition>> {
        self.lookup_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.get(exam_id))
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Submission store backed by a map.
#[derive(Default)]
pub struct MemoryAttemptStore {
    attempts: Mutex<HashMap<String, Attempt>>,
}

/// Sort by submission time, then id.
fn in_submission_order(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
    attempts.sort_by(|a, b| {
        a.submitted_at
            .cmp(&b.submitted_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    attempts
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, attempt: Attempt) -> Result<(), StoreError> {
        let mut attempts = lock(&self.attempts);
        if attempts.contains_key(&attempt.id) {
            return Err(StoreError::DuplicateAttempt(attempt.id));
        }
        attempts.insert(attempt.id.clone(), attempt);
        Ok(())
    }

    /// Insert many attempts, stopping at the first duplicate.
    pub fn insert_all(&self, attempts: impl IntoIterator<Item = Attempt>) -> Result<(), StoreError> {
        attempts.into_iter().try_for_each(|a| self.insert(a))
    }

    pub fn get(&self, attempt_id: &str) -> Option<Attempt> {
        lock(&self.attempts).get(attempt_id).cloned()
    }

    /// All attempts in submission order.
    pub fn list(&self) -> Vec<Attempt> {
        in_submission_order(lock(&self.attempts).values().cloned().collect())
    }

    pub fn list_by_status(&self, status: AttemptStatus) -> Vec<Attempt> {
        in_submission_order(
            lock(&self.attempts)
                .values()
                .filter(|a| a.status == status)
                .cloned()
                .collect(),
        )
    }

    pub fn list_by_student(&self, student_id: &str) -> Vec<Attempt> {
        in_submission_order(
            lock(&self.attempts)
                .values()
                .filter(|a| a.student_id == student_id)
                .cloned()
                .collect(),
        )
    }

    /// Replace the answers of a still-pending attempt.
    pub fn update_answers(&self, attempt_id: &str, answers: &str) -> Result<(), StoreError> {
        let mut attempts = lock(&self.attempts);
        let attempt = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))?;
        if attempt.status != AttemptStatus::Pending {
            return Err(EvalError::NonPendingAttempt {
                attempt_id: attempt_id.to_string(),
                status: attempt.status,
            }
            .into());
        }
        attempt.answers = answers.to_string();
        Ok(())
    }

    /// Record a status change along the attempt state machine.
    ///
    /// A `Pending` attempt may also move straight to a terminal status:
    /// `Evaluating` only exists on the evaluator's copy, so the store sees
    /// just the final outcome. Writing the current status again is a no-op.
    pub fn set_status(&self, attempt_id: &str, status: AttemptStatus) -> Result<(), StoreError> {
        let mut attempts = lock(&self.attempts);
        let attempt = attempts
            .get_mut(attempt_id)
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))?;
        if attempt.status == status {
            return Ok(());
        }
        let allowed = attempt.status.can_advance_to(status)
            || (attempt.status == AttemptStatus::Pending && status.is_terminal());
        if !allowed {
            return Err(EvalError::InvalidTransition {
                attempt_id: attempt_id.to_string(),
                from: attempt.status,
                to: status,
            }
            .into());
        }
        attempt.status = status;
        Ok(())
    }

    pub fn remove(&self, attempt_id: &str) -> Result<Attempt, StoreError> {
        lock(&self.attempts)
            .remove(attempt_id)
            .ok_or_else(|| StoreError::AttemptNotFound(attempt_id.to_string()))
    }

    pub fn len(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.attempts).is_empty()
    }
}

#[async_trait]
impl AttemptSource for MemoryAttemptStore {
    async fn pending_attempts(&self) -> anyhow::Result<Vec<Attempt>> {
        Ok(self.list_by_status(AttemptStatus::Pending))
    }

    async fn update_status(&self, attempt_id: &str, status: AttemptStatus) -> anyhow::Result<()> {
        self.set_status(attempt_id, status)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result store backed by a map keyed by result id.
#[derive(Default)]
pub struct MemoryResultStore {
    results: Mutex<HashMap<String, EvaluationResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace results. A re-evaluated attempt keeps one result.
    pub fn insert_all(&self, results: impl IntoIterator<Item = EvaluationResult>) {
        let mut stored = lock(&self.results);
        for r in results {
            stored.insert(r.id.clone(), r);
        }
    }

    pub fn get(&self, result_id: &str) -> Option<EvaluationResult> {
        lock(&self.results).get(result_id).cloned()
    }

    /// All results, sorted by attempt id.
    pub fn list(&self) -> Vec<EvaluationResult> {
        self.filtered(|_| true)
    }

    pub fn by_student(&self, student_id: &str) -> Vec<EvaluationResult> {
        self.filtered(|r| r.student_id == student_id)
    }

    pub fn by_exam(&self, exam_id: &str) -> Vec<EvaluationResult> {
        self.filtered(|r| r.exam_id == exam_id)
    }

    /// Results for every exam `catalog` files under `area`.
    pub fn by_area(&self, catalog: &MemoryExamCatalog, area: Area) -> Vec<EvaluationResult> {
        let exam_ids: Vec<String> = catalog
            .list_by_area(area)
            .into_iter()
            .map(|e| e.id)
            .collect();
        self.filtered(|r| exam_ids.contains(&r.exam_id))
    }

    /// The `limit` best results in `area`.
    pub fn top_by_area(
        &self,
        catalog: &MemoryExamCatalog,
        area: Area,
        limit: usize,
    ) -> Vec<RankedResult> {
        rank_results(&self.by_area(catalog, area), Some(limit))
    }

    /// Score statistics over every result in `area`.
    pub fn area_stats(&self, catalog: &MemoryExamCatalog, area: Area) -> ExamStats {
        score_stats(
            &format!("area_{area}"),
            &self.by_area(catalog, area),
            DEFAULT_PASS_THRESHOLD_PCT,
        )
    }

    pub fn remove(&self, result_id: &str) -> Result<EvaluationResult, StoreError> {
        lock(&self.results)
            .remove(result_id)
            .ok_or_else(|| StoreError::ResultNotFound(result_id.to_string()))
    }

    pub fn len(&self) -> usize {
        lock(&self.results).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.results).is_empty()
    }

    fn filtered(&self, keep: impl Fn(&EvaluationResult) -> bool) -> Vec<EvaluationResult> {
        let mut out: Vec<_> = lock(&self.results)
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.attempt_id.cmp(&b.attempt_id));
        out
    }
}

#[async_trait]
impl ResultSink for MemoryResultStore {
    async fn store_results(&self, results: &[EvaluationResult]) -> anyhow::Result<()> {
        self.insert_all(results.iter().cloned());
        tracing::debug!("stored {} results", results.len());
        Ok(())
    }
}
