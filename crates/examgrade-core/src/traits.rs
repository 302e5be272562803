//! Collaborator traits for the batch evaluator.
//!
//! The evaluator never owns exam, submission, or result storage. These async
//! traits are implemented by `examgrade-store` (in memory) and by whatever
//! service embeds the engine.

use async_trait::async_trait;

use crate::model::{Attempt, AttemptStatus, EvaluationResult, ExamDefinition};

// ---------------------------------------------------------------------------
// Exam catalog
// ---------------------------------------------------------------------------

/// Resolves exam identifiers to their key and scoring rules.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    /// Look up an exam. `Ok(None)` means the exam does not exist.
    async fn find_exam(&self, exam_id: &str) -> anyhow::Result<Option<ExamDefinition>>;
}

// ---------------------------------------------------------------------------
// Submission store
// ---------------------------------------------------------------------------

/// Supplies attempts awaiting evaluation and records status changes.
#[async_trait]
pub trait AttemptSource: Send + Sync {
    /// All attempts currently in `Pending` status.
    async fn pending_attempts(&self) -> anyhow::Result<Vec<Attempt>>;

    /// Persist a status change for one attempt.
    async fn update_status(&self, attempt_id: &str, status: AttemptStatus) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Results store
// ---------------------------------------------------------------------------

/// Accepts evaluation results for persistence and later display.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn store_results(&self, results: &[EvaluationResult]) -> anyhow::Result<()>;
}
