//! Evaluation error types.
//!
//! Batch-level variants abort a call before any attempt is dispatched.
//! Attempt-level variants are collected next to the successful results so
//! one bad submission never blocks its siblings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AttemptStatus;

/// Errors produced while validating inputs or evaluating attempts.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EvalError {
    /// The answer key is empty, has the wrong length, or contains a
    /// character outside `A`–`E`.
    #[error("malformed answer key{}: {reason}", exam_suffix(.exam_id))]
    MalformedKey {
        exam_id: Option<String>,
        reason: String,
    },

    /// The submitted answers contain a character outside `A`–`E` / `X`.
    #[error("malformed attempt: invalid answer {found:?} at question {}", .position + 1)]
    MalformedAttempt { position: usize, found: char },

    /// The attempt references an exam the catalog does not know.
    #[error("unknown exam reference: {exam_id}")]
    UnknownExamReference { exam_id: String },

    /// A non-pending attempt was submitted under the strict policy.
    #[error("attempt {attempt_id} is {status}, only pending attempts can be evaluated")]
    NonPendingAttempt {
        attempt_id: String,
        status: AttemptStatus,
    },

    /// An attempt was asked to move backwards or skip a lifecycle step.
    #[error("attempt {attempt_id} cannot move from {from} to {to}")]
    InvalidTransition {
        attempt_id: String,
        from: AttemptStatus,
        to: AttemptStatus,
    },

    /// Engine or scoring configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another batch is already running on this evaluator.
    #[error("a batch is already in progress")]
    BatchInProgress,

    /// The exam catalog failed while resolving an exam.
    #[error("exam catalog error: {0}")]
    Catalog(String),
}

fn exam_suffix(exam_id: &Option<String>) -> String {
    exam_id
        .as_ref()
        .map(|id| format!(" for exam {id}"))
        .unwrap_or_default()
}

impl EvalError {
    /// Returns `true` if this error is reported per attempt instead of
    /// aborting the whole batch.
    pub fn is_per_attempt(&self) -> bool {
        matches!(
            self,
            EvalError::MalformedAttempt { .. }
                | EvalError::UnknownExamReference { .. }
                | EvalError::Catalog(_)
        )
    }

    /// Attach the exam id to a `MalformedKey` raised without one.
    pub fn for_exam(self, exam: &str) -> Self {
        match self {
            EvalError::MalformedKey {
                exam_id: None,
                reason,
            } => EvalError::MalformedKey {
                exam_id: Some(exam.to_string()),
                reason,
            },
            other => other,
        }
    }
}

/// Per-attempt failure reported alongside the successful results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    /// The attempt that failed.
    pub attempt_id: String,
    /// Worker the attempt was assigned to, if it was dispatched.
    pub worker: Option<usize>,
    /// What went wrong.
    pub error: EvalError,
}
