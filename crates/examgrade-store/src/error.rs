//! Store error types.

use thiserror::Error;

use examgrade_core::error::EvalError;

/// Errors returned by the in-memory stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An exam with this id is already registered.
    #[error("exam already exists: {0}")]
    DuplicateExam(String),

    /// No exam with this id.
    #[error("exam not found: {0}")]
    ExamNotFound(String),

    /// An attempt with this id is already stored.
    #[error("attempt already exists: {0}")]
    DuplicateAttempt(String),

    /// No attempt with this id.
    #[error("attempt not found: {0}")]
    AttemptNotFound(String),

    /// No result with this id.
    #[error("result not found: {0}")]
    ResultNotFound(String),

    /// The record failed domain validation.
    #[error(transparent)]
    Invalid(#[from] EvalError),
}
