//! examgrade-core: Answer-sheet scoring and batch evaluation.
//!
//! This crate defines the exam and attempt model, the per-sheet scorer, the
//! concurrent batch evaluator, and the statistics and reports built on top.

pub mod engine;
pub mod error;
pub mod model;
pub mod monitor;
pub mod parser;
pub mod report;
pub mod scorer;
pub mod statistics;
pub mod traits;
