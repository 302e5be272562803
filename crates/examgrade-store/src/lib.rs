//! examgrade-store: Storage and configuration for examgrade.
//!
//! Implements the evaluator's `ExamCatalog`, `AttemptSource`, and
//! `ResultSink` traits in memory, and loads `examgrade.toml` settings.

pub mod config;
pub mod error;
pub mod memory;

pub use config::{load_config, load_config_from, ExamgradeConfig};
pub use error::StoreError;
pub use memory::{MemoryAttemptStore, MemoryExamCatalog, MemoryResultStore};
