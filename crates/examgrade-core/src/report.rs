//! Batch report types with JSON persistence.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{BatchOutcome, EvaluatorConfig, Scheduling};
use crate::error::AttemptError;
use crate::model::EvaluationResult;
use crate::statistics::{
    compute_exam_stats, rank_results, BatchSummary, ExamStats, RankedResult, WorkerStats,
};

/// A complete, persistable record of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Engine settings used for the run.
    pub settings: RunSettings,
    pub summary: BatchSummary,
    /// Results sorted by attempt id.
    pub results: Vec<EvaluationResult>,
    pub errors: Vec<AttemptError>,
    pub skipped: Vec<String>,
    pub undispatched: Vec<String>,
    pub workers: Vec<WorkerStats>,
    /// Per-exam score statistics.
    pub exam_stats: HashMap<String, ExamStats>,
    /// Pass threshold used for `exam_stats`, in percent.
    pub pass_threshold_pct: f64,
}

/// Engine settings recorded with a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    pub worker_count: usize,
    pub scheduling: Scheduling,
    pub chunk_size: usize,
}

impl From<&EvaluatorConfig> for RunSettings {
    fn from(config: &EvaluatorConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            scheduling: config.scheduling,
            chunk_size: config.chunk_size,
        }
    }
}

impl BatchReport {
    /// Build a report from a finished batch.
    pub fn from_outcome(
        outcome: BatchOutcome,
        config: &EvaluatorConfig,
        pass_threshold_pct: f64,
    ) -> Self {
        let mut results = outcome.results;
        results.sort_by(|a, b| a.attempt_id.cmp(&b.attempt_id));
        let exam_stats = compute_exam_stats(&results, pass_threshold_pct);

        Self {
            id: outcome.batch_id,
            created_at: Utc::now(),
            settings: RunSettings::from(config),
            summary: outcome.summary,
            results,
            errors: outcome.errors,
            skipped: outcome.skipped,
            undispatched: outcome.undispatched,
            workers: outcome.workers,
            exam_stats,
            pass_threshold_pct,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: BatchReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Ranking of the report's results, optionally restricted to one exam.
    pub fn ranking(&self, exam_id: Option<&str>, limit: Option<usize>) -> Vec<RankedResult> {
        rank_results(
            self.results
                .iter()
                .filter(|r| exam_id.map_or(true, |id| r.exam_id == id)),
            limit,
        )
    }
}
