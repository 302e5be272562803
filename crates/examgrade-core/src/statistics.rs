//! Batch summaries, per-exam score statistics, and rankings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::EvaluationResult;

/// Percentage at or above which an attempt counts as passing.
pub const DEFAULT_PASS_THRESHOLD_PCT: f64 = 60.0;

/// Counts and timings for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Attempts handed to the evaluator.
    pub submitted: usize,
    /// Attempts that produced a result.
    pub evaluated: usize,
    /// Attempts reported as errors.
    pub failed: usize,
    /// Non-pending attempts filtered out before dispatch.
    pub skipped: usize,
    /// Pending attempts never dispatched because the batch was cancelled.
    pub undispatched: usize,
    /// Mean scoring time over evaluated attempts, in microseconds.
    pub average_processing_us: f64,
    /// Wall-clock duration of the batch, in milliseconds.
    pub wall_time_ms: u64,
}

/// Per-worker totals for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    pub evaluated: usize,
    pub failed: usize,
    pub busy_us: u64,
}

/// Average scoring time of `results`, in microseconds.
pub fn average_processing_us(results: &[EvaluationResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: u64 = results.iter().map(|r| r.processing.duration_us).sum();
    total as f64 / results.len() as f64
}

/// Score statistics for one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamStats {
    pub exam_id: String,
    pub total: usize,
    /// Mean clamped score, rounded to two decimals.
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    /// Share of results at or above the pass threshold, in percent,
    /// rounded to two decimals.
    pub pass_rate: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Compute statistics over a set of results, regardless of exam.
pub fn score_stats<'a>(
    exam_id: &str,
    results: impl IntoIterator<Item = &'a EvaluationResult>,
    pass_threshold_pct: f64,
) -> ExamStats {
    let scores: Vec<(f64, f64)> = results
        .into_iter()
        .map(|r| (r.breakdown.clamped_score, r.breakdown.percentage))
        .collect();

    if scores.is_empty() {
        return ExamStats {
            exam_id: exam_id.to_string(),
            total: 0,
            average_score: 0.0,
            highest_score: 0.0,
            lowest_score: 0.0,
            pass_rate: 0.0,
        };
    }

    let n = scores.len() as f64;
    let sum: f64 = scores.iter().map(|(s, _)| s).sum();
    let highest = scores.iter().map(|(s, _)| *s).fold(f64::MIN, f64::max);
    let lowest = scores.iter().map(|(s, _)| *s).fold(f64::MAX, f64::min);
    let passed = scores
        .iter()
        .filter(|(_, pct)| *pct >= pass_threshold_pct)
        .count() as f64;

    ExamStats {
        exam_id: exam_id.to_string(),
        total: scores.len(),
        average_score: round2(sum / n),
        highest_score: highest,
        lowest_score: lowest,
        pass_rate: round2(passed / n * 100.0),
    }
}

/// Statistics for every exam present in `results`, keyed by exam id.
pub fn compute_exam_stats(
    results: &[EvaluationResult],
    pass_threshold_pct: f64,
) -> HashMap<String, ExamStats> {
    let mut grouped: HashMap<&str, Vec<&EvaluationResult>> = HashMap::new();
    for r in results {
        grouped.entry(r.exam_id.as_str()).or_default().push(r);
    }

    grouped
        .into_iter()
        .map(|(exam_id, group)| {
            (
                exam_id.to_string(),
                score_stats(exam_id, group, pass_threshold_pct),
            )
        })
        .collect()
}

/// One row of an admission ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based position.
    pub rank: usize,
    pub attempt_id: String,
    pub student_id: String,
    pub student_name: String,
    pub exam_id: String,
    pub score: f64,
    pub percentage: f64,
}

/// Rank results by clamped score, highest first.
///
/// Ties are broken by attempt id so the order is stable across runs.
pub fn rank_results<'a>(
    results: impl IntoIterator<Item = &'a EvaluationResult>,
    limit: Option<usize>,
) -> Vec<RankedResult> {
    let mut sorted: Vec<&EvaluationResult> = results.into_iter().collect();
    sorted.sort_by(|a, b| {
        b.breakdown
            .clamped_score
            .total_cmp(&a.breakdown.clamped_score)
            .then_with(|| a.attempt_id.cmp(&b.attempt_id))
    });

    sorted
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, r)| RankedResult {
            rank: i + 1,
            attempt_id: r.attempt_id.clone(),
            student_id: r.student_id.clone(),
            student_name: r.student_name.clone(),
            exam_id: r.exam_id.clone(),
            score: r.breakdown.clamped_score,
            percentage: r.breakdown.percentage,
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::result;
    use super::*;

    #[test]
    fn exam_stats_basic() {
        let results = vec![
            result("a1", "exam_A", 80),
            result("a2", "exam_A", 50),
            result("a3", "exam_A", 60),
        ];
        let stats = score_stats("exam_A", &results, DEFAULT_PASS_THRESHOLD_PCT);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.highest_score, 1600.0);
        assert_eq!(stats.lowest_score, 1000.0);
        assert_eq!(stats.average_score, 1266.67);
        assert_eq!(stats.pass_rate, 66.67);
    }

    #[test]
    fn exam_stats_empty() {
        let stats = score_stats("none", &[], DEFAULT_PASS_THRESHOLD_PCT);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_score, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
    }

    #[test]
    fn stats_grouped_per_exam() {
        let results = vec![
            result("a1", "exam_A", 80),
            result("b1", "exam_B", 10),
            result("b2", "exam_B", 20),
        ];
        let stats = compute_exam_stats(&results, DEFAULT_PASS_THRESHOLD_PCT);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["exam_A"].total, 1);
        assert_eq!(stats["exam_B"].total, 2);
        assert_eq!(stats["exam_B"].pass_rate, 0.0);
    }

    #[test]
    fn ranking_orders_by_score_then_id() {
        let results = vec![
            result("c", "exam_A", 50),
            result("a", "exam_A", 90),
            result("b", "exam_A", 50),
        ];
        let ranked = rank_results(&results, None);
        let ids: Vec<&str> = ranked.iter().map(|r| r.attempt_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);

        let top = rank_results(&results, Some(1));
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].attempt_id, "a");
    }

    #[test]
    fn average_processing_time() {
        let results = vec![result("a", "e", 1), result("b", "e", 2)];
        assert_eq!(average_processing_us(&results), 10.0);
        assert_eq!(average_processing_us(&[]), 0.0);
    }
}
