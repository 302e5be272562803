//! The `examgrade evaluate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use examgrade_core::engine::{BatchEvaluator, CancelSignal, NonPendingPolicy, ProgressReporter};
use examgrade_core::error::EvalError;
use examgrade_core::model::EvaluationResult;
use examgrade_core::parser;
use examgrade_core::report::BatchReport;
use examgrade_core::statistics::BatchSummary;
use examgrade_store::config::load_config_from;
use examgrade_store::MemoryExamCatalog;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_attempt_start(&self, attempt_id: &str, worker: usize) {
        tracing::debug!("worker {worker} picked up {attempt_id}");
    }

    fn on_attempt_complete(&self, result: &EvaluationResult) {
        let b = &result.breakdown;
        eprintln!(
            "  Done: {} [worker {}] {:.2} pts ({:.2}%) {}/{}/{} ({}us)",
            result.attempt_id,
            result.processing.worker,
            b.clamped_score,
            b.percentage,
            b.correct_count,
            b.incorrect_count,
            b.blank_count,
            result.processing.duration_us,
        );
    }

    fn on_attempt_error(&self, attempt_id: &str, error: &EvalError) {
        eprintln!("  ERROR: {attempt_id}: {error}");
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        eprintln!(
            "\nComplete: {}/{} evaluated, {} failed, {} skipped ({}ms)",
            summary.evaluated,
            summary.submitted,
            summary.failed,
            summary.skipped,
            summary.wall_time_ms,
        );
    }
}

pub async fn execute(
    fixture_path: PathBuf,
    workers: Option<usize>,
    output: Option<PathBuf>,
    strict: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    // Load config and apply flag overrides
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(n) = workers {
        anyhow::ensure!(n >= 1, "workers must be at least 1");
        config.worker_count = n;
    }
    if strict {
        config.non_pending = NonPendingPolicy::Reject;
    }
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    // Load fixture
    let fixture = parser::load_fixture(&fixture_path, &config.fixture_options())?;
    let warnings = parser::validate_fixture(&fixture);
    for w in &warnings {
        tracing::warn!(
            "{}: {}",
            w.subject.as_deref().unwrap_or("fixture"),
            w.message
        );
    }

    let catalog = MemoryExamCatalog::new(config.question_count);
    for exam in fixture.exams {
        let id = exam.id.clone();
        catalog
            .insert(exam)
            .with_context(|| format!("cannot register exam {id}"))?;
    }

    let evaluator = BatchEvaluator::new(Arc::new(catalog), config.evaluator_config());

    // Ctrl-C stops dispatching; in-flight attempts still finish.
    let (cancel, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing in-flight attempts...");
            cancel.cancel();
        }
    });

    let mut attempts = fixture.attempts;
    eprintln!(
        "examgrade v{} - Evaluating {} attempts on {} workers",
        env!("CARGO_PKG_VERSION"),
        attempts.len(),
        config.worker_count,
    );
    eprintln!();

    let outcome = evaluator
        .evaluate_batch(&mut attempts, &ConsoleReporter, signal)
        .await?;

    let settings = evaluator.config();
    let report = BatchReport::from_outcome(outcome, &settings, config.pass_threshold_pct);

    print_summary(&report);

    // Save report
    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("report-{timestamp}.json"));
    report.save_json(&path)?;
    eprintln!("Results saved to: {}", path.display());

    Ok(())
}

fn print_summary(report: &BatchReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Exam", "Attempts", "Average", "Highest", "Lowest", "Pass %"]);

    let mut exams: Vec<_> = report.exam_stats.values().collect();
    exams.sort_by(|a, b| a.exam_id.cmp(&b.exam_id));
    for stats in exams {
        table.add_row(vec![
            Cell::new(&stats.exam_id),
            Cell::new(stats.total),
            Cell::new(format!("{:.2}", stats.average_score)),
            Cell::new(format!("{:.2}", stats.highest_score)),
            Cell::new(format!("{:.2}", stats.lowest_score)),
            Cell::new(format!("{:.1}%", stats.pass_rate)),
        ]);
    }
    eprintln!("\n{table}");

    let mut workers = Table::new();
    workers.set_header(vec!["Worker", "Evaluated", "Failed", "Busy"]);
    for w in &report.workers {
        workers.add_row(vec![
            Cell::new(w.worker),
            Cell::new(w.evaluated),
            Cell::new(w.failed),
            Cell::new(format!("{}us", w.busy_us)),
        ]);
    }
    eprintln!("{workers}");

    if !report.errors.is_empty() {
        let mut errors = Table::new();
        errors.set_header(vec!["Attempt", "Worker", "Error"]);
        for e in &report.errors {
            errors.add_row(vec![
                Cell::new(&e.attempt_id),
                Cell::new(e.worker.map(|w| w.to_string()).unwrap_or_else(|| "-".into())),
                Cell::new(&e.error),
            ]);
        }
        eprintln!("{errors}");
    }

    if !report.undispatched.is_empty() {
        eprintln!(
            "Cancelled: {} attempts left pending",
            report.undispatched.len()
        );
    }
}
