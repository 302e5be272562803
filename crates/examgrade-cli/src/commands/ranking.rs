//! The `examgrade ranking` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examgrade_core::report::BatchReport;

pub fn execute(report_path: PathBuf, exam: Option<String>, top: usize, json: bool) -> Result<()> {
    anyhow::ensure!(top >= 1, "top must be at least 1");

    let report = BatchReport::load_json(&report_path)?;
    if let Some(id) = &exam {
        anyhow::ensure!(
            report.results.iter().any(|r| &r.exam_id == id),
            "no results for exam {id} in {}",
            report_path.display()
        );
    }

    let ranked = report.ranking(exam.as_deref(), Some(top));

    if json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Student", "Attempt", "Exam", "Score", "Percent"]);
    for row in &ranked {
        let student = if row.student_name.is_empty() {
            row.student_id.clone()
        } else {
            format!("{} ({})", row.student_name, row.student_id)
        };
        table.add_row(vec![
            Cell::new(row.rank),
            Cell::new(student),
            Cell::new(&row.attempt_id),
            Cell::new(&row.exam_id),
            Cell::new(format!("{:.2}", row.score)),
            Cell::new(format!("{:.2}%", row.percentage)),
        ]);
    }
    println!("{table}");

    if let Some(stats) = exam.as_deref().and_then(|id| report.exam_stats.get(id)) {
        println!(
            "{}: {} attempts, average {:.2}, pass rate {:.1}%",
            stats.exam_id, stats.total, stats.average_score, stats.pass_rate
        );
    }

    Ok(())
}
