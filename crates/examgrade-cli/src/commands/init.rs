//! The `examgrade init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create examgrade.toml
    if std::path::Path::new("examgrade.toml").exists() {
        println!("examgrade.toml already exists, skipping.");
    } else {
        std::fs::write("examgrade.toml", SAMPLE_CONFIG)?;
        println!("Created examgrade.toml");
    }

    // Create example fixture
    std::fs::create_dir_all("fixtures")?;
    let example_path = std::path::Path::new("fixtures/example.toml");
    if example_path.exists() {
        println!("fixtures/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_FIXTURE)?;
        println!("Created fixtures/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit examgrade.toml to tune workers and scoring");
    println!("  2. Run: examgrade validate --fixture fixtures/example.toml");
    println!("  3. Run: examgrade evaluate --fixture fixtures/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examgrade configuration

worker_count = 4
scheduling = "dynamic"
chunk_size = 1

# Default scoring for exams that do not set their own
points_per_correct = 20.0
penalty_per_incorrect = 1.125
question_count = 100

# "skip" leaves non-pending attempts alone, "reject" fails the batch
non_pending = "skip"

pass_threshold_pct = 60.0
output_dir = "./examgrade-results"
"#;

const EXAMPLE_FIXTURE: &str = r#"# Area exams use a key of their own letter repeated.

[[exams]]
id = "exam_A"
title = "Admission Exam - Area A: Health Sciences"
area = "A"

[[exams]]
id = "exam_B"
title = "Admission Exam - Area B: Basic Sciences"
area = "B"

[[attempts]]
id = "att_001"
exam_id = "exam_A"
student_id = "s001"
student_name = "Ana Torres"
# 60 correct, 30 incorrect, 10 blank
answers = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABBBBBBBBBBBBBBBBBBBBBBBBBBBBBBXXXXXXXXXX"

[[attempts]]
id = "att_002"
exam_id = "exam_B"
student_id = "s002"
student_name = "Luis Quispe"
answers = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBCCCCCCCCCCCC"

[[attempts]]
id = "att_003"
exam_id = "exam_A"
student_id = "s003"
student_name = "Rosa Mamani"
# Short sheets are padded with blanks
answers = "AAAAAAAAAAAAAAAAAAAA"
"#;
