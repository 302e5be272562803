//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn examgrade() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("examgrade").unwrap();
    cmd.env_remove("EXAMGRADE_WORKERS")
        .env_remove("EXAMGRADE_POINTS_PER_CORRECT")
        .env_remove("EXAMGRADE_PENALTY");
    cmd
}

const ADMISSION: &str = "../../fixtures/admission.toml";

const QUIZ_FIXTURE: &str = r#"
[[exams]]
id = "quiz_1"
answer_key = "ABCDEABCDE"
points_per_correct = 4.0
penalty_per_incorrect = 1.0

[[attempts]]
id = "q_001"
exam_id = "quiz_1"
student_id = "s101"
answers = "ABCDEABCDE"

[[attempts]]
id = "q_002"
exam_id = "quiz_1"
student_id = "s102"
answers = "ABCDEXXXXX"

[[attempts]]
id = "q_003"
exam_id = "quiz_1"
student_id = "s103"
answers = "AAAAAAAAAA"
"#;

/// Run `evaluate` into `out` and return the report path.
fn evaluate_into(fixture: &Path, out: &Path, extra: &[&str]) -> PathBuf {
    examgrade()
        .arg("evaluate")
        .arg("--fixture")
        .arg(fixture)
        .arg("--output")
        .arg(out)
        .args(extra)
        .assert()
        .success();

    std::fs::read_dir(out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "json"))
        .expect("report written")
}

fn load_report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn validate_admission_fixture() {
    examgrade()
        .arg("validate")
        .arg("--fixture")
        .arg(ADMISSION)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 exams, 11 attempts"))
        .stdout(predicate::str::contains("[att_008]"))
        .stdout(predicate::str::contains("unknown exam: exam_F"))
        .stdout(predicate::str::contains("4 warning(s) found"));
}

#[test]
fn validate_directory() {
    examgrade()
        .arg("validate")
        .arg("--fixture")
        .arg("../../fixtures")
        .assert()
        .success()
        .stdout(predicate::str::contains("11 attempts"));
}

#[test]
fn validate_nonexistent_file() {
    examgrade()
        .arg("validate")
        .arg("--fixture")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn evaluate_admission_fixture() {
    let dir = TempDir::new().unwrap();
    let report_path = evaluate_into(Path::new(ADMISSION), dir.path(), &["--workers", "3"]);
    let report = load_report(&report_path);

    assert_eq!(report["summary"]["submitted"], 11);
    assert_eq!(report["summary"]["evaluated"], 8);
    assert_eq!(report["summary"]["failed"], 2);
    assert_eq!(report["summary"]["skipped"], 1);
    assert_eq!(report["settings"]["worker_count"], 3);
    assert_eq!(report["skipped"][0], "att_011");

    let results = report["results"].as_array().unwrap();
    let first = &results[0];
    assert_eq!(first["attempt_id"], "att_001");
    assert_eq!(first["breakdown"]["raw_score"], 1166.25);
    assert_eq!(first["breakdown"]["percentage"], 58.3125);

    let errors = report["errors"].as_array().unwrap();
    let kinds: Vec<&str> = errors
        .iter()
        .map(|e| e["error"]["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"malformed_attempt"));
    assert!(kinds.contains(&"unknown_exam_reference"));
}

#[test]
fn evaluate_prints_summary() {
    let dir = TempDir::new().unwrap();
    examgrade()
        .arg("evaluate")
        .arg("--fixture")
        .arg(ADMISSION)
        .arg("--output")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Complete: 8/11 evaluated, 2 failed, 1 skipped"))
        .stderr(predicate::str::contains("exam_A"))
        .stderr(predicate::str::contains("Results saved to"));
}

#[test]
fn evaluate_strict_rejects_non_pending() {
    let dir = TempDir::new().unwrap();
    examgrade()
        .arg("evaluate")
        .arg("--fixture")
        .arg(ADMISSION)
        .arg("--output")
        .arg(dir.path())
        .arg("--strict")
        .assert()
        .failure()
        .stderr(predicate::str::contains("att_011 is evaluated"));
}

#[test]
fn evaluate_zero_workers_rejected() {
    let dir = TempDir::new().unwrap();
    examgrade()
        .arg("evaluate")
        .arg("--fixture")
        .arg(ADMISSION)
        .arg("--output")
        .arg(dir.path())
        .arg("--workers")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn evaluate_with_custom_config() {
    let dir = TempDir::new().unwrap();
    let fixture = dir.path().join("quiz.toml");
    let config = dir.path().join("examgrade.toml");
    std::fs::write(&fixture, QUIZ_FIXTURE).unwrap();
    std::fs::write(&config, "question_count = 10\nworker_count = 2\n").unwrap();

    let out = dir.path().join("out");
    let report_path = evaluate_into(
        &fixture,
        &out,
        &["--config", config.to_str().unwrap()],
    );
    let report = load_report(&report_path);

    assert_eq!(report["summary"]["evaluated"], 3);
    let results = report["results"].as_array().unwrap();
    // q_003: 2 correct, 8 incorrect under 4/1 scoring
    assert_eq!(results[2]["breakdown"]["raw_score"], 0.0);
    assert_eq!(results[1]["breakdown"]["clamped_score"], 20.0);
    assert_eq!(results[0]["breakdown"]["percentage"], 100.0);
}

#[test]
fn evaluate_rejects_key_of_wrong_length() {
    let dir = TempDir::new().unwrap();
    let fixture = dir.path().join("quiz.toml");
    std::fs::write(&fixture, QUIZ_FIXTURE).unwrap();

    examgrade()
        .arg("evaluate")
        .arg("--fixture")
        .arg(&fixture)
        .arg("--output")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed answer key for exam quiz_1"));
}

#[test]
fn ranking_from_report() {
    let dir = TempDir::new().unwrap();
    let report_path = evaluate_into(Path::new(ADMISSION), dir.path(), &[]);

    examgrade()
        .arg("ranking")
        .arg("--report")
        .arg(&report_path)
        .arg("--exam")
        .arg("exam_A")
        .assert()
        .success()
        .stdout(predicate::str::contains("Luis Quispe"))
        .stdout(predicate::str::contains("2000.00"))
        .stdout(predicate::str::contains("exam_A: 2 attempts"));

    let output = examgrade()
        .arg("ranking")
        .arg("--report")
        .arg(&report_path)
        .arg("--top")
        .arg("3")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let ranked: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ranked = ranked.as_array().unwrap();
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0]["rank"], 1);
    assert_eq!(ranked[0]["attempt_id"], "att_002");
}

#[test]
fn ranking_unknown_exam_fails() {
    let dir = TempDir::new().unwrap();
    let report_path = evaluate_into(Path::new(ADMISSION), dir.path(), &[]);

    examgrade()
        .arg("ranking")
        .arg("--report")
        .arg(&report_path)
        .arg("--exam")
        .arg("exam_Z")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no results for exam exam_Z"));
}

#[test]
fn ranking_nonexistent_report() {
    examgrade()
        .arg("ranking")
        .arg("--report")
        .arg("no_such_file.json")
        .assert()
        .failure();
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    examgrade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examgrade.toml"))
        .stdout(predicate::str::contains("Created fixtures/example.toml"));

    assert!(dir.path().join("examgrade.toml").exists());
    assert!(dir.path().join("fixtures/example.toml").exists());

    // The generated fixture evaluates cleanly.
    examgrade()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--fixture")
        .arg("fixtures/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 attempts"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    // First init
    examgrade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    // Second init should skip
    examgrade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    examgrade()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("admission exam answer sheets"));
}

#[test]
fn version_output() {
    examgrade()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("examgrade"));
}
