//! TOML fixture parser.
//!
//! Loads exams and submitted attempts from TOML files and directories, and
//! validates them before a batch run.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{
    AnswerKey, AnswerSequence, Area, Attempt, AttemptStatus, ExamDefinition, ScoringRules,
    DEFAULT_QUESTION_COUNT,
};

/// Exams and attempts loaded from one fixture file.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub exams: Vec<ExamDefinition>,
    pub attempts: Vec<Attempt>,
}

impl Fixture {
    /// Merge several fixtures into one.
    pub fn merge(fixtures: impl IntoIterator<Item = Fixture>) -> Fixture {
        let mut merged = Fixture::default();
        for f in fixtures {
            merged.exams.extend(f.exams);
            merged.attempts.extend(f.attempts);
        }
        merged
    }
}

/// Defaults applied to exams that do not override them.
#[derive(Debug, Clone, Copy)]
pub struct FixtureOptions {
    /// Required key length.
    pub question_count: usize,
    /// Rules for exams without their own.
    pub rules: ScoringRules,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            question_count: DEFAULT_QUESTION_COUNT,
            rules: ScoringRules::default(),
        }
    }
}

/// Intermediate TOML structure for parsing fixture files.
#[derive(Debug, Deserialize)]
struct TomlFixtureFile {
    #[serde(default)]
    exams: Vec<TomlExam>,
    #[serde(default)]
    attempts: Vec<TomlAttempt>,
}

#[derive(Debug, Deserialize)]
struct TomlExam {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    answer_key: Option<String>,
    #[serde(default)]
    uniform_key: Option<char>,
    #[serde(default)]
    points_per_correct: Option<f64>,
    #[serde(default)]
    penalty_per_incorrect: Option<f64>,
    #[serde(default = "default_true")]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct TomlAttempt {
    id: String,
    exam_id: String,
    student_id: String,
    #[serde(default)]
    student_name: String,
    #[serde(default)]
    answers: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    submitted_at: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Parse a single TOML file into a `Fixture`.
pub fn parse_fixture(path: &Path, options: &FixtureOptions) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file: {}", path.display()))?;

    parse_fixture_str(&content, path, options)
}

/// Parse a TOML string into a `Fixture` (useful for testing).
pub fn parse_fixture_str(
    content: &str,
    source_path: &Path,
    options: &FixtureOptions,
) -> Result<Fixture> {
    let parsed: TomlFixtureFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let exams = parsed
        .exams
        .into_iter()
        .map(|e| build_exam(e, options))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid exam in {}", source_path.display()))?;

    let attempts = parsed
        .attempts
        .into_iter()
        .map(build_attempt)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid attempt in {}", source_path.display()))?;

    Ok(Fixture { exams, attempts })
}

fn build_exam(e: TomlExam, options: &FixtureOptions) -> Result<ExamDefinition> {
    let area = e
        .area
        .as_deref()
        .map(|a| a.parse::<Area>().map_err(|err| anyhow::anyhow!("{err}")))
        .transpose()?;

    let key = match (&e.answer_key, e.uniform_key, area) {
        (Some(key), None, _) => AnswerKey::parse(key),
        (None, Some(choice), _) => AnswerKey::uniform(choice, options.question_count),
        (None, None, Some(area)) => AnswerKey::uniform(area.code(), options.question_count),
        (Some(_), Some(_), _) => {
            anyhow::bail!("exam {}: set either answer_key or uniform_key, not both", e.id)
        }
        (None, None, None) => {
            anyhow::bail!("exam {}: needs answer_key, uniform_key, or area", e.id)
        }
    }
    .and_then(|k| k.expect_len(options.question_count))
    .map_err(|err| err.for_exam(&e.id))?;

    let rules = ScoringRules {
        points_per_correct: e
            .points_per_correct
            .unwrap_or(options.rules.points_per_correct),
        penalty_per_incorrect: e
            .penalty_per_incorrect
            .unwrap_or(options.rules.penalty_per_incorrect),
    };
    rules
        .validate()
        .with_context(|| format!("exam {}", e.id))?;

    Ok(ExamDefinition {
        id: e.id,
        title: e.title,
        area,
        answer_key: key,
        rules,
        is_active: e.is_active,
    })
}

fn build_attempt(a: TomlAttempt) -> Result<Attempt> {
    let status = a
        .status
        .as_deref()
        .map(|s| s.parse::<AttemptStatus>().map_err(|err| anyhow::anyhow!("{err}")))
        .transpose()
        .with_context(|| format!("attempt {}", a.id))?
        .unwrap_or(AttemptStatus::Pending);

    let submitted_at = match a.submitted_at.as_deref() {
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .with_context(|| format!("attempt {}: invalid submitted_at {ts:?}", a.id))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    // Answers stay raw: malformed sheets are reported per attempt by the
    // evaluator, not rejected at load time.
    Ok(Attempt {
        id: a.id,
        exam_id: a.exam_id,
        student_id: a.student_id,
        student_name: a.student_name,
        answers: a.answers,
        submitted_at,
        status,
    })
}

/// Recursively load all `.toml` fixture files from a directory.
pub fn load_fixture_directory(dir: &Path, options: &FixtureOptions) -> Result<Vec<Fixture>> {
    let mut fixtures = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            fixtures.extend(load_fixture_directory(&path, options)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_fixture(&path, options) {
                Ok(fixture) => fixtures.push(fixture),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(fixtures)
}

/// Load a single file or every fixture under a directory, merged.
pub fn load_fixture(path: &Path, options: &FixtureOptions) -> Result<Fixture> {
    if path.is_dir() {
        Ok(Fixture::merge(load_fixture_directory(path, options)?))
    } else {
        parse_fixture(path, options)
    }
}

/// A warning from fixture validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The exam or attempt ID (if applicable).
    pub subject: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn new(subject: &str, message: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a fixture for common issues.
pub fn validate_fixture(fixture: &Fixture) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Check for duplicate exam IDs
    let mut seen_exams = HashSet::new();
    for exam in &fixture.exams {
        if !seen_exams.insert(&exam.id) {
            warnings.push(ValidationWarning::new(
                &exam.id,
                format!("duplicate exam ID: {}", exam.id),
            ));
        }
        if !exam.is_active {
            warnings.push(ValidationWarning::new(&exam.id, "exam is not active"));
        }
    }

    // Check for duplicate attempt IDs
    let mut seen_attempts = HashSet::new();
    for attempt in &fixture.attempts {
        if !seen_attempts.insert(&attempt.id) {
            warnings.push(ValidationWarning::new(
                &attempt.id,
                format!("duplicate attempt ID: {}", attempt.id),
            ));
        }
    }

    let key_lengths: HashMap<&str, usize> = fixture
        .exams
        .iter()
        .map(|e| (e.id.as_str(), e.answer_key.len()))
        .collect();

    for attempt in &fixture.attempts {
        if attempt.status != AttemptStatus::Pending {
            warnings.push(ValidationWarning::new(
                &attempt.id,
                format!("status is {}, attempt will not be evaluated", attempt.status),
            ));
        }

        if let Err(e) = AnswerSequence::parse(&attempt.answers) {
            warnings.push(ValidationWarning::new(&attempt.id, e.to_string()));
        }

        let Some(&key_len) = key_lengths.get(attempt.exam_id.as_str()) else {
            warnings.push(ValidationWarning::new(
                &attempt.id,
                format!("references unknown exam: {}", attempt.exam_id),
            ));
            continue;
        };

        let len = attempt.answers.chars().count();
        if len < key_len {
            warnings.push(ValidationWarning::new(
                &attempt.id,
                format!(
                    "{len} of {key_len} answers given, the rest count as blank"
                ),
            ));
        } else if len > key_len {
            warnings.push(ValidationWarning::new(
                &attempt.id,
                format!(
                    "{} answers beyond the {key_len}-question key will be ignored",
                    len - key_len
                ),
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn small() -> FixtureOptions {
        FixtureOptions {
            question_count: 5,
            ..Default::default()
        }
    }

    const VALID_TOML: &str = r#"
[[exams]]
id = "exam_A"
title = "Health Sciences"
area = "A"

[[exams]]
id = "exam_mixed"
title = "Mixed"
answer_key = "ABCDE"
points_per_correct = 4.0
penalty_per_incorrect = 1.0

[[attempts]]
id = "att_1"
exam_id = "exam_A"
student_id = "s1"
student_name = "Ana Torres"
answers = "AAXBA"
submitted_at = "2025-03-01T09:30:00Z"

[[attempts]]
id = "att_2"
exam_id = "exam_mixed"
student_id = "s2"
answers = "ABC"
status = "evaluated"
"#;

    #[test]
    fn parse_valid_toml() {
        let fixture = parse_fixture_str(VALID_TOML, &PathBuf::from("test.toml"), &small()).unwrap();
        assert_eq!(fixture.exams.len(), 2);
        assert_eq!(fixture.exams[0].answer_key.as_str(), "AAAAA");
        assert_eq!(fixture.exams[0].area, Some(Area::A));
        assert_eq!(fixture.exams[0].rules, ScoringRules::default());
        assert_eq!(fixture.exams[1].rules, ScoringRules::new(4.0, 1.0));
        assert_eq!(fixture.attempts.len(), 2);
        assert_eq!(fixture.attempts[0].student_name, "Ana Torres");
        assert_eq!(
            fixture.attempts[0].submitted_at.to_rfc3339(),
            "2025-03-01T09:30:00+00:00"
        );
        assert_eq!(fixture.attempts[0].status, AttemptStatus::Pending);
        assert_eq!(fixture.attempts[1].status, AttemptStatus::Evaluated);
    }

    #[test]
    fn uniform_key_uses_question_count() {
        let toml = r#"
[[exams]]
id = "exam_C"
uniform_key = "C"
"#;
        let fixture =
            parse_fixture_str(toml, &PathBuf::from("t.toml"), &FixtureOptions::default()).unwrap();
        assert_eq!(fixture.exams[0].answer_key.len(), 100);
    }

    #[test]
    fn malformed_key_rejected_with_exam_id() {
        let toml = r#"
[[exams]]
id = "exam_bad"
answer_key = "ABXDE"
"#;
        let err = parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("malformed answer key for exam exam_bad"), "{msg}");
    }

    #[test]
    fn key_length_must_match_question_count() {
        let toml = r#"
[[exams]]
id = "exam_short"
answer_key = "ABC"
"#;
        let err = parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).unwrap_err();
        assert!(format!("{err:#}").contains("expected 5 questions"));
    }

    #[test]
    fn exam_without_key_source_rejected() {
        let toml = r#"
[[exams]]
id = "exam_none"
"#;
        assert!(parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).is_err());
    }

    #[test]
    fn negative_penalty_rejected() {
        let toml = r#"
[[exams]]
id = "exam_neg"
answer_key = "AAAAA"
penalty_per_incorrect = -2.0
"#;
        let err = parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).unwrap_err();
        assert!(format!("{err:#}").contains("penalty_per_incorrect"));
    }

    #[test]
    fn malformed_answers_load_but_warn() {
        let toml = r#"
[[exams]]
id = "exam_A"
area = "A"

[[attempts]]
id = "att_1"
exam_id = "exam_A"
student_id = "s1"
answers = "AA?AA"
"#;
        let fixture = parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).unwrap();
        let warnings = validate_fixture(&fixture);
        assert!(warnings.iter().any(|w| w.message.contains("malformed attempt")));
    }

    #[test]
    fn validate_reports_common_issues() {
        let toml = r#"
[[exams]]
id = "exam_A"
area = "A"

[[attempts]]
id = "dup"
exam_id = "exam_A"
student_id = "s1"
answers = "AA"

[[attempts]]
id = "dup"
exam_id = "exam_Q"
student_id = "s2"
answers = "AAAAAAA"

[[attempts]]
id = "long"
exam_id = "exam_A"
student_id = "s3"
answers = "AAAAAAA"
"#;
        let fixture = parse_fixture_str(toml, &PathBuf::from("t.toml"), &small()).unwrap();
        let warnings = validate_fixture(&fixture);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate attempt")));
        assert!(warnings.iter().any(|w| w.message.contains("unknown exam: exam_Q")));
        assert!(warnings.iter().any(|w| w.message.contains("count as blank")));
        assert!(warnings
            .iter()
            .any(|w| w.subject.as_deref() == Some("long") && w.message.contains("ignored")));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_fixture_str(bad, &PathBuf::from("bad.toml"), &small());
        assert!(result.is_err());
    }

    #[test]
    fn load_directory_and_merge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.toml"), VALID_TOML).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("b.toml"),
            "[[attempts]]\nid = \"att_9\"\nexam_id = \"exam_A\"\nstudent_id = \"s9\"\nanswers = \"A\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not = [valid").unwrap();

        let fixtures = load_fixture_directory(dir.path(), &small()).unwrap();
        assert_eq!(fixtures.len(), 2);

        let merged = load_fixture(dir.path(), &small()).unwrap();
        assert_eq!(merged.exams.len(), 2);
        assert_eq!(merged.attempts.len(), 3);
    }
}
