//! Core data model types for examgrade.
//!
//! Answer keys, submitted answer sequences, attempts and their lifecycle,
//! exam definitions, and the evaluation results the batch engine produces.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvalError;

/// Character marking a question left blank.
pub const BLANK: char = 'X';

/// Accepted multiple-choice options.
pub const CHOICES: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// Number of questions on an admission exam.
pub const DEFAULT_QUESTION_COUNT: usize = 100;

fn is_choice(c: char) -> bool {
    CHOICES.contains(&c)
}

// ---------------------------------------------------------------------------
// Answer key and submitted answers
// ---------------------------------------------------------------------------

/// The correct option for every question of an exam, in order.
///
/// Always non-empty and restricted to `A`–`E`; construction is the only
/// place a key gets validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnswerKey(String);

impl AnswerKey {
    /// Validate and build a key.
    pub fn parse(s: &str) -> Result<Self, EvalError> {
        if s.is_empty() {
            return Err(EvalError::MalformedKey {
                exam_id: None,
                reason: "answer key is empty".into(),
            });
        }
        if let Some((i, c)) = s.chars().enumerate().find(|(_, c)| !is_choice(*c)) {
            return Err(EvalError::MalformedKey {
                exam_id: None,
                reason: format!("invalid option {c:?} at question {}", i + 1),
            });
        }
        Ok(Self(s.to_string()))
    }

    /// A key with the same option for every question, as used for area exams.
    pub fn uniform(choice: char, len: usize) -> Result<Self, EvalError> {
        Self::parse(&choice.to_string().repeat(len))
    }

    /// Reject keys whose length differs from the expected question count.
    pub fn expect_len(self, question_count: usize) -> Result<Self, EvalError> {
        if self.len() != question_count {
            return Err(EvalError::MalformedKey {
                exam_id: None,
                reason: format!(
                    "expected {question_count} questions, key has {}",
                    self.len()
                ),
            });
        }
        Ok(self)
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no questions. Parsed keys never do.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for AnswerKey {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AnswerKey {
    type Error = EvalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AnswerKey> for String {
    fn from(key: AnswerKey) -> Self {
        key.0
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A test-taker's answers, one character per question.
///
/// May be shorter than the key (missing answers count as blank) or longer
/// (trailing answers are ignored by the scorer). Every character, including
/// trailing ones, must be an option or the blank sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnswerSequence(String);

impl AnswerSequence {
    pub fn parse(s: &str) -> Result<Self, EvalError> {
        if let Some((position, found)) = s
            .chars()
            .enumerate()
            .find(|(_, c)| !is_choice(*c) && *c != BLANK)
        {
            return Err(EvalError::MalformedAttempt { position, found });
        }
        Ok(Self(s.to_string()))
    }

    /// An all-blank sequence of the given length.
    pub fn blank(len: usize) -> Self {
        Self(BLANK.to_string().repeat(len))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Answer at `position`, with positions past the end reading as blank.
    pub fn answer_at(&self, position: usize) -> u8 {
        self.0
            .as_bytes()
            .get(position)
            .copied()
            .unwrap_or(BLANK as u8)
    }
}

impl FromStr for AnswerSequence {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AnswerSequence {
    type Error = EvalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AnswerSequence> for String {
    fn from(seq: AnswerSequence) -> Self {
        seq.0
    }
}

// ---------------------------------------------------------------------------
// Scoring rules and breakdown
// ---------------------------------------------------------------------------

/// Points awarded and deducted per question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringRules {
    /// Points for a correct answer.
    #[serde(default = "default_points")]
    pub points_per_correct: f64,
    /// Points deducted for an incorrect answer. Blanks cost nothing.
    #[serde(default = "default_penalty")]
    pub penalty_per_incorrect: f64,
}

fn default_points() -> f64 {
    20.0
}

fn default_penalty() -> f64 {
    1.125
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            points_per_correct: default_points(),
            penalty_per_incorrect: default_penalty(),
        }
    }
}

impl ScoringRules {
    pub fn new(points_per_correct: f64, penalty_per_incorrect: f64) -> Self {
        Self {
            points_per_correct,
            penalty_per_incorrect,
        }
    }

    /// Points must be positive and finite, the penalty non-negative and finite.
    pub fn validate(&self) -> Result<(), EvalError> {
        if !self.points_per_correct.is_finite() || self.points_per_correct <= 0.0 {
            return Err(EvalError::InvalidConfig(format!(
                "points_per_correct must be positive, got {}",
                self.points_per_correct
            )));
        }
        if !self.penalty_per_incorrect.is_finite() || self.penalty_per_incorrect < 0.0 {
            return Err(EvalError::InvalidConfig(format!(
                "penalty_per_incorrect must be non-negative, got {}",
                self.penalty_per_incorrect
            )));
        }
        Ok(())
    }

    /// Highest reachable score for an exam of `question_count` questions.
    pub fn max_points(&self, question_count: usize) -> f64 {
        question_count as f64 * self.points_per_correct
    }
}

/// Outcome of comparing one answer sequence against a key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub blank_count: usize,
    /// Signed sum of awards and penalties.
    pub raw_score: f64,
    /// `raw_score` floored at zero.
    pub clamped_score: f64,
    /// Key length times points per correct answer.
    pub max_points: f64,
    /// `clamped_score / max_points * 100`.
    pub percentage: f64,
}

impl ScoreBreakdown {
    /// Number of questions scored.
    pub fn question_count(&self) -> usize {
        self.correct_count + self.incorrect_count + self.blank_count
    }
}

// ---------------------------------------------------------------------------
// Exams
// ---------------------------------------------------------------------------

/// Admission area an exam belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Area {
    A,
    B,
    C,
    D,
    E,
}

impl Area {
    pub const ALL: [Area; 5] = [Area::A, Area::B, Area::C, Area::D, Area::E];

    /// Human-readable area name.
    pub fn name(&self) -> &'static str {
        match self {
            Area::A => "Health Sciences",
            Area::B => "Basic Sciences",
            Area::C => "Engineering",
            Area::D => "Economics and Management",
            Area::E => "Humanities, Law and Social Sciences",
        }
    }

    /// The option letter matching the area code.
    pub fn code(&self) -> char {
        match self {
            Area::A => 'A',
            Area::B => 'B',
            Area::C => 'C',
            Area::D => 'D',
            Area::E => 'E',
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Area::A),
            "B" => Ok(Area::B),
            "C" => Ok(Area::C),
            "D" => Ok(Area::D),
            "E" => Ok(Area::E),
            other => Err(format!("unknown area: {other}")),
        }
    }
}

/// A published exam as seen by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDefinition {
    /// Unique identifier (e.g. "exam_A").
    pub id: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Admission area, if the exam belongs to one.
    #[serde(default)]
    pub area: Option<Area>,
    /// Correct option per question.
    pub answer_key: AnswerKey,
    /// Scoring configuration for this exam.
    #[serde(default)]
    pub rules: ScoringRules,
    /// Whether the exam is currently open.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ExamDefinition {
    pub fn new(id: impl Into<String>, answer_key: AnswerKey) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            area: None,
            answer_key,
            rules: ScoringRules::default(),
            is_active: true,
        }
    }

    pub fn with_rules(mut self, rules: ScoringRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_area(mut self, area: Area) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Maximum reachable score.
    pub fn max_points(&self) -> f64 {
        self.rules.max_points(self.answer_key.len())
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Lifecycle of a submitted attempt.
///
/// `Pending -> Evaluating -> Evaluated | Failed`. Nothing returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Evaluating,
    Evaluated,
    Failed,
}

impl AttemptStatus {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::Pending, AttemptStatus::Evaluating)
                | (AttemptStatus::Evaluating, AttemptStatus::Evaluated)
                | (AttemptStatus::Evaluating, AttemptStatus::Failed)
        )
    }

    /// `Evaluated` and `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Evaluated | AttemptStatus::Failed)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Pending => write!(f, "pending"),
            AttemptStatus::Evaluating => write!(f, "evaluating"),
            AttemptStatus::Evaluated => write!(f, "evaluated"),
            AttemptStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AttemptStatus::Pending),
            "evaluating" => Ok(AttemptStatus::Evaluating),
            "evaluated" => Ok(AttemptStatus::Evaluated),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// One test-taker's submission awaiting evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// Unique identifier.
    pub id: String,
    /// Exam whose key applies.
    pub exam_id: String,
    /// Who submitted it.
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    /// Answers exactly as submitted; validated at evaluation time.
    pub answers: String,
    /// When the attempt was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Current lifecycle state.
    #[serde(default = "default_status")]
    pub status: AttemptStatus,
}

fn default_status() -> AttemptStatus {
    AttemptStatus::Pending
}

impl Attempt {
    /// A freshly submitted, pending attempt.
    pub fn new(
        id: impl Into<String>,
        exam_id: impl Into<String>,
        student_id: impl Into<String>,
        answers: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            exam_id: exam_id.into(),
            student_id: student_id.into(),
            student_name: String::new(),
            answers: answers.into(),
            submitted_at: Utc::now(),
            status: AttemptStatus::Pending,
        }
    }

    pub fn with_student_name(mut self, name: impl Into<String>) -> Self {
        self.student_name = name.into();
        self
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: AttemptStatus) -> Result<(), EvalError> {
        if !self.status.can_advance_to(next) {
            return Err(EvalError::InvalidTransition {
                attempt_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Processing metadata attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingInfo {
    /// Worker that scored the attempt.
    pub worker: usize,
    /// Time spent scoring, in microseconds.
    pub duration_us: u64,
}

/// The scored outcome of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// `result_<attempt id>`.
    pub id: String,
    pub attempt_id: String,
    pub exam_id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    pub breakdown: ScoreBreakdown,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    pub processing: ProcessingInfo,
    /// Batch run that produced this result.
    pub batch_id: Uuid,
}

impl EvaluationResult {
    /// Result identifier derived from the attempt identifier.
    pub fn id_for(attempt_id: &str) -> String {
        format!("result_{attempt_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rejects_empty_and_foreign_characters() {
        assert!(matches!(
            AnswerKey::parse(""),
            Err(EvalError::MalformedKey { .. })
        ));
        let err = AnswerKey::parse("ABXD").unwrap_err();
        assert!(err.to_string().contains("question 3"), "{err}");
        assert!(AnswerKey::parse("abcd").is_err());
        assert_eq!(AnswerKey::parse("ABCDE").unwrap().len(), 5);
    }

    #[test]
    fn uniform_key_and_length_check() {
        let key = AnswerKey::uniform('C', DEFAULT_QUESTION_COUNT).unwrap();
        assert_eq!(key.len(), 100);
        assert!(!key.is_empty());
        assert!(key.as_str().chars().all(|c| c == 'C'));
        assert!(key.clone().expect_len(100).is_ok());
        assert!(key.expect_len(50).is_err());
        assert!(AnswerKey::uniform('X', 10).is_err());
    }

    #[test]
    fn key_deserialization_validates() {
        let ok: AnswerKey = serde_json::from_str("\"ABC\"").unwrap();
        assert_eq!(ok.as_str(), "ABC");
        assert!(serde_json::from_str::<AnswerKey>("\"AB?\"").is_err());
    }

    #[test]
    fn sequence_accepts_blank_and_reports_first_bad_position() {
        assert!(AnswerSequence::parse("AXBXE").is_ok());
        assert!(AnswerSequence::parse("").is_ok());
        assert_eq!(
            AnswerSequence::parse("ABZQ").unwrap_err(),
            EvalError::MalformedAttempt {
                position: 2,
                found: 'Z'
            }
        );
    }

    #[test]
    fn sequence_reads_blank_past_end() {
        let seq = AnswerSequence::parse("AB").unwrap();
        assert_eq!(seq.answer_at(1), b'B');
        assert_eq!(seq.answer_at(5), b'X');
        assert_eq!(AnswerSequence::blank(3).as_str(), "XXX");
    }

    #[test]
    fn rules_validation() {
        assert!(ScoringRules::default().validate().is_ok());
        assert!(ScoringRules::new(0.0, 1.0).validate().is_err());
        assert!(ScoringRules::new(20.0, -0.5).validate().is_err());
        assert!(ScoringRules::new(f64::NAN, 0.0).validate().is_err());
        assert!(ScoringRules::new(20.0, 0.0).validate().is_ok());
        assert_eq!(ScoringRules::default().max_points(100), 2000.0);
    }

    #[test]
    fn status_display_and_parse() {
        assert_eq!(AttemptStatus::Evaluating.to_string(), "evaluating");
        assert_eq!(
            "Pending".parse::<AttemptStatus>().unwrap(),
            AttemptStatus::Pending
        );
        assert!("submitted".parse::<AttemptStatus>().is_err());
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        let mut attempt = Attempt::new("a1", "exam_A", "s1", "AB");
        assert!(attempt.advance(AttemptStatus::Evaluated).is_err());
        attempt.advance(AttemptStatus::Evaluating).unwrap();
        attempt.advance(AttemptStatus::Evaluated).unwrap();
        assert!(attempt.status.is_terminal());
        assert!(matches!(
            attempt.advance(AttemptStatus::Pending),
            Err(EvalError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn area_parse_and_name() {
        assert_eq!("c".parse::<Area>().unwrap(), Area::C);
        assert_eq!(Area::C.code(), 'C');
        assert_eq!(Area::A.name(), "Health Sciences");
        assert!("F".parse::<Area>().is_err());
    }

    #[test]
    fn attempt_serde_defaults_to_pending() {
        let json = r#"{
            "id": "a1",
            "exam_id": "exam_A",
            "student_id": "s1",
            "answers": "ABC",
            "submitted_at": "2025-01-01T00:00:00Z"
        }"#;
        let attempt: Attempt = serde_json::from_str(json).unwrap();
        assert_eq!(attempt.status, AttemptStatus::Pending);
        assert!(attempt.student_name.is_empty());
    }
}
