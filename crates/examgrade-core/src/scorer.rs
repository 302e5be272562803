//! Answer-sheet scoring.
//!
//! Compares a submitted answer sequence against a key position by position:
//! blanks score nothing, matches earn `points_per_correct`, anything else
//! costs `penalty_per_incorrect`. The final score is floored at zero.
//!
//! Submissions shorter than the key are treated as right-padded with the
//! blank sentinel. Characters past the end of the key are ignored.

use crate::error::EvalError;
use crate::model::{AnswerKey, AnswerSequence, ScoreBreakdown, ScoringRules, BLANK};

/// Score `answers` against `key`.
///
/// Pure and deterministic: the raw score is derived from the three counts,
/// so repeated calls yield bit-identical breakdowns.
pub fn evaluate(answers: &AnswerSequence, key: &AnswerKey, rules: &ScoringRules) -> ScoreBreakdown {
    let mut correct_count = 0usize;
    let mut incorrect_count = 0usize;
    let mut blank_count = 0usize;

    for (position, &expected) in key.as_bytes().iter().enumerate() {
        let given = answers.answer_at(position);
        if given == BLANK as u8 {
            blank_count += 1;
        } else if given == expected {
            correct_count += 1;
        } else {
            incorrect_count += 1;
        }
    }

    let raw_score = correct_count as f64 * rules.points_per_correct
        - incorrect_count as f64 * rules.penalty_per_incorrect;
    let clamped_score = raw_score.max(0.0);
    let max_points = rules.max_points(key.len());
    let percentage = if max_points > 0.0 {
        clamped_score * 100.0 / max_points
    } else {
        0.0
    };

    ScoreBreakdown {
        correct_count,
        incorrect_count,
        blank_count,
        raw_score,
        clamped_score,
        max_points,
        percentage,
    }
}

/// Validate a raw submission, then score it.
pub fn evaluate_str(
    answers: &str,
    key: &AnswerKey,
    rules: &ScoringRules,
) -> Result<ScoreBreakdown, EvalError> {
    let answers = AnswerSequence::parse(answers)?;
    Ok(evaluate(&answers, key, rules))
}
