//! Scoring of extracted answers against reference labels

use serde::Serialize;

use super::extract::{extract, ExtractionRule};
use crate::providers::is_error_output;
use crate::results::ResultRecord;

/// Task families whose stored references are 0-based while models answer 1-based
const INDEX_SHIFT_TASKS: &[&str] = &["hellaswag", "copa"];

/// Letter and boolean-word equivalents of option digits
fn token_value(upper: &str) -> Option<&'static str> {
    match upper {
        "A" => Some("1"),
        "B" => Some("2"),
        "C" => Some("3"),
        "D" => Some("4"),
        "E" => Some("5"),
        "TRUE" | "YES" => Some("1"),
        "FALSE" | "NO" => Some("0"),
        _ => None,
    }
}

/// Map a token through the letter/boolean table; unknown tokens pass through
pub fn normalize_token(token: &str) -> String {
    match token_value(&token.to_uppercase()) {
        Some(value) => value.to_string(),
        None => token.to_string(),
    }
}

/// Whether `task` carries the 1-based answer / 0-based label discrepancy
pub fn is_index_shift_task(task: &str) -> bool {
    INDEX_SHIFT_TASKS.iter().any(|t| task.contains(t))
}

/// Compare a canonical prediction with a reference label
pub fn is_correct(prediction: &str, reference: &str, task: &str) -> bool {
    let prediction = normalize_token(prediction);
    let reference = normalize_token(reference);

    if is_index_shift_task(task) {
        if let (Ok(p), Ok(r)) = (prediction.parse::<i64>(), reference.parse::<i64>()) {
            if p - 1 == r {
                return true;
            }
        }
    }

    prediction == reference
}

/// A result record with its derived score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: ResultRecord,
    pub canonical_prediction: String,
    pub canonical_reference: String,
    pub is_correct: bool,
    pub rule: ExtractionRule,
    /// The prediction is a failed-generation sentinel
    pub is_error: bool,
}

/// Score one persisted record; a pure function of its fields
pub fn score_record(record: &ResultRecord) -> ScoredRecord {
    let extraction = extract(&record.prediction);
    let canonical_reference = record.reference.trim().to_string();
    let correct = is_correct(&extraction.token, &canonical_reference, &record.task);

    ScoredRecord {
        record: record.clone(),
        canonical_prediction: extraction.token,
        canonical_reference,
        is_correct: correct,
        rule: extraction.rule,
        is_error: is_error_output(&record.prediction),
    }
}

/// Score every record in order
pub fn score_records<'a>(records: impl IntoIterator<Item = &'a ResultRecord>) -> Vec<ScoredRecord> {
    records.into_iter().map(score_record).collect()
}
