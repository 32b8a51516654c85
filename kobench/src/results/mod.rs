//! Persisted result records
//!
//! A result file is the durability boundary of a run: one CSV table per
//! (run timestamp, model, benchmark task), written once, never updated.
//! Everything downstream (extraction, scoring, aggregation) is recomputed
//! from these files.

pub mod store;

pub use store::{
    discover_result_files, read_records, ResultFile, ResultSet, ResultWriter, RunSelection,
};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::benchmarks::{reference_label, Benchmark, Record};

/// `%Y%m%d_%H%M%S`, the prefix of every result file of a run
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Column order of a result file
pub const COLUMNS: [&str; 7] = ["model", "benchmark", "task", "prompt", "prediction", "reference", "sample"];

/// One model response to one benchmark sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub model: String,
    pub benchmark: String,
    /// Qualified task name, e.g. `kobest_copa`
    pub task: String,
    pub prompt: String,
    /// Raw output, or an `Error:` sentinel
    #[serde(default)]
    pub prediction: String,
    #[serde(default)]
    pub reference: String,
    /// Source record as JSON
    #[serde(default, alias = "full_sample")]
    pub sample: String,
}

impl ResultRecord {
    pub fn new(
        model: impl Into<String>,
        benchmark: Benchmark,
        task: impl Into<String>,
        prompt: impl Into<String>,
        prediction: impl Into<String>,
        record: &Record,
    ) -> Self {
        Self {
            model: model.into(),
            benchmark: benchmark.as_str().to_string(),
            task: task.into(),
            prompt: prompt.into(),
            prediction: prediction.into(),
            reference: reference_label(record),
            sample: serde_json::Value::Object(record.clone()).to_string(),
        }
    }
}

/// Error type for result persistence
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Result file already exists: {0}")]
    Exists(PathBuf),
}

/// Timestamp for a run starting now
pub fn new_run_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Whether `s` is a run timestamp
pub fn is_run_timestamp(s: &str) -> bool {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).is_ok()
}

/// `<timestamp>_<model>_<qualified task>.csv`
pub fn result_file_name(timestamp: &str, model: &str, qualified_task: &str) -> String {
    format!("{}_{}_{}.csv", timestamp, model.replace(['/', '\\'], "-"), qualified_task)
}

/// Split a result file name into its run timestamp and the `<model>_<task>` key
pub fn split_file_name(file_name: &str) -> Option<(&str, &str)> {
    let stem = file_name.strip_suffix(".csv")?;
    let (timestamp, rest) = (stem.get(..15)?, stem.get(15..)?);
    let key = rest.strip_prefix('_')?;
    if !is_run_timestamp(timestamp) || key.is_empty() {
        return None;
    }
    Some((timestamp, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_file_name() {
        assert_eq!(
            result_file_name("20250101_120000", "helpy-pro", "kobest_boolq"),
            "20250101_120000_helpy-pro_kobest_boolq.csv"
        );
        assert_eq!(
            result_file_name("20250101_120000", "openai/gpt-5.2", "logickor"),
            "20250101_120000_openai-gpt-5.2_logickor.csv"
        );
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(
            split_file_name("20250101_120000_helpy-pro_kmmlu_Real-Estate.csv"),
            Some(("20250101_120000", "helpy-pro_kmmlu_Real-Estate"))
        );
        assert_eq!(split_file_name("leaderboard_20250101_120000.csv"), None);
        assert_eq!(split_file_name("20250101_120000.csv"), None);
        assert_eq!(split_file_name("notes.txt"), None);
    }

    #[test]
    fn test_run_timestamp_shape() {
        let ts = new_run_timestamp();
        assert_eq!(ts.len(), 15);
        assert!(is_run_timestamp(&ts));
        assert!(!is_run_timestamp("2025-01-01"));
    }

    #[test]
    fn test_record_snapshot() {
        let sample: Record = serde_json::from_value(json!({"question": "q", "answer": 3})).unwrap();
        let record = ResultRecord::new("m", Benchmark::Kmmlu, "kmmlu_Math", "p", "C", &sample);
        assert_eq!(record.benchmark, "kmmlu");
        assert_eq!(record.reference, "3");
        assert_eq!(record.sample, r#"{"question":"q","answer":3}"#);
    }
}
