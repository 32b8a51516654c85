//! Folding scored records into task scores and the model leaderboard

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::scoring::ScoredRecord;
use crate::benchmarks::{Benchmark, ScoringMode};
use crate::config::Config;

/// Accuracy of one model on one benchmark task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScore {
    pub model: String,
    pub benchmark: String,
    pub task: String,
    pub correct: usize,
    pub total: usize,
    /// Predictions that were failed-generation sentinels (counted as wrong)
    pub error_outputs: usize,
    pub accuracy: f64,
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub model: String,
    /// Benchmark → mean task accuracy; absent when the model has no data
    pub scores: IndexMap<String, f64>,
    /// Mean over the benchmarks present in `scores`
    pub average: f64,
}

impl LeaderboardRow {
    pub fn score(&self, benchmark: &str) -> Option<f64> {
        self.scores.get(benchmark).copied()
    }
}

/// Models ranked by average benchmark score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    /// Benchmark columns, catalogue order first
    pub benchmarks: Vec<String>,
    pub rows: Vec<LeaderboardRow>,
}

/// Aggregation with a fixed model tie-break order
pub struct Aggregator {
    model_order: Vec<String>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Whether records of `benchmark` enter accuracy aggregation
fn is_accuracy_benchmark(benchmark: &str) -> bool {
    match benchmark.parse::<Benchmark>() {
        Ok(b) => b.scoring() == ScoringMode::Choice,
        Err(_) => true,
    }
}

/// Column position: catalogue order, then unknown names alphabetically
fn benchmark_rank(name: &str) -> (usize, String) {
    let rank = Benchmark::all()
        .iter()
        .position(|b| b.as_str() == name)
        .unwrap_or(usize::MAX);
    (rank, name.to_string())
}

impl Aggregator {
    pub fn new(model_order: Vec<String>) -> Self {
        Self { model_order }
    }

    /// Tie-break by the enabled-model order of `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.evaluation.enabled_models.clone())
    }

    fn model_rank(&self, model: &str) -> usize {
        self.model_order
            .iter()
            .position(|m| m == model)
            .unwrap_or(self.model_order.len())
    }

    /// Accuracy per (model, benchmark, task), in first-seen order
    ///
    /// Open-ended benchmarks are left out: their responses are graded by the
    /// judge, not by option matching.
    pub fn task_scores(&self, scored: &[ScoredRecord]) -> Vec<TaskScore> {
        let mut groups: IndexMap<(String, String, String), TaskScore> = IndexMap::new();

        for s in scored {
            let r = &s.record;
            if !is_accuracy_benchmark(&r.benchmark) {
                continue;
            }
            let entry = groups
                .entry((r.model.clone(), r.benchmark.clone(), r.task.clone()))
                .or_insert_with(|| TaskScore {
                    model: r.model.clone(),
                    benchmark: r.benchmark.clone(),
                    task: r.task.clone(),
                    correct: 0,
                    total: 0,
                    error_outputs: 0,
                    accuracy: 0.0,
                });
            entry.total += 1;
            if s.is_correct {
                entry.correct += 1;
            }
            if s.is_error {
                entry.error_outputs += 1;
            }
        }

        groups
            .into_values()
            .map(|mut score| {
                score.accuracy = score.correct as f64 / score.total as f64;
                score
            })
            .collect()
    }

    /// Benchmark means per model, then the overall average, ranked
    ///
    /// Missing (model, benchmark) cells are left out of the averages rather
    /// than counted as zero.
    pub fn leaderboard(&self, scores: &[TaskScore]) -> Leaderboard {
        let mut per_model: IndexMap<String, IndexMap<String, Vec<f64>>> = IndexMap::new();
        for score in scores {
            per_model
                .entry(score.model.clone())
                .or_default()
                .entry(score.benchmark.clone())
                .or_default()
                .push(score.accuracy);
        }

        let mut benchmarks: Vec<String> = per_model
            .values()
            .flat_map(|b| b.keys().cloned())
            .collect();
        benchmarks.sort_by_key(|b| benchmark_rank(b));
        benchmarks.dedup();

        let mut rows: Vec<LeaderboardRow> = per_model
            .into_iter()
            .filter_map(|(model, by_benchmark)| {
                let mut scores: IndexMap<String, f64> = IndexMap::new();
                for name in &benchmarks {
                    if let Some(task_scores) = by_benchmark.get(name) {
                        if let Some(m) = mean(task_scores.iter().copied()) {
                            scores.insert(name.clone(), m);
                        }
                    }
                }
                let average = mean(scores.values().copied())?;
                Some(LeaderboardRow {
                    model,
                    scores,
                    average,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            b.average
                .partial_cmp(&a.average)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.model_rank(&a.model).cmp(&self.model_rank(&b.model)))
                .then_with(|| a.model.cmp(&b.model))
        });

        Leaderboard { benchmarks, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scoring::score_record;
    use crate::results::ResultRecord;

    fn task(model: &str, benchmark: &str, name: &str, accuracy: f64) -> TaskScore {
        TaskScore {
            model: model.to_string(),
            benchmark: benchmark.to_string(),
            task: name.to_string(),
            correct: 0,
            total: 10,
            error_outputs: 0,
            accuracy,
        }
    }

    fn record(model: &str, benchmark: &str, task: &str, prediction: &str, reference: &str) -> ResultRecord {
        ResultRecord {
            model: model.to_string(),
            benchmark: benchmark.to_string(),
            task: task.to_string(),
            prompt: String::new(),
            prediction: prediction.to_string(),
            reference: reference.to_string(),
            sample: String::new(),
        }
    }

    #[test]
    fn test_two_tasks_average_into_benchmark_and_overall() {
        let aggregator = Aggregator::new(vec!["m".to_string()]);
        let board = aggregator.leaderboard(&[
            task("m", "kmmlu", "kmmlu_Law", 0.8),
            task("m", "kmmlu", "kmmlu_Math", 0.6),
        ]);
        assert_eq!(board.benchmarks, vec!["kmmlu"]);
        assert_eq!(board.rows.len(), 1);
        assert!((board.rows[0].score("kmmlu").unwrap() - 0.7).abs() < 1e-9);
        assert!((board.rows[0].average - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_missing_benchmark_is_not_zero() {
        let aggregator = Aggregator::new(vec!["a".to_string(), "b".to_string()]);
        let board = aggregator.leaderboard(&[
            task("a", "kobest", "kobest_boolq", 0.9),
            task("a", "kmmlu", "kmmlu_Law", 0.5),
            task("b", "kobest", "kobest_boolq", 0.8),
        ]);
        let b = board.rows.iter().find(|r| r.model == "b").unwrap();
        assert_eq!(b.score("kmmlu"), None);
        assert!((b.average - 0.8).abs() < 1e-9);

        // b (0.8) outranks a (0.7) despite a covering more benchmarks
        assert_eq!(board.rows[0].model, "b");
        assert_eq!(board.benchmarks, vec!["kobest", "kmmlu"]);
    }

    #[test]
    fn test_ties_follow_config_order() {
        let aggregator = Aggregator::new(vec!["z".to_string(), "a".to_string()]);
        let board = aggregator.leaderboard(&[
            task("a", "kobest", "kobest_wic", 0.5),
            task("unlisted", "kobest", "kobest_wic", 0.5),
            task("z", "kobest", "kobest_wic", 0.5),
        ]);
        let order: Vec<&str> = board.rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(order, vec!["z", "a", "unlisted"]);
    }

    #[test]
    fn test_task_scores_count_errors_and_skip_open_ended() {
        let records = vec![
            record("m", "kobest", "kobest_boolq", "1", "1"),
            record("m", "kobest", "kobest_boolq", "Error: HTTP error", "0"),
            record("m", "logickor", "logickor", "긴 답변", ""),
        ];
        let scored: Vec<_> = records.iter().map(score_record).collect();
        let scores = Aggregator::new(vec![]).task_scores(&scored);

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].total, 2);
        assert_eq!(scores[0].correct, 1);
        assert_eq!(scores[0].error_outputs, 1);
        assert!((scores[0].accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let board = Aggregator::new(vec![]).leaderboard(&[]);
        assert!(board.rows.is_empty());
        assert!(board.benchmarks.is_empty());
    }
}
