//! End-to-end evaluation tests with in-process models and datasets.
//!
//! A scripted model and a fixed dataset source stand in for the network so
//! the orchestrator, result persistence, rescoring and aggregation can be
//! exercised together against a temporary results directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use kobench::{
    analysis::{score_records, Aggregator},
    benchmarks::{Benchmark, DatasetSource, DatasetSplits, LoadError, Record},
    config::{Config, SampleSize},
    providers::{
        is_error_output, CompletionRequest, CompletionResponse, LLMProvider, ProviderError,
        ProviderResult,
    },
    results::{read_records, ResultSet, RunSelection},
    runner::{
        Evaluator, NoOpProgress, ProgressCallback, RateLimiter, RunPlan, Stage, Triple,
        TripleOutcome,
    },
};

// =============================================================================
// Fakes
// =============================================================================

/// Replies with the scripted answers in order, cycling
struct ScriptedModel {
    name: String,
    answers: Vec<String>,
    calls: AtomicUsize,
    limiter: Arc<RateLimiter>,
}

impl ScriptedModel {
    fn new(name: &str, answers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
            limiter: Arc::new(RateLimiter::new(0)),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn api_model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            content: self.answers[i % self.answers.len()].clone(),
            model: "scripted".to_string(),
            finish_reason: "stop".to_string(),
            latency_ms: 1,
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Fails every call
struct BrokenModel {
    limiter: Arc<RateLimiter>,
}

#[async_trait]
impl LLMProvider for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    fn api_model(&self) -> &str {
        "broken"
    }

    async fn complete(&self, _request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        Err(ProviderError::Api {
            status: 500,
            message: "internal".to_string(),
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// KoBEST BoolQ only; every other task is unavailable
struct BoolqSource;

fn boolq_records() -> Vec<Record> {
    ["1", "2", "2", "0"]
        .iter()
        .enumerate()
        .map(|(i, label)| {
            serde_json::from_value(json!({
                "paragraph": format!("지문 {}", i),
                "question": format!("질문 {}", i),
                "label": label.parse::<u8>().unwrap(),
            }))
            .unwrap()
        })
        .collect()
}

#[async_trait]
impl DatasetSource for BoolqSource {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn load(&self, benchmark: Benchmark, task: &str) -> Result<DatasetSplits, LoadError> {
        if benchmark != Benchmark::KoBest || task != "boolq" {
            return Err(LoadError::Unavailable {
                dataset: benchmark.dataset_id().to_string(),
                config: task.to_string(),
            });
        }
        let mut splits = DatasetSplits::new();
        splits.insert("test", boolq_records());
        Ok(splits)
    }
}

#[derive(Default)]
struct RecordingProgress {
    started: Mutex<Vec<(String, usize)>>,
    samples: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_triple_start(&self, triple: &Triple, samples: usize) {
        self.started.lock().unwrap().push((triple.model.clone(), samples));
    }

    fn on_sample_complete(&self, _triple: &Triple, _completed: usize, _total: usize) {
        self.samples.fetch_add(1, Ordering::SeqCst);
    }

    fn on_triple_complete(&self, triple: &Triple, _outcome: &TripleOutcome) {
        self.completed.lock().unwrap().push(triple.model.clone());
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn test_config(results_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.results_dir = results_dir.to_path_buf();
    config.evaluation.sample_size = SampleSize::All;
    config.evaluation.enabled_models = vec!["good".to_string(), "broken".to_string()];
    config.evaluation.enabled_benchmarks = vec!["kobest".to_string()];
    config
}

fn providers() -> Vec<Arc<dyn LLMProvider>> {
    vec![
        Arc::new(ScriptedModel::new("good", &["정답: 1", "2", "B", "no"])),
        Arc::new(BrokenModel {
            limiter: Arc::new(RateLimiter::new(0)),
        }),
    ]
}

fn models(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn boolq_plan(timestamp: &str, names: &[&str]) -> RunPlan {
    RunPlan::new(timestamp, &[Benchmark::KoBest], &models(names))
        .with_tasks(&["boolq".to_string(), "kobest_copa".to_string()])
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_run_writes_one_file_per_triple_in_sample_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));

    let report = evaluator
        .run(&boolq_plan("20250101_120000", &["good", "broken"]), Arc::new(NoOpProgress))
        .await;

    let path = dir.path().join("20250101_120000_good_kobest_boolq.csv");
    assert!(path.exists());
    match &report.triples[0].outcome {
        TripleOutcome::Completed {
            path: written,
            samples,
            error_outputs,
        } => {
            assert_eq!(written, &path);
            assert_eq!(*samples, 4);
            assert_eq!(*error_outputs, 0);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let records = read_records(&path).unwrap();
    let predictions: Vec<&str> = records.iter().map(|r| r.prediction.as_str()).collect();
    let references: Vec<&str> = records.iter().map(|r| r.reference.as_str()).collect();
    assert_eq!(predictions, vec!["정답: 1", "2", "B", "no"]);
    assert_eq!(references, vec!["1", "2", "2", "0"]);
    assert!(records.iter().all(|r| r.task == "kobest_boolq" && r.benchmark == "kobest"));
    assert!(records[0].prompt.starts_with("지문: 지문 0"));
}

#[tokio::test]
async fn test_failures_are_recorded_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));

    let report = evaluator
        .run(
            &boolq_plan("20250101_120000", &["good", "broken", "ghost"]),
            Arc::new(NoOpProgress),
        )
        .await;

    assert_eq!(report.triples.len(), 6);
    let tasks: Vec<(String, &str)> = report
        .triples
        .iter()
        .map(|t| (t.triple.qualified_task(), t.triple.model.as_str()))
        .collect();
    assert_eq!(tasks[0], ("kobest_boolq".to_string(), "good"));
    assert_eq!(tasks[3], ("kobest_copa".to_string(), "good"));

    // Generation errors are persisted as sentinels, not raised
    match &report.triples[1].outcome {
        TripleOutcome::Completed { error_outputs, .. } => assert_eq!(*error_outputs, 4),
        other => panic!("unexpected outcome: {:?}", other),
    }
    let broken = read_records(dir.path().join("20250101_120000_broken_kobest_boolq.csv")).unwrap();
    assert!(broken.iter().all(|r| is_error_output(&r.prediction)));

    assert!(matches!(
        report.triples[2].outcome,
        TripleOutcome::Failed {
            stage: Stage::Model,
            ..
        }
    ));
    for t in &report.triples[3..] {
        assert!(matches!(
            t.outcome,
            TripleOutcome::Failed {
                stage: Stage::Load,
                ..
            }
        ));
    }

    assert_eq!(report.completed().count(), 2);
    assert_eq!(report.failed().count(), 4);
    assert_eq!(report.total_samples(), 8);
    assert_eq!(report.error_outputs(), 4);

    let summary = report.write_summary().unwrap();
    assert_eq!(summary, dir.path().join("run_20250101_120000.json"));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["failed"], 4);
    assert_eq!(json["triples"][2]["stage"], "model");
}

#[tokio::test]
async fn test_rescore_and_leaderboard_from_persisted_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));
    evaluator
        .run(&boolq_plan("20250101_120000", &["good", "broken"]), Arc::new(NoOpProgress))
        .await;

    let results = ResultSet::load(dir.path(), &RunSelection::Latest).unwrap();
    assert_eq!(results.record_count(), 8);

    let scored = score_records(results.records());
    let aggregator = Aggregator::from_config(&config);
    let scores = aggregator.task_scores(&scored);

    let good = scores.iter().find(|s| s.model == "good").unwrap();
    assert_eq!((good.correct, good.total), (4, 4));
    assert_eq!(good.accuracy, 1.0);

    let broken = scores.iter().find(|s| s.model == "broken").unwrap();
    assert_eq!(broken.accuracy, 0.0);
    assert_eq!(broken.error_outputs, 4);

    let board = aggregator.leaderboard(&scores);
    assert_eq!(board.benchmarks, vec!["kobest".to_string()]);
    assert_eq!(board.rows[0].model, "good");
    assert_eq!(board.rows[0].average, 1.0);
    assert_eq!(board.rows[1].model, "broken");
}

#[tokio::test]
async fn test_rerun_creates_new_file_and_latest_wins() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let first = Evaluator::new(&config, providers(), Arc::new(BoolqSource));
    first
        .run(&boolq_plan("20250101_120000", &["good"]), Arc::new(NoOpProgress))
        .await;

    let rerun: Vec<Arc<dyn LLMProvider>> = vec![Arc::new(ScriptedModel::new("good", &["0"]))];
    let second = Evaluator::new(&config, rerun, Arc::new(BoolqSource));
    second
        .run(&boolq_plan("20250102_090000", &["good"]), Arc::new(NoOpProgress))
        .await;

    let old = read_records(dir.path().join("20250101_120000_good_kobest_boolq.csv")).unwrap();
    assert_eq!(old[0].prediction, "정답: 1");
    assert!(dir.path().join("20250102_090000_good_kobest_boolq.csv").exists());

    let latest = ResultSet::load(dir.path(), &RunSelection::Latest).unwrap();
    assert_eq!(latest.files.len(), 1);
    assert_eq!(latest.files[0].timestamp.as_deref(), Some("20250102_090000"));

    let all = ResultSet::load(dir.path(), &RunSelection::All).unwrap();
    assert_eq!(all.record_count(), 8);

    let scores = Aggregator::from_config(&config).task_scores(&score_records(latest.records()));
    assert_eq!(scores[0].correct, 1);
}

#[tokio::test]
async fn test_same_timestamp_never_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));
    let plan = boolq_plan("20250101_120000", &["good"]);

    evaluator.run(&plan, Arc::new(NoOpProgress)).await;
    let report = evaluator.run(&plan, Arc::new(NoOpProgress)).await;

    assert!(matches!(
        report.triples[0].outcome,
        TripleOutcome::Failed {
            stage: Stage::Write,
            ..
        }
    ));
    let records = read_records(dir.path().join("20250101_120000_good_kobest_boolq.csv")).unwrap();
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn test_concurrent_models_keep_report_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.evaluation.concurrency = 2;
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));
    let progress = Arc::new(RecordingProgress::default());

    let plan = RunPlan::new("20250101_120000", &[Benchmark::KoBest], &models(&["good", "broken"]))
        .with_tasks(&["boolq".to_string()]);
    let report = evaluator.run(&plan, progress.clone()).await;

    let order: Vec<&str> = report.triples.iter().map(|t| t.triple.model.as_str()).collect();
    assert_eq!(order, vec!["good", "broken"]);
    assert!(report.triples.iter().all(|t| t.outcome.is_completed()));

    let good = read_records(dir.path().join("20250101_120000_good_kobest_boolq.csv")).unwrap();
    let predictions: Vec<&str> = good.iter().map(|r| r.prediction.as_str()).collect();
    assert_eq!(predictions, vec!["정답: 1", "2", "B", "no"]);

    assert_eq!(progress.samples.load(Ordering::SeqCst), 8);
    assert_eq!(progress.completed.lock().unwrap().len(), 2);
    assert!(progress.started.lock().unwrap().iter().all(|(_, n)| *n == 4));
}

#[tokio::test]
async fn test_dry_run_draws_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path()).with_dry_run();
    let evaluator = Evaluator::new(&config, providers(), Arc::new(BoolqSource));

    let prepared = evaluator.prepare_task(Benchmark::KoBest, "boolq").await.unwrap();
    assert_eq!(prepared.len(), 1);

    let err = evaluator.prepare_task(Benchmark::KoBest, "copa").await.unwrap_err();
    assert_eq!(err.0, Stage::Load);
}
