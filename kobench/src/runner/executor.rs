//! Evaluation orchestrator: benchmark × task × model, one result file per triple

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::benchmarks::{format_prompt, sample, Benchmark, DatasetSource, Record};
use crate::config::{Config, SampleSize};
use crate::providers::{is_error_output, GenerateOptions, LLMProvider};
use crate::results::{new_run_timestamp, result_file_name, ResultRecord, ResultWriter};

/// One (benchmark, task, model) unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triple {
    pub benchmark: Benchmark,
    pub task: String,
    pub model: String,
}

impl Triple {
    pub fn qualified_task(&self) -> String {
        self.benchmark.qualified_task(&self.task)
    }
}

/// The ordered triples of one run
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub timestamp: String,
    pub triples: Vec<Triple>,
}

impl RunPlan {
    /// Benchmark order as given, tasks in catalogue order, then models as given
    pub fn new(timestamp: impl Into<String>, benchmarks: &[Benchmark], models: &[String]) -> Self {
        let mut triples = Vec::new();
        for &benchmark in benchmarks {
            for task in benchmark.tasks() {
                for model in models {
                    triples.push(Triple {
                        benchmark,
                        task: task.to_string(),
                        model: model.clone(),
                    });
                }
            }
        }
        Self {
            timestamp: timestamp.into(),
            triples,
        }
    }

    /// Plan for the configured benchmarks, stamped now
    pub fn from_config(config: &Config, models: &[String]) -> Result<Self, crate::config::ConfigError> {
        Ok(Self::new(new_run_timestamp(), &config.enabled_benchmarks()?, models))
    }

    /// Keep only these benchmark families
    pub fn with_benchmarks(mut self, benchmarks: &[Benchmark]) -> Self {
        self.triples.retain(|t| benchmarks.contains(&t.benchmark));
        self
    }

    /// Keep only tasks named either bare (`copa`) or qualified (`kobest_copa`)
    pub fn with_tasks(mut self, tasks: &[String]) -> Self {
        self.triples
            .retain(|t| tasks.iter().any(|name| *name == t.task || *name == t.qualified_task()));
        self
    }

    pub fn with_models(mut self, models: &[String]) -> Self {
        self.triples.retain(|t| models.contains(&t.model));
        self
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Consecutive triples sharing (benchmark, task), with their models
    pub fn task_groups(&self) -> Vec<(Benchmark, String, Vec<String>)> {
        let mut groups: Vec<(Benchmark, String, Vec<String>)> = Vec::new();
        for t in &self.triples {
            match groups.last_mut() {
                Some((b, task, models)) if *b == t.benchmark && *task == t.task => {
                    models.push(t.model.clone())
                }
                _ => groups.push((t.benchmark, t.task.clone(), vec![t.model.clone()])),
            }
        }
        groups
    }
}

/// Where a triple failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Model client missing (failed to initialize)
    Model,
    /// Dataset load or split selection
    Load,
    /// Prompt rendering
    Format,
    /// Result file creation or append
    Write,
    /// Worker task aborted
    Execute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Model => "model",
            Stage::Load => "load",
            Stage::Format => "format",
            Stage::Write => "write",
            Stage::Execute => "execute",
        };
        write!(f, "{}", s)
    }
}

/// What happened to one triple
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TripleOutcome {
    Completed {
        path: PathBuf,
        samples: usize,
        /// Predictions that are `Error:` sentinels
        error_outputs: usize,
    },
    Failed {
        stage: Stage,
        error: String,
    },
}

impl TripleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TripleOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TripleReport {
    #[serde(flatten)]
    pub triple: Triple,
    #[serde(flatten)]
    pub outcome: TripleOutcome,
}

/// Per-triple accounting of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub results_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub triples: Vec<TripleReport>,
}

impl RunReport {
    pub fn completed(&self) -> impl Iterator<Item = &TripleReport> {
        self.triples.iter().filter(|t| t.outcome.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TripleReport> {
        self.triples.iter().filter(|t| !t.outcome.is_completed())
    }

    /// Records written across all completed triples
    pub fn total_samples(&self) -> usize {
        self.triples
            .iter()
            .map(|t| match &t.outcome {
                TripleOutcome::Completed { samples, .. } => *samples,
                TripleOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn error_outputs(&self) -> usize {
        self.triples
            .iter()
            .map(|t| match &t.outcome {
                TripleOutcome::Completed { error_outputs, .. } => *error_outputs,
                TripleOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Write the JSON run summary into the results directory
    pub fn write_summary(&self) -> std::io::Result<PathBuf> {
        let path = self.results_dir.join(format!("run_{}.json", self.timestamp));
        crate::reporting::RunSummary::from_report(self).write_to_file(&path)?;
        Ok(path)
    }
}

/// Progress callback for tracking execution
pub trait ProgressCallback: Send + Sync {
    fn on_triple_start(&self, triple: &Triple, samples: usize);
    fn on_sample_complete(&self, triple: &Triple, completed: usize, total: usize);
    fn on_triple_complete(&self, triple: &Triple, outcome: &TripleOutcome);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_triple_start(&self, _triple: &Triple, _samples: usize) {}
    fn on_sample_complete(&self, _triple: &Triple, _completed: usize, _total: usize) {}
    fn on_triple_complete(&self, _triple: &Triple, _outcome: &TripleOutcome) {}
}

/// A rendered prompt with the record it came from
#[derive(Debug, Clone)]
pub struct PreparedSample {
    pub prompt: String,
    pub record: Record,
}

/// Drives the model calls of a run and persists every response
pub struct Evaluator {
    providers: Vec<Arc<dyn LLMProvider>>,
    source: Arc<dyn DatasetSource>,
    options: GenerateOptions,
    sample_size: SampleSize,
    seed: u64,
    results_dir: PathBuf,
    concurrency: usize,
}

struct ModelJob {
    provider: Arc<dyn LLMProvider>,
    triple: Triple,
    path: PathBuf,
    samples: Arc<Vec<PreparedSample>>,
    options: GenerateOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl Evaluator {
    pub fn new(config: &Config, providers: Vec<Arc<dyn LLMProvider>>, source: Arc<dyn DatasetSource>) -> Self {
        let eval = &config.evaluation;
        Self {
            providers,
            source,
            options: GenerateOptions::default()
                .with_max_tokens(eval.max_tokens)
                .with_temperature(eval.temperature)
                .with_timeout(std::time::Duration::from_secs(eval.timeout_secs)),
            sample_size: eval.sample_size,
            seed: eval.seed,
            results_dir: config.paths.results_dir.clone(),
            concurrency: eval.concurrency.max(1),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn model_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    fn provider(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Load, sample and render the prompts of one task
    pub async fn prepare_task(
        &self,
        benchmark: Benchmark,
        task: &str,
    ) -> Result<Vec<PreparedSample>, (Stage, String)> {
        let splits = self
            .source
            .load(benchmark, task)
            .await
            .map_err(|e| (Stage::Load, e.to_string()))?;
        let (split, records) = splits
            .into_primary(benchmark)
            .map_err(|e| (Stage::Load, e.to_string()))?;
        let total = records.len();
        let records = sample(records, self.sample_size, self.seed);
        tracing::debug!(
            "{}/{}: {} of {} records from split {}",
            benchmark,
            task,
            records.len(),
            total,
            split
        );

        records
            .into_iter()
            .map(|record| {
                let prompt = format_prompt(benchmark, task, &record).map_err(|e| (Stage::Format, e.to_string()))?;
                Ok(PreparedSample { prompt, record })
            })
            .collect()
    }

    /// Run every triple of the plan; failures are recorded, never raised
    pub async fn run(&self, plan: &RunPlan, progress: Arc<dyn ProgressCallback>) -> RunReport {
        let started_at = Utc::now();
        let mut triples = Vec::with_capacity(plan.len());

        if let Err(e) = std::fs::create_dir_all(&self.results_dir) {
            tracing::error!("Cannot create {}: {}", self.results_dir.display(), e);
        }

        for (benchmark, task, models) in plan.task_groups() {
            let prepared = match self.prepare_task(benchmark, &task).await {
                Ok(samples) => Arc::new(samples),
                Err((stage, error)) => {
                    tracing::error!(
                        "Skipping {}/{} for {} models at {} stage: {}",
                        benchmark,
                        task,
                        models.len(),
                        stage,
                        error
                    );
                    for model in models {
                        let triple = Triple {
                            benchmark,
                            task: task.clone(),
                            model,
                        };
                        let outcome = TripleOutcome::Failed {
                            stage,
                            error: error.clone(),
                        };
                        progress.on_triple_complete(&triple, &outcome);
                        triples.push(TripleReport { triple, outcome });
                    }
                    continue;
                }
            };

            let mut jobs = Vec::new();
            for model in models {
                let triple = Triple {
                    benchmark,
                    task: task.clone(),
                    model,
                };
                let Some(provider) = self.provider(&triple.model) else {
                    let outcome = TripleOutcome::Failed {
                        stage: Stage::Model,
                        error: format!("model {} is not initialized", triple.model),
                    };
                    tracing::error!("Skipping {} on {}: {:?}", triple.qualified_task(), triple.model, outcome);
                    progress.on_triple_complete(&triple, &outcome);
                    triples.push(TripleReport { triple, outcome });
                    continue;
                };
                let path = self.results_dir.join(result_file_name(
                    &plan.timestamp,
                    &triple.model,
                    &triple.qualified_task(),
                ));
                jobs.push(ModelJob {
                    provider,
                    triple,
                    path,
                    samples: prepared.clone(),
                    options: self.options.clone(),
                    progress: progress.clone(),
                });
            }

            triples.extend(self.run_jobs(jobs).await);
        }

        RunReport {
            timestamp: plan.timestamp.clone(),
            results_dir: self.results_dir.clone(),
            started_at,
            finished_at: Utc::now(),
            triples,
        }
    }

    /// Run the models of one task, sequentially or bounded-parallel
    async fn run_jobs(&self, jobs: Vec<ModelJob>) -> Vec<TripleReport> {
        let mut reports = Vec::with_capacity(jobs.len());

        if self.concurrency <= 1 || jobs.len() <= 1 {
            for job in jobs {
                let triple = job.triple.clone();
                let outcome = run_model_job(job).await;
                reports.push(TripleReport { triple, outcome });
            }
            return reports;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();
        for job in jobs {
            let triple = job.triple.clone();
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                run_model_job(job).await
            });
            handles.push((triple, handle));
        }

        for (triple, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Evaluation of {} on {} aborted: {}", triple.qualified_task(), triple.model, e);
                    TripleOutcome::Failed {
                        stage: Stage::Execute,
                        error: e.to_string(),
                    }
                }
            };
            reports.push(TripleReport { triple, outcome });
        }
        reports
    }
}

/// Query one model on every prepared sample, appending each record as it lands
async fn run_model_job(job: ModelJob) -> TripleOutcome {
    let ModelJob {
        provider,
        triple,
        path,
        samples,
        options,
        progress,
    } = job;
    let qualified = triple.qualified_task();
    let total = samples.len();

    tracing::info!("Evaluating {} on {} ({} samples)", triple.model, qualified, total);
    progress.on_triple_start(&triple, total);

    let outcome = match write_responses(provider.as_ref(), &triple, &qualified, &path, &samples, &options, progress.as_ref()).await {
        Ok(error_outputs) => {
            tracing::info!("Saved results to {}", path.display());
            TripleOutcome::Completed {
                path,
                samples: total,
                error_outputs,
            }
        }
        Err(e) => {
            tracing::error!(
                "Failed {} on {} at write stage ({}): {}",
                qualified,
                triple.model,
                path.display(),
                e
            );
            TripleOutcome::Failed {
                stage: Stage::Write,
                error: e.to_string(),
            }
        }
    };

    progress.on_triple_complete(&triple, &outcome);
    outcome
}

async fn write_responses(
    provider: &dyn LLMProvider,
    triple: &Triple,
    qualified: &str,
    path: &Path,
    samples: &[PreparedSample],
    options: &GenerateOptions,
    progress: &dyn ProgressCallback,
) -> Result<usize, crate::results::RecordError> {
    let mut writer = ResultWriter::create(path)?;
    let mut error_outputs = 0;

    for (idx, prepared) in samples.iter().enumerate() {
        let prediction = provider.generate(&prepared.prompt, options).await;
        if is_error_output(&prediction) {
            error_outputs += 1;
            tracing::warn!("{} on {} sample {}: {}", triple.model, qualified, idx, prediction);
        }

        let record = ResultRecord::new(
            &triple.model,
            triple.benchmark,
            qualified,
            &prepared.prompt,
            prediction,
            &prepared.record,
        );
        writer.append(&record)?;
        progress.on_sample_complete(triple, idx + 1, samples.len());
    }

    Ok(error_outputs)
}
