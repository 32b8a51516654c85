//! Korean-language LLM benchmark runner
//!
//! This crate evaluates chat models on Korean benchmarks (KoBEST, KMMLU,
//! HAE-RAE and LogicKor), persists every raw response, and derives accuracy
//! offline by replaying answer extraction over the stored predictions.
//!
//! # Features
//!
//! - OpenAI-compatible and Gemini backends behind one `LLMProvider` trait
//! - Seeded, reproducible sampling of benchmark splits
//! - One append-only CSV per (benchmark, task, model) triple
//! - Rule-based answer extraction with index-shift aware scoring
//! - Leaderboard aggregation and LLM-as-judge grading for open-ended tasks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kobench::{
//!     benchmarks::source::create_source,
//!     config::Config,
//!     providers::create_enabled_models,
//!     runner::{Evaluator, NoOpProgress, RunPlan},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default().with_dry_run();
//!     let (providers, _failures) = create_enabled_models(&config);
//!
//!     let evaluator = Evaluator::new(&config, providers, create_source(&config));
//!     let plan = RunPlan::from_config(&config, &config.evaluation.enabled_models)?;
//!     let report = evaluator.run(&plan, Arc::new(NoOpProgress)).await;
//!
//!     println!("{} triples completed", report.completed().count());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod benchmarks;
pub mod config;
pub mod providers;
pub mod reporting;
pub mod results;
pub mod runner;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        extract, extract_answer, is_correct, score_record, score_records, Aggregator, Judge,
        Leaderboard, ScoredRecord, TaskScore,
    };
    pub use crate::benchmarks::{format_prompt, sample, Benchmark, DatasetSource, Record};
    pub use crate::config::{Config, SampleSize};
    pub use crate::providers::{
        create_enabled_models, create_model, CompletionRequest, CompletionResponse, GenerateOptions,
        LLMProvider, ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_leaderboard, print_run_report, print_task_pivot, RunSummary};
    pub use crate::results::{ResultRecord, ResultSet, ResultWriter, RunSelection};
    pub use crate::runner::{Evaluator, NoOpProgress, ProgressCallback, RunPlan, RunReport};
}
