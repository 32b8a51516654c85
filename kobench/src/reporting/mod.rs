//! Results reporting

pub mod leaderboard;

pub use leaderboard::{leaderboard_file_name, print_leaderboard};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{JudgeSummary, TaskScore};
use crate::runner::{RunReport, TripleOutcome};

/// JSON summary of one evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_triples: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_samples: usize,
    pub error_outputs: usize,
    pub triples: Vec<TripleSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleSummary {
    pub model: String,
    pub benchmark: String,
    pub task: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub samples: usize,
    pub error_outputs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Create from a finished run
    pub fn from_report(report: &RunReport) -> Self {
        let triples: Vec<TripleSummary> = report
            .triples
            .iter()
            .map(|t| {
                let base = TripleSummary {
                    model: t.triple.model.clone(),
                    benchmark: t.triple.benchmark.as_str().to_string(),
                    task: t.triple.qualified_task(),
                    status: String::new(),
                    file: None,
                    samples: 0,
                    error_outputs: 0,
                    stage: None,
                    error: None,
                };
                match &t.outcome {
                    TripleOutcome::Completed {
                        path,
                        samples,
                        error_outputs,
                    } => TripleSummary {
                        status: "completed".to_string(),
                        file: Some(path.display().to_string()),
                        samples: *samples,
                        error_outputs: *error_outputs,
                        ..base
                    },
                    TripleOutcome::Failed { stage, error } => TripleSummary {
                        status: "failed".to_string(),
                        stage: Some(stage.to_string()),
                        error: Some(error.clone()),
                        ..base
                    },
                }
            })
            .collect();

        let completed = report.completed().count();
        Self {
            run_id: report.timestamp.clone(),
            started_at: report.started_at.to_rfc3339(),
            finished_at: report.finished_at.to_rfc3339(),
            total_triples: triples.len(),
            completed,
            failed: triples.len() - completed,
            total_samples: report.total_samples(),
            error_outputs: report.error_outputs(),
            triples,
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Console summary of a run
pub fn print_run_report(report: &RunReport) {
    let completed = report.completed().count();
    println!("\n=== Evaluation Run {} ===\n", report.timestamp);
    println!(
        "Triples: {} completed, {} failed ({} total)",
        completed,
        report.triples.len() - completed,
        report.triples.len()
    );
    println!(
        "Samples: {} written, {} error outputs",
        report.total_samples(),
        report.error_outputs()
    );
    println!(
        "Elapsed: {}s",
        (report.finished_at - report.started_at).num_seconds()
    );

    let failed: Vec<_> = report.failed().collect();
    if !failed.is_empty() {
        println!("\nFailures:");
        println!("{:-<50}", "");
        for t in failed {
            if let TripleOutcome::Failed { stage, error } = &t.outcome {
                println!(
                    "  {} / {} [{}]: {}",
                    t.triple.model,
                    t.triple.qualified_task(),
                    stage,
                    error
                );
            }
        }
    }

    println!("\n{:=<50}", "");
}

/// Per-task accuracy with models as columns
pub fn print_task_pivot(scores: &[TaskScore]) {
    println!("\n=== Benchmark Results Summary ===\n");

    if scores.is_empty() {
        println!("No results found.");
        return;
    }

    let models: IndexSet<&str> = scores.iter().map(|s| s.model.as_str()).collect();
    let mut cells: IndexMap<(&str, &str), IndexMap<&str, &TaskScore>> = IndexMap::new();
    for s in scores {
        cells
            .entry((s.benchmark.as_str(), s.task.as_str()))
            .or_default()
            .insert(s.model.as_str(), s);
    }
    cells.sort_keys();

    let task_width = cells.keys().map(|(_, t)| t.len()).max().unwrap_or(4).max(4);
    let col_width = models.iter().map(|m| m.len()).max().unwrap_or(8).max(8);

    print!("  {:<10} {:<width$}", "Benchmark", "Task", width = task_width);
    for model in &models {
        print!(" {:>width$}", model, width = col_width);
    }
    println!();
    println!("{:-<1$}", "", 13 + task_width + (col_width + 1) * models.len());

    for ((benchmark, task), by_model) in &cells {
        print!("  {:<10} {:<width$}", benchmark, task, width = task_width);
        for model in &models {
            match by_model.get(model) {
                Some(s) => print!(" {:>width$.4}", s.accuracy, width = col_width),
                None => print!(" {:>width$}", "-", width = col_width),
            }
        }
        println!();
    }

    let errors: usize = scores.iter().map(|s| s.error_outputs).sum();
    if errors > 0 {
        println!("\n{} predictions were generation errors (scored as wrong)", errors);
    }
    println!("\n{:=<50}", "");
}

/// Console summary of one judged file
pub fn print_judge_summary(summary: &JudgeSummary) {
    println!("\n=== Judge Scores: {} ===", summary.file.display());
    if let Some(model) = &summary.model {
        println!("Model:   {}", model);
    }
    println!("Total:   {}", summary.total);
    println!("Valid:   {}", summary.valid);
    println!("Scored:  {}", summary.scored);
    match summary.average {
        Some(avg) => println!("Average: {:.2} / 5", avg),
        None => println!("Average: -"),
    }
    if summary.scored > 0 {
        println!("{:-<30}", "");
        for (i, count) in summary.distribution.iter().enumerate() {
            println!("  {}: {}", i + 1, count);
        }
    }
    if let Some(output) = &summary.output {
        println!("Written: {}", output.display());
    }
}
