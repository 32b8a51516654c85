//! Korean benchmark runner CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kobench::{
    analysis::{score_records, Aggregator, Judge},
    benchmarks::{source::create_source, Benchmark, ScoringMode},
    config::Config,
    providers::{create_model, create_models, GenerateOptions, is_error_output},
    reporting::{
        leaderboard_file_name, print_judge_summary, print_leaderboard, print_run_report,
        print_task_pivot,
    },
    results::{new_run_timestamp, ResultSet, RunSelection},
    runner::{BarProgress, Evaluator, ProgressCallback, RunPlan, RunReport},
};

const PING_PROMPT: &str = "안녕하세요! 간단히 자기소개를 해주세요.";

#[derive(Parser)]
#[command(name = "kobench")]
#[command(about = "Korean-language LLM benchmark runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Draw a single record per task
    #[arg(long, global = true)]
    dry_run: bool,

    /// Report configuration and API key presence without generating
    #[arg(long)]
    test_connection: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate models and persist raw responses
    Run {
        /// Comma-separated model ids (default: enabled models)
        #[arg(short, long)]
        models: Option<String>,

        /// Comma-separated benchmarks (default: enabled benchmarks)
        #[arg(short, long)]
        benchmarks: Option<String>,

        /// Comma-separated tasks, bare (`copa`) or qualified (`kobest_copa`)
        #[arg(short, long)]
        tasks: Option<String>,
    },

    /// Rescore persisted results and print per-task accuracy
    Score {
        /// Results directory (default: paths.results_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Only this run timestamp
        #[arg(long, conflicts_with = "all_runs")]
        run: Option<String>,

        /// Every run instead of the newest file per model and task
        #[arg(long)]
        all_runs: bool,
    },

    /// Rescore persisted results and write the leaderboard
    Leaderboard {
        /// Results directory (default: paths.results_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Leaderboard CSV path (default: <results>/leaderboard_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only this run timestamp
        #[arg(long, conflicts_with = "all_runs")]
        run: Option<String>,

        /// Every run instead of the newest file per model and task
        #[arg(long)]
        all_runs: bool,
    },

    /// Grade open-ended result files with the judge model
    Judge {
        /// Result CSV files (default: newest LogicKor files in the results directory)
        #[arg(short, long, num_args = 1..)]
        input: Vec<PathBuf>,
    },

    /// Send one short request to a model
    Ping {
        /// Model id from the configuration
        #[arg(short, long)]
        model: String,
    },

    /// List benchmarks and their tasks
    ListTasks {
        /// Only this benchmark
        #[arg(short, long)]
        benchmark: Option<String>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/kobench.toml")]
        output: PathBuf,
    },

    /// Render sampled prompts to text files for review
    DumpPrompts {
        /// Output directory for prompt files
        #[arg(short, long, default_value = "results/prompts")]
        output: PathBuf,

        /// Prompts written per task
        #[arg(short, long, default_value = "3")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("kobench=debug,info")
        } else {
            EnvFilter::new("kobench=info,warn")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(Commands::InitConfig { output }) = &cli.command {
        return init_config(output);
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };
    if cli.dry_run {
        tracing::info!("Dry run: one record per task");
        config = config.with_dry_run();
    }

    if cli.test_connection {
        test_connection(&config);
        return Ok(());
    }

    match cli.command {
        None => {
            run_evaluation(&config, None, None, None).await?;
            build_leaderboard(&config, None, None, RunSelection::Latest)?;
        }

        Some(Commands::Run {
            models,
            benchmarks,
            tasks,
        }) => {
            run_evaluation(&config, models, benchmarks, tasks).await?;
        }

        Some(Commands::Score {
            input,
            run,
            all_runs,
        }) => {
            score_results(&config, input, selection(run, all_runs))?;
        }

        Some(Commands::Leaderboard {
            input,
            output,
            run,
            all_runs,
        }) => {
            build_leaderboard(&config, input, output, selection(run, all_runs))?;
        }

        Some(Commands::Judge { input }) => {
            judge_results(&config, input).await?;
        }

        Some(Commands::Ping { model }) => {
            ping(&config, &model).await?;
        }

        Some(Commands::ListTasks { benchmark }) => {
            list_tasks(benchmark)?;
        }

        Some(Commands::InitConfig { .. }) => {}

        Some(Commands::DumpPrompts { output, limit }) => {
            dump_prompts(&config, output, limit).await?;
        }
    }

    Ok(())
}

fn split_list(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_benchmarks(arg: &str) -> Result<Vec<Benchmark>, String> {
    split_list(arg).iter().map(|name| name.parse()).collect()
}

fn selection(run: Option<String>, all_runs: bool) -> RunSelection {
    match (run, all_runs) {
        (Some(ts), _) => RunSelection::Run(ts),
        (None, true) => RunSelection::All,
        (None, false) => RunSelection::Latest,
    }
}

async fn run_evaluation(
    config: &Config,
    models_arg: Option<String>,
    benchmarks_arg: Option<String>,
    tasks_arg: Option<String>,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let models = match models_arg {
        Some(arg) => split_list(&arg),
        None => config.evaluation.enabled_models.clone(),
    };

    let mut plan = RunPlan::from_config(config, &models)?;
    if let Some(arg) = benchmarks_arg {
        plan = plan.with_benchmarks(&parse_benchmarks(&arg)?);
    }
    if let Some(arg) = tasks_arg {
        plan = plan.with_tasks(&split_list(&arg));
    }

    println!("=== Korean Benchmark Evaluation ===");
    println!("Run ID:      {}", plan.timestamp);
    println!("Models:      {}", models.join(", "));
    println!("Benchmarks:  {}", config.evaluation.enabled_benchmarks.join(", "));
    println!("Sample size: {}", config.evaluation.sample_size);
    println!("Triples:     {}", plan.len());
    println!();

    if plan.is_empty() {
        eprintln!("Error: Nothing to run for the selected models, benchmarks and tasks");
        std::process::exit(1);
    }

    let (providers, failures) = create_models(&models, config);
    for (id, e) in &failures {
        eprintln!("Warning: {} disabled: {}", id, e);
    }
    if providers.is_empty() {
        eprintln!("Error: No models available. Check API keys in the environment or .env.");
        for id in &models {
            if let Some(model) = config.model(id) {
                eprintln!("  {} for {}", model.api_key_env, id);
            }
        }
        std::process::exit(1);
    }

    let evaluator = Evaluator::new(config, providers, create_source(config));
    let progress = Arc::new(BarProgress::new(plan.len()));
    let callback: Arc<dyn ProgressCallback> = progress.clone();

    let report = evaluator.run(&plan, callback).await;
    progress.finish();

    print_run_report(&report);
    match report.write_summary() {
        Ok(path) => println!("Run summary written to: {}", path.display()),
        Err(e) => tracing::warn!("Failed to write run summary: {}", e),
    }

    Ok(report)
}

fn load_results(
    config: &Config,
    input: Option<PathBuf>,
    selection: &RunSelection,
) -> Result<(PathBuf, ResultSet), Box<dyn std::error::Error>> {
    let dir = input.unwrap_or_else(|| config.paths.results_dir.clone());
    let results = ResultSet::load(&dir, selection)?;
    println!(
        "Loaded {} records from {} files in {}",
        results.record_count(),
        results.files.len(),
        dir.display()
    );
    Ok((dir, results))
}

fn score_results(
    config: &Config,
    input: Option<PathBuf>,
    selection: RunSelection,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_, results) = load_results(config, input, &selection)?;
    let scored = score_records(results.records());
    let scores = Aggregator::from_config(config).task_scores(&scored);
    print_task_pivot(&scores);
    Ok(())
}

fn build_leaderboard(
    config: &Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    selection: RunSelection,
) -> Result<(), Box<dyn std::error::Error>> {
    let (dir, results) = load_results(config, input, &selection)?;
    if results.is_empty() {
        println!("No result files found in {}", dir.display());
        return Ok(());
    }

    let aggregator = Aggregator::from_config(config);
    let scored = score_records(results.records());
    let scores = aggregator.task_scores(&scored);
    let leaderboard = aggregator.leaderboard(&scores);

    print_task_pivot(&scores);
    print_leaderboard(&leaderboard);

    if leaderboard.rows.is_empty() {
        return Ok(());
    }
    let path = output.unwrap_or_else(|| dir.join(leaderboard_file_name(&new_run_timestamp())));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    leaderboard.write_csv(&path)?;
    println!("Leaderboard written to: {}", path.display());
    Ok(())
}

/// Newest LogicKor result files of the results directory
fn default_judge_inputs(config: &Config) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let results = ResultSet::load(&config.paths.results_dir, &RunSelection::Latest)?;
    Ok(results
        .files
        .into_iter()
        .filter(|f| {
            f.records.first().is_some_and(|r| {
                r.benchmark
                    .parse::<Benchmark>()
                    .is_ok_and(|b| b.scoring() == ScoringMode::Judge)
            })
        })
        .map(|f| f.path)
        .collect())
}

async fn judge_results(config: &Config, input: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let files = if input.is_empty() {
        default_judge_inputs(config)?
    } else {
        input
    };
    if files.is_empty() {
        eprintln!("Error: No open-ended result files to judge");
        std::process::exit(1);
    }

    let judge = Judge::from_config(config)?;
    println!("=== LLM-as-Judge ({}) ===", judge.model());

    for path in &files {
        match judge.score_file(path).await {
            Ok(summary) => print_judge_summary(&summary),
            Err(e) => eprintln!("  [ERROR] {}: {}", path.display(), e),
        }
    }
    Ok(())
}

async fn ping(config: &Config, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let provider = create_model(id, config)?;
    println!("Model:    {} ({})", id, provider.api_model());
    println!("Rate:     {} rpm", provider.rate_limiter().requests_per_minute());
    println!("Prompt:   {}", PING_PROMPT);

    let options = GenerateOptions::default()
        .with_max_tokens(100)
        .with_temperature(config.evaluation.temperature);
    let started = std::time::Instant::now();
    let response = provider.generate(PING_PROMPT, &options).await;

    println!("Response: {}", response);
    println!("Latency:  {}ms", started.elapsed().as_millis());
    if is_error_output(&response) {
        std::process::exit(1);
    }
    Ok(())
}

fn test_connection(config: &Config) {
    println!("=== Configuration Check ===");
    println!("Benchmarks:  {}", config.evaluation.enabled_benchmarks.join(", "));
    println!("Sample size: {}", config.evaluation.sample_size);
    println!("Seed:        {}", config.evaluation.seed);
    println!("Data source: {:?}", config.dataset.source);
    println!("Data dir:    {}", config.paths.data_dir.display());
    println!("Results dir: {}", config.paths.results_dir.display());
    println!();

    println!("Models:");
    println!("{:-<60}", "");
    for id in &config.evaluation.enabled_models {
        match config.model(id) {
            Some(model) => {
                let key = if std::env::var(&model.api_key_env).is_ok_and(|v| !v.is_empty()) {
                    "key present"
                } else {
                    "key MISSING"
                };
                println!(
                    "  {} | {} | {} | {} ({})",
                    id, model.backend, model.api_model, model.api_key_env, key
                );
            }
            None => println!("  {} | not defined in [models]", id),
        }
    }
}

fn list_tasks(benchmark: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let benchmarks = match benchmark {
        Some(name) => vec![name.parse::<Benchmark>()?],
        None => Benchmark::all(),
    };

    for benchmark in benchmarks {
        let scoring = match benchmark.scoring() {
            ScoringMode::Choice => "accuracy",
            ScoringMode::Judge => "judge",
        };
        println!(
            "{} ({}, {} tasks, {})",
            benchmark,
            benchmark.dataset_id(),
            benchmark.tasks().len(),
            scoring
        );
        println!("{:-<60}", "");
        for task in benchmark.tasks() {
            println!("  {}", benchmark.qualified_task(task));
        }
        println!();
    }

    Ok(())
}

fn init_config(output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    // Ensure parent directory exists
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    config.save_toml(output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}

async fn dump_prompts(config: &Config, output_dir: PathBuf, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let evaluator = Evaluator::new(config, Vec::new(), create_source(config));
    std::fs::create_dir_all(&output_dir)?;

    println!("=== Dumping Benchmark Prompts ===");
    println!("Sample size: {}", config.evaluation.sample_size);
    println!("Output:      {}", output_dir.display());
    println!();

    let mut written = 0;
    for benchmark in config.enabled_benchmarks()? {
        for task in benchmark.tasks() {
            let qualified = benchmark.qualified_task(task);
            let samples = match evaluator.prepare_task(benchmark, task).await {
                Ok(samples) => samples,
                Err((stage, e)) => {
                    eprintln!("  [ERROR] {} ({}): {}", qualified, stage, e);
                    continue;
                }
            };

            let mut content = format!("=== {} ({} samples) ===\n", qualified, samples.len());
            for (i, sample) in samples.iter().take(limit).enumerate() {
                let record = serde_json::to_string_pretty(&sample.record)?;
                content.push_str(&format!(
                    "\n--- Sample {} ---\n{}\n\n=== PROMPT ===\n\n{}\n{}\n",
                    i + 1,
                    record,
                    sample.prompt,
                    "=".repeat(50)
                ));
            }

            let filename = format!("{}.txt", qualified);
            std::fs::write(output_dir.join(&filename), &content)?;
            println!("  {} -> {}", qualified, filename);
            written += 1;
        }
    }

    println!("\nDone. {} files written to {}", written, output_dir.display());
    Ok(())
}
