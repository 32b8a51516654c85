//! Configuration management for the Korean benchmark runner
//!
//! The configuration is loaded once at process start from a TOML file and
//! passed by reference into the evaluator, the sample provider, the
//! aggregator and the judge. Nothing below reads process-wide state except
//! the API-key lookup performed when a model client is constructed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::benchmarks::Benchmark;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    /// Model definitions keyed by the identifier used in `enabled_models`
    #[serde(default)]
    pub models: IndexMap<String, ModelConfig>,
}

/// What gets evaluated and how each model call is parameterised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Ordered; the order is also the leaderboard tie-break order
    #[serde(default = "default_enabled_models")]
    pub enabled_models: Vec<String>,
    #[serde(default = "default_enabled_benchmarks")]
    pub enabled_benchmarks: Vec<String>,
    #[serde(default = "default_sample_size")]
    pub sample_size: SampleSize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound for a single model call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Models of one task evaluated at once; 1 keeps everything sequential
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

/// Where benchmark records come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub source: DatasetSourceKind,
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// Rows requested per page from the hub (the server caps this at 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound for one page request
    #[serde(default = "default_dataset_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSourceKind {
    /// Hugging Face datasets-server rows API
    #[default]
    Hub,
    /// JSONL exports under `paths.data_dir`
    Local,
}

/// LLM-as-judge settings for open-ended benchmarks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_judge_temperature")]
    pub temperature: f32,
    /// Pause between judge calls
    #[serde(default = "default_judge_delay_ms")]
    pub delay_ms: u64,
}

/// Backend family a model is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// Chat-completions style endpoint (mlapi.run, OpenAI, vLLM, ...)
    #[serde(rename = "openai_compatible")]
    OpenAICompatible,
    /// Google Generative Language `generateContent`
    #[serde(rename = "gemini")]
    Gemini,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::OpenAICompatible => write!(f, "openai_compatible"),
            Backend::Gemini => write!(f, "gemini"),
        }
    }
}

/// Model-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub backend: Backend,
    /// Full chat-completions URL, or the models base URL for Gemini
    pub endpoint: String,
    /// Model name sent in the request body
    pub api_model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Sent as `chat_template_kwargs.enable_thinking` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_thinking: Option<bool>,
    /// `max_completion_tokens` instead of the legacy `max_tokens`
    #[serde(default = "default_true")]
    pub uses_completion_tokens: bool,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
}

/// How many records to draw from each benchmark split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SampleSizeRepr", into = "SampleSizeRepr")]
pub enum SampleSize {
    /// Every record, in source order
    All,
    /// At most this many records
    Count(usize),
    /// This proportion of the split, rounded down
    Fraction(f64),
}

impl SampleSize {
    /// Number of records to keep out of `total`
    pub fn resolve(&self, total: usize) -> usize {
        match *self {
            SampleSize::All => total,
            SampleSize::Count(n) => n.min(total),
            SampleSize::Fraction(f) => ((total as f64) * f).floor() as usize,
        }
    }
}

impl fmt::Display for SampleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSize::All => write!(f, "all"),
            SampleSize::Count(n) => write!(f, "{}", n),
            SampleSize::Fraction(p) => write!(f, "{:.0}%", p * 100.0),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SampleSizeRepr {
    Count(u64),
    Fraction(f64),
    Keyword(String),
}

impl TryFrom<SampleSizeRepr> for SampleSize {
    type Error = String;

    fn try_from(repr: SampleSizeRepr) -> Result<Self, Self::Error> {
        match repr {
            SampleSizeRepr::Count(0) => Err("sample_size must be positive".to_string()),
            SampleSizeRepr::Count(n) => Ok(SampleSize::Count(n as usize)),
            SampleSizeRepr::Fraction(f) if f > 0.0 && f <= 1.0 => Ok(SampleSize::Fraction(f)),
            SampleSizeRepr::Fraction(f) => {
                Err(format!("sample_size fraction must be in (0, 1], got {}", f))
            }
            SampleSizeRepr::Keyword(k) => match k.to_lowercase().as_str() {
                "all" | "none" | "unlimited" => Ok(SampleSize::All),
                other => Err(format!("unknown sample_size: {}", other)),
            },
        }
    }
}

impl From<SampleSize> for SampleSizeRepr {
    fn from(size: SampleSize) -> Self {
        match size {
            SampleSize::All => SampleSizeRepr::Keyword("all".to_string()),
            SampleSize::Count(n) => SampleSizeRepr::Count(n as u64),
            SampleSize::Fraction(f) => SampleSizeRepr::Fraction(f),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_rpm() -> u32 { 60 }
fn default_seed() -> u64 { 42 }
fn default_sample_size() -> SampleSize { SampleSize::Count(200) }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.7 }
fn default_timeout_secs() -> u64 { 600 }
fn default_concurrency() -> usize { 1 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_results_dir() -> PathBuf { PathBuf::from("results") }
fn default_hub_url() -> String { "https://datasets-server.huggingface.co".to_string() }
fn default_page_size() -> usize { 100 }
fn default_dataset_timeout_secs() -> u64 { 60 }
fn default_judge_model() -> String { "gpt-5.2".to_string() }
fn default_judge_max_tokens() -> u32 { 200 }
fn default_judge_temperature() -> f32 { 0.1 }
fn default_judge_delay_ms() -> u64 { 1000 }

fn default_enabled_models() -> Vec<String> {
    ["helpy-pro", "helpy-edu", "gpt-oss-20b", "gpt-5.2"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_enabled_benchmarks() -> Vec<String> {
    Benchmark::all().iter().map(|b| b.as_str().to_string()).collect()
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled_models: default_enabled_models(),
            enabled_benchmarks: default_enabled_benchmarks(),
            sample_size: default_sample_size(),
            seed: default_seed(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source: DatasetSourceKind::Hub,
            hub_url: default_hub_url(),
            page_size: default_page_size(),
            timeout_secs: default_dataset_timeout_secs(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            max_tokens: default_judge_max_tokens(),
            temperature: default_judge_temperature(),
            delay_ms: default_judge_delay_ms(),
        }
    }
}

const MLAPI_KEY_ENV: &str = "ELICE_API_KEY";
const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

fn mlapi_model(deployment: &str, api_model: &str, enable_thinking: Option<bool>) -> ModelConfig {
    ModelConfig {
        backend: Backend::OpenAICompatible,
        endpoint: format!("https://mlapi.run/{}/v1/chat/completions", deployment),
        api_model: api_model.to_string(),
        api_key_env: MLAPI_KEY_ENV.to_string(),
        enable_thinking,
        uses_completion_tokens: true,
        rpm: default_rpm(),
    }
}

fn gemini_model(api_model: &str) -> ModelConfig {
    ModelConfig {
        backend: Backend::Gemini,
        endpoint: GEMINI_ENDPOINT.to_string(),
        api_model: api_model.to_string(),
        api_key_env: GEMINI_KEY_ENV.to_string(),
        enable_thinking: None,
        uses_completion_tokens: false,
        rpm: default_rpm(),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut models = IndexMap::new();
        models.insert(
            "helpy-pro".to_string(),
            mlapi_model("5ee9c080-1fdd-401e-9830-1d2733a45b25", "eliceai/helpy-pro-dragon", Some(false)),
        );
        models.insert(
            "helpy-edu".to_string(),
            mlapi_model("4efc840a-a50b-46ca-b2d5-6eb7ead6aa37", "eliceai/helpy-edu-dragonfruit", Some(false)),
        );
        models.insert(
            "gpt-oss-20b".to_string(),
            mlapi_model("074881af-991b-4237-b58a-5e8a39b225f4", "openai/gpt-oss-20b", None),
        );
        models.insert(
            "gpt-5.2".to_string(),
            mlapi_model("664ce153-d45c-42a7-903c-d9119cc55b69", "openai/gpt-5.2", None),
        );
        models.insert("gemini-3-pro".to_string(), gemini_model("gemini-3-pro-preview"));
        models.insert("gemini-3-flash".to_string(), gemini_model("gemini-3-flash-preview"));

        Self {
            evaluation: EvaluationConfig::default(),
            paths: PathsConfig::default(),
            dataset: DatasetConfig::default(),
            judge: JudgeConfig::default(),
            models,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first default location that exists, or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/kobench.toml",
            "kobench.toml",
            "kobench/config/kobench.toml",
        ];

        for path in &config_paths {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings no run could honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if let SampleSize::Fraction(f) = self.evaluation.sample_size {
            if !(f > 0.0 && f <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "sample_size fraction must be in (0, 1], got {}",
                    f
                )));
            }
        }
        if self.dataset.timeout_secs == 0 {
            return Err(ConfigError::Invalid("dataset.timeout_secs must be at least 1".to_string()));
        }
        if self.dataset.page_size == 0 {
            return Err(ConfigError::Invalid("dataset.page_size must be at least 1".to_string()));
        }
        self.enabled_benchmarks()?;
        Ok(())
    }

    /// Enabled benchmark families, in configuration order
    pub fn enabled_benchmarks(&self) -> Result<Vec<Benchmark>, ConfigError> {
        self.evaluation
            .enabled_benchmarks
            .iter()
            .map(|name| name.parse().map_err(ConfigError::Invalid))
            .collect()
    }

    /// Get a model definition by identifier
    pub fn model(&self, id: &str) -> Option<&ModelConfig> {
        self.models.get(id)
    }

    /// Copy of this configuration that draws a single record per split
    pub fn with_dry_run(&self) -> Self {
        let mut config = self.clone();
        config.evaluation.sample_size = SampleSize::Count(1);
        config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
