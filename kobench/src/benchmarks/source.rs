//! Dataset sources: Hugging Face datasets-server and local JSONL exports

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{Benchmark, Record};
use crate::config::{Config, DatasetSourceKind};

/// Error type for dataset loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Dataset server error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("No splits available for {dataset} ({config})")]
    Unavailable { dataset: String, config: String },

    #[error("None of the splits {wanted:?} present (have {available:?})")]
    MissingSplit {
        wanted: Vec<String>,
        available: Vec<String>,
    },
}

/// Split-keyed collection of records for one task
#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    splits: IndexMap<String, Vec<Record>>,
}

impl DatasetSplits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, split: impl Into<String>, records: Vec<Record>) {
        self.splits.insert(split.into(), records);
    }

    pub fn get(&self, split: &str) -> Option<&[Record]> {
        self.splits.get(split).map(|r| r.as_slice())
    }

    pub fn split_names(&self) -> Vec<String> {
        self.splits.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Take the split this benchmark is evaluated on
    pub fn into_primary(mut self, benchmark: Benchmark) -> Result<(String, Vec<Record>), LoadError> {
        for split in benchmark.preferred_splits() {
            if let Some(records) = self.splits.shift_remove(*split) {
                return Ok((split.to_string(), records));
            }
        }
        Err(LoadError::MissingSplit {
            wanted: benchmark.preferred_splits().iter().map(|s| s.to_string()).collect(),
            available: self.split_names(),
        })
    }
}

/// Anything that can produce the records of a benchmark task
#[async_trait]
pub trait DatasetSource: Send + Sync {
    fn name(&self) -> &str;

    async fn load(&self, benchmark: Benchmark, task: &str) -> Result<DatasetSplits, LoadError>;
}

/// Build the source selected in configuration
pub fn create_source(config: &Config) -> Arc<dyn DatasetSource> {
    match config.dataset.source {
        DatasetSourceKind::Hub => Arc::new(
            HubSource::new(&config.dataset.hub_url)
                .with_page_size(config.dataset.page_size)
                .with_timeout(Duration::from_secs(config.dataset.timeout_secs)),
        ),
        DatasetSourceKind::Local => Arc::new(LocalSource::new(&config.paths.data_dir)),
    }
}

/// Reads rows from the datasets-server `/rows` endpoint, one page at a time
pub struct HubSource {
    base_url: String,
    page_size: usize,
    /// Bound on each page request
    timeout: Duration,
    http_client: Client,
}

#[derive(Deserialize)]
struct RowsResponse {
    rows: Vec<RowEntry>,
    num_rows_total: usize,
}

#[derive(Deserialize)]
struct RowEntry {
    row: Record,
}

#[derive(Deserialize)]
struct HubError {
    error: String,
}

impl HubSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: 100,
            timeout: Duration::from_secs(60),
            http_client: Client::new(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch a full split; `None` when the split does not exist
    async fn fetch_split(
        &self,
        dataset: &str,
        config: &str,
        split: &str,
    ) -> Result<Option<Vec<Record>>, LoadError> {
        let mut records = Vec::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .http_client
                .get(format!("{}/rows", self.base_url))
                .timeout(self.timeout)
                .query(&[
                    ("dataset", dataset.to_string()),
                    ("config", config.to_string()),
                    ("split", split.to_string()),
                    ("offset", offset.to_string()),
                    ("length", self.page_size.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if offset == 0 && (status == StatusCode::NOT_FOUND || status == StatusCode::UNPROCESSABLE_ENTITY) {
                tracing::debug!("{} ({}) has no split {}", dataset, config, split);
                return Ok(None);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = match serde_json::from_str::<HubError>(&body) {
                    Ok(error) => error.error,
                    Err(_) => body,
                };
                return Err(LoadError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let page: RowsResponse = response.json().await?;
            let fetched = page.rows.len();
            records.extend(page.rows.into_iter().map(|entry| entry.row));
            offset += fetched;

            if fetched == 0 || offset >= page.num_rows_total {
                break;
            }
        }

        tracing::debug!("Fetched {} rows of {}/{}/{}", records.len(), dataset, config, split);
        Ok(Some(records))
    }
}

#[async_trait]
impl DatasetSource for HubSource {
    fn name(&self) -> &str {
        "hub"
    }

    async fn load(&self, benchmark: Benchmark, task: &str) -> Result<DatasetSplits, LoadError> {
        let dataset = benchmark.dataset_id();
        let config = benchmark.dataset_config(task);
        let mut splits = DatasetSplits::new();

        // Only the first split that exists is evaluated
        for split in benchmark.preferred_splits() {
            if let Some(records) = self.fetch_split(dataset, config, split).await? {
                splits.insert(*split, records);
                break;
            }
        }

        if splits.is_empty() {
            return Err(LoadError::Unavailable {
                dataset: dataset.to_string(),
                config: config.to_string(),
            });
        }
        Ok(splits)
    }
}

/// Reads `<data_dir>/<benchmark>/<task>/<split>.jsonl`
pub struct LocalSource {
    data_dir: PathBuf,
}

impl LocalSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn task_dir(&self, benchmark: Benchmark, task: &str) -> PathBuf {
        self.data_dir.join(benchmark.as_str()).join(task)
    }
}

/// Parse one JSON object per non-blank line
pub fn parse_jsonl(content: &str, context: &str) -> Result<Vec<Record>, LoadError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<Record>(line).map_err(|e| LoadError::Parse {
                context: format!("{}:{}", context, idx + 1),
                message: e.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl DatasetSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    async fn load(&self, benchmark: Benchmark, task: &str) -> Result<DatasetSplits, LoadError> {
        let dir = self.task_dir(benchmark, task);
        let mut splits = DatasetSplits::new();

        for split in benchmark.preferred_splits() {
            let path = dir.join(format!("{}.jsonl", split));
            if !path.exists() {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?;
            let records = parse_jsonl(&content, &path.display().to_string())?;
            splits.insert(*split, records);
        }

        if splits.is_empty() {
            return Err(LoadError::Unavailable {
                dataset: dir.display().to_string(),
                config: task.to_string(),
            });
        }
        Ok(splits)
    }
}
