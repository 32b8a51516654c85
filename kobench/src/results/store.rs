//! CSV result files: writing, reading and selecting runs

use indexmap::IndexMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{split_file_name, RecordError, ResultRecord, COLUMNS};

/// Append-only writer for one result file
pub struct ResultWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl ResultWriter {
    /// Create a new result file with its header row; never overwrites
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| match source.kind() {
                ErrorKind::AlreadyExists => RecordError::Exists(path.clone()),
                _ => RecordError::Io {
                    path: path.clone(),
                    source,
                },
            })?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(COLUMNS).map_err(|source| RecordError::Csv {
            path: path.clone(),
            source,
        })?;
        let mut result_writer = Self { path, writer, rows: 0 };
        result_writer.flush()?;
        Ok(result_writer)
    }

    /// Write one record and flush it to disk
    pub fn append(&mut self, record: &ResultRecord) -> Result<(), RecordError> {
        self.writer.serialize(record).map_err(|source| RecordError::Csv {
            path: self.path.clone(),
            source,
        })?;
        self.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RecordError> {
        self.writer.flush().map_err(|source| RecordError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Read every record of a result file
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<ResultRecord>, RecordError> {
    let path = path.as_ref();
    let csv_error = |source| RecordError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    reader
        .deserialize()
        .collect::<Result<Vec<ResultRecord>, csv::Error>>()
        .map_err(csv_error)
}

/// Files that are derived outputs rather than raw results
fn is_derived_file(name: &str) -> bool {
    name.contains("leaderboard") || name.contains("aggregated") || name.ends_with("_scored.csv")
}

/// Raw result files in `dir`, sorted by name
pub fn discover_result_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, RecordError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|source| RecordError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| name.ends_with(".csv") && !is_derived_file(name))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Which runs a scoring pass looks at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunSelection {
    /// Newest file per (model, task)
    #[default]
    Latest,
    /// Only the run with this timestamp
    Run(String),
    /// Every result file
    All,
}

/// One loaded result file
#[derive(Debug, Clone)]
pub struct ResultFile {
    pub path: PathBuf,
    /// Run timestamp, when the name follows the result-file convention
    pub timestamp: Option<String>,
    pub records: Vec<ResultRecord>,
}

/// The result files selected for one scoring pass
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub files: Vec<ResultFile>,
}

impl ResultSet {
    /// Load the selected result files of `dir`; unreadable files are skipped
    pub fn load(dir: impl AsRef<Path>, selection: &RunSelection) -> Result<Self, RecordError> {
        let dir = dir.as_ref();
        let paths = select_files(discover_result_files(dir)?, selection);

        let mut files = Vec::new();
        for path in paths {
            match read_records(&path) {
                Ok(records) => {
                    let timestamp = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(split_file_name)
                        .map(|(ts, _)| ts.to_string());
                    files.push(ResultFile {
                        path,
                        timestamp,
                        records,
                    });
                }
                Err(e) => tracing::warn!("Skipping unreadable result file: {}", e),
            }
        }

        tracing::info!("Loaded {} result files from {}", files.len(), dir.display());
        Ok(Self { files })
    }

    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.files.iter().flat_map(|f| f.records.iter())
    }

    pub fn record_count(&self) -> usize {
        self.files.iter().map(|f| f.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn file_key(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_str()?;
    split_file_name(name).map(|(ts, key)| (ts.to_string(), key.to_string()))
}

/// Apply a run selection to discovered paths
fn select_files(paths: Vec<PathBuf>, selection: &RunSelection) -> Vec<PathBuf> {
    match selection {
        RunSelection::All => paths,
        RunSelection::Run(ts) => paths
            .into_iter()
            .filter(|p| file_key(p).map(|(t, _)| &t == ts).unwrap_or(false))
            .collect(),
        RunSelection::Latest => {
            // timestamps sort lexicographically in time order
            let mut latest: IndexMap<String, (String, PathBuf)> = IndexMap::new();
            for path in paths {
                let Some((ts, key)) = file_key(&path) else {
                    tracing::debug!("Ignoring {}: not a result file name", path.display());
                    continue;
                };
                match latest.get(&key) {
                    Some((current, _)) if *current >= ts => {}
                    _ => {
                        latest.insert(key, (ts, path));
                    }
                }
            }
            let mut selected: Vec<PathBuf> = latest.into_values().map(|(_, p)| p).collect();
            selected.sort();
            selected
        }
    }
}
