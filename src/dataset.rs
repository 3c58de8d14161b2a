//! NAB-style dataset loading.
//!
//! A NAB checkout looks like:
//!
//! ```text
//! <root>/data/realAWSCloudwatch/rds_cpu_utilization_e47b3b.csv   timestamp,value
//! <root>/labels/combined_labels.json                              {"<file>": ["<timestamp>", ...]}
//! ```
//!
//! Labels are matched against data rows by parsed timestamp, so
//! `2014-04-10 07:15:00` and `2014-04-10 07:15:00.000000` denote the same
//! instant. Timestamps without an offset are taken as UTC.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directory holding the CSV series, relative to the dataset root.
pub const DATA_DIR: &str = "data";

/// Label file, relative to the dataset root.
pub const LABELS_FILE: &str = "labels/combined_labels.json";

/// Default reference series (anomalies are removed before training).
pub const DEFAULT_TRAINING_FILE: &str = "realAWSCloudwatch/rds_cpu_utilization_e47b3b.csv";

/// Default test series.
pub const DEFAULT_TEST_FILE: &str = "realAWSCloudwatch/rds_cpu_utilization_cc0c53.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid label file {path}: {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot parse timestamp '{0}'")]
    Timestamp(String),

    #[error("no labels listed for series '{0}'")]
    MissingLabels(String),

    #[error("{0}: no data rows")]
    Empty(PathBuf),

    #[error("series '{0}' has no normal values")]
    NoNormalValues(String),
}

/// One row of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub is_anomaly: bool,
}

/// An ordered, labelled time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(name: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Load a `timestamp,value` CSV and mark rows whose timestamp is in `anomalies`.
    pub fn load_csv(
        path: &Path,
        name: impl Into<String>,
        anomalies: &HashSet<NaiveDateTime>,
    ) -> Result<Self, DatasetError> {
        let contents = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let series = Self::parse_csv(&contents, path, name, anomalies)?;
        info!(
            path = %path.display(),
            points = series.len(),
            anomalies = series.anomaly_count(),
            "Loaded series"
        );
        Ok(series)
    }

    fn parse_csv(
        contents: &str,
        path: &Path,
        name: impl Into<String>,
        anomalies: &HashSet<NaiveDateTime>,
    ) -> Result<Self, DatasetError> {
        let parse_err = |line: usize, message: String| DatasetError::Parse {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut lines = contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let Some((_, header)) = lines.next() else {
            return Err(DatasetError::Empty(path.to_path_buf()));
        };
        let (ts_col, value_col) = header_columns(header);

        let mut points = Vec::new();
        for (idx, line) in lines {
            let line_no = idx + 1;
            let fields = csv_split(line);
            let ts_raw = fields
                .get(ts_col)
                .ok_or_else(|| parse_err(line_no, "missing timestamp column".to_string()))?;
            let value_raw = fields
                .get(value_col)
                .ok_or_else(|| parse_err(line_no, "missing value column".to_string()))?;

            let timestamp = parse_timestamp(ts_raw).map_err(|e| parse_err(line_no, e.to_string()))?;
            let value: f64 = value_raw
                .trim()
                .parse()
                .map_err(|_| parse_err(line_no, format!("invalid value '{}'", value_raw.trim())))?;
            if !value.is_finite() {
                return Err(parse_err(line_no, format!("non-finite value '{}'", value_raw.trim())));
            }

            points.push(SeriesPoint {
                timestamp,
                value,
                is_anomaly: anomalies.contains(&timestamp),
            });
        }

        if points.is_empty() {
            return Err(DatasetError::Empty(path.to_path_buf()));
        }

        let series = Self::new(name, points);
        let matched = series.anomaly_count();
        if matched < anomalies.len() {
            warn!(
                series = %series.name,
                labelled = anomalies.len(),
                matched,
                "Some labelled timestamps do not occur in the series"
            );
        }
        Ok(series)
    }

    /// Write as a NAB `timestamp,value` CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        let io_err = |source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = String::from("timestamp,value\n");
        for p in &self.points {
            out.push_str(&format!("{},{}\n", p.timestamp.format(TIMESTAMP_FORMAT), p.value));
        }
        fs::File::create(path)
            .and_then(|mut f| f.write_all(out.as_bytes()))
            .map_err(io_err)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Ground truth as 0/1 labels.
    pub fn labels(&self) -> Vec<u8> {
        self.points.iter().map(|p| u8::from(p.is_anomaly)).collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_anomaly).count()
    }

    pub fn anomaly_timestamps(&self) -> Vec<NaiveDateTime> {
        self.points
            .iter()
            .filter(|p| p.is_anomaly)
            .map(|p| p.timestamp)
            .collect()
    }

    /// Values with each anomaly replaced by the previous normal value.
    ///
    /// Anomalies before the first normal value take that first normal value.
    pub fn values_without_anomalies(&self) -> Result<Vec<f64>, DatasetError> {
        let first_normal = self
            .points
            .iter()
            .find(|p| !p.is_anomaly)
            .map(|p| p.value)
            .ok_or_else(|| DatasetError::NoNormalValues(self.name.clone()))?;

        let mut last = first_normal;
        Ok(self
            .points
            .iter()
            .map(|p| {
                if !p.is_anomaly {
                    last = p.value;
                }
                last
            })
            .collect())
    }
}

/// `combined_labels.json`: series file name to anomalous timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NabLabels(pub HashMap<String, Vec<String>>);

impl NabLabels {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let contents = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| DatasetError::Labels {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| DatasetError::Labels {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| DatasetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn insert(&mut self, series: &str, timestamps: &[NaiveDateTime]) {
        self.0.insert(
            series.to_string(),
            timestamps
                .iter()
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .collect(),
        );
    }

    /// Parsed anomaly timestamps of one series.
    pub fn anomalies_for(&self, series: &str) -> Result<HashSet<NaiveDateTime>, DatasetError> {
        self.0
            .get(series)
            .ok_or_else(|| DatasetError::MissingLabels(series.to_string()))?
            .iter()
            .map(|s| parse_timestamp(s))
            .collect()
    }
}

/// A NAB checkout on disk.
#[derive(Debug, Clone)]
pub struct NabDataset {
    root: PathBuf,
    labels: NabLabels,
}

impl NabDataset {
    /// Open `root`, reading its label file.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let root = root.into();
        let labels = NabLabels::load(&root.join(LABELS_FILE))?;
        debug!(root = %root.display(), series = labels.0.len(), "Opened NAB dataset");
        Ok(Self { root, labels })
    }

    /// Dataset rooted at `root` with labels loaded from elsewhere.
    pub fn with_labels(root: impl Into<PathBuf>, labels: NabLabels) -> Self {
        Self {
            root: root.into(),
            labels,
        }
    }

    /// Load one labelled series by its name relative to `data/`.
    pub fn load_series(&self, name: &str) -> Result<Series, DatasetError> {
        let anomalies = self.labels.anomalies_for(name)?;
        Series::load_csv(&self.root.join(DATA_DIR).join(name), name, &anomalies)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn labels(&self) -> &NabLabels {
        &self.labels
    }
}

/// Parse the timestamp forms NAB and its derivatives use.
///
/// Offset-aware forms are normalised to UTC.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DatasetError> {
    let s = s.trim().trim_matches('"');

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.naive_utc());
    }

    for fmt in &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }

    Err(DatasetError::Timestamp(s.to_string()))
}

/// Column indices of `timestamp` and `value`, defaulting to 0 and 1.
fn header_columns(header: &str) -> (usize, usize) {
    let cols = csv_split(header);
    let find = |name: &str| cols.iter().position(|c| c.trim().eq_ignore_ascii_case(name));
    (find("timestamp").unwrap_or(0), find("value").unwrap_or(1))
}

/// Split a CSV line, honouring double quotes and `""` escapes.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
