//! Dataset persistence
//!
//! Datasets are JSON documents written under a dated directory tree:
//!
//! ```text
//! <root>/<name>/<name>_<YYYY_MM_DD>/<name>_<YYYY_MM_DD_HH_MM_SS>_<prefix>.json
//! ```
//!
//! A [`DatasetWriter`] picks its file name on the first save of a run and
//! rewrites the same file on every later save, so the file always holds the
//! most recent aggregate.

use crate::config::{ConfigMap, RunConfig};
use crate::error::{QuarkyError, Result};
use crate::types::{AggregateSnapshot, ChannelData};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Destination for aggregate snapshots
pub trait PersistenceSink: Send {
    /// Persist a snapshot with the configuration it was acquired under
    fn save(&mut self, snapshot: &AggregateSnapshot, config: &RunConfig) -> Result<PathBuf>;
}

/// On-disk dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Experiment name
    pub experiment: String,
    /// Local time of the save
    pub saved_at: DateTime<Local>,
    /// Index of the last incorporated set
    pub set_index: Option<usize>,
    /// Number of sets averaged into `data`
    pub sets_incorporated: usize,
    /// Run configuration
    pub config: ConfigMap,
    /// Channel means
    pub data: BTreeMap<String, ChannelData>,
    /// Sweep axes
    #[serde(default)]
    pub axes: BTreeMap<String, ChannelData>,
}

impl DatasetFile {
    /// Capture a snapshot
    pub fn from_snapshot(
        experiment: impl Into<String>,
        snapshot: &AggregateSnapshot,
        config: &RunConfig,
        saved_at: DateTime<Local>,
    ) -> Self {
        Self {
            experiment: experiment.into(),
            saved_at,
            set_index: snapshot.set_index(),
            sets_incorporated: snapshot.sets_incorporated(),
            config: config.values().clone(),
            data: snapshot.means().clone(),
            axes: snapshot.axes().clone(),
        }
    }

    /// Read a dataset back
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QuarkyError::Storage(format!("Failed to read dataset {:?}: {}", path, e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            QuarkyError::Storage(format!("Failed to parse dataset {:?}: {}", path, e))
        })
    }

    /// Write the dataset, replacing any previous content at `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QuarkyError::Storage(format!("Failed to create dataset directory {:?}: {}", parent, e))
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        // Write next to the target and rename so readers never see half a file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| {
            QuarkyError::Storage(format!("Failed to write dataset {:?}: {}", tmp, e))
        })?;
        std::fs::rename(&tmp, path).map_err(|e| {
            QuarkyError::Storage(format!("Failed to move dataset into {:?}: {}", path, e))
        })
    }

    /// A channel mean or an axis by name
    pub fn get(&self, name: &str) -> Option<&ChannelData> {
        self.data.get(name).or_else(|| self.axes.get(name))
    }
}

/// Path of a dataset saved at `at`
pub fn dataset_path(root: &Path, experiment: &str, prefix: &str, at: &DateTime<Local>) -> PathBuf {
    let day = at.format("%Y_%m_%d");
    let stamp = at.format("%Y_%m_%d_%H_%M_%S");
    root.join(experiment)
        .join(format!("{}_{}", experiment, day))
        .join(format!("{}_{}_{}.json", experiment, stamp, prefix))
}

/// Writes the datasets of one run
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    root: PathBuf,
    experiment: String,
    prefix: String,
    path: Option<PathBuf>,
}

impl DatasetWriter {
    /// Writer for `experiment` under `root`
    pub fn new(root: impl Into<PathBuf>, experiment: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            experiment: experiment.into(),
            prefix: prefix.into(),
            path: None,
        }
    }

    /// File chosen by the first save, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl PersistenceSink for DatasetWriter {
    fn save(&mut self, snapshot: &AggregateSnapshot, config: &RunConfig) -> Result<PathBuf> {
        let now = Local::now();
        let path = match &self.path {
            Some(path) => path.clone(),
            None => {
                let path = dataset_path(&self.root, &self.experiment, &self.prefix, &now);
                self.path = Some(path.clone());
                path
            }
        };
        DatasetFile::from_snapshot(self.experiment.clone(), snapshot, config, now).save(&path)?;
        tracing::debug!(
            "Saved {} sets of '{}' to {:?}",
            snapshot.sets_incorporated(),
            self.experiment,
            path
        );
        Ok(path)
    }
}
