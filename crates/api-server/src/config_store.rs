//! Persisted stream configuration
//!
//! The stream list lives in one YAML document with an embedded `detection`
//! object per stream. Updates are read-modify-write under a lock and land
//! on disk through a temp file renamed into place, so concurrent writers
//! never leave a torn file behind.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use streamlens_detection::StreamDetectionConfig;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Configuration persistence errors
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration malformed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("stream not found: {0}")]
    UnknownStream(Uuid),

    #[error("invalid COCO class labels: {0:?}")]
    InvalidLabels(Vec<String>),

    #[error("min_confidence {0} outside [0, 1]")]
    InvalidConfidence(f32),
}

/// Root of the persisted YAML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub streams: Vec<StreamEntry>,
}

/// One persisted stream with its embedded detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub detection: StreamDetectionConfig,
}

/// YAML-backed configuration store with atomic updates
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    /// Create a store over `path`; the file is created on first save
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("configuration store at {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Load the configuration; a missing file reads as empty
    pub fn load(&self) -> Result<ConfigFile, ConfigStoreError> {
        if !self.path.exists() {
            return Ok(ConfigFile::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Detection config of one stream
    pub fn detection_config(
        &self,
        stream_id: Uuid,
    ) -> Result<StreamDetectionConfig, ConfigStoreError> {
        self.load()?
            .streams
            .into_iter()
            .find(|s| s.id == stream_id)
            .map(|s| s.detection)
            .ok_or(ConfigStoreError::UnknownStream(stream_id))
    }

    /// Validate and persist a stream's detection config atomically.
    ///
    /// Either the whole update lands on disk or the file is untouched.
    pub fn update_detection(
        &self,
        stream_id: Uuid,
        config: &StreamDetectionConfig,
    ) -> Result<(), ConfigStoreError> {
        let invalid = config.invalid_labels();
        if !invalid.is_empty() {
            return Err(ConfigStoreError::InvalidLabels(invalid));
        }
        if !(0.0..=1.0).contains(&config.min_confidence) {
            return Err(ConfigStoreError::InvalidConfidence(config.min_confidence));
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        let entry = file
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id)
            .ok_or(ConfigStoreError::UnknownStream(stream_id))?;
        entry.detection = config.clone();
        self.save(&file)?;
        info!("detection config persisted for stream {stream_id}");
        Ok(())
    }

    /// Insert or replace a stream entry
    pub fn upsert_stream(&self, entry: StreamEntry) -> Result<(), ConfigStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.load()?;
        match file.streams.iter_mut().find(|s| s.id == entry.id) {
            Some(existing) => *existing = entry,
            None => file.streams.push(entry),
        }
        self.save(&file)
    }

    /// Write the document to a sibling temp file, then rename into place
    fn save(&self, file: &ConfigFile) -> Result<(), ConfigStoreError> {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_yaml::to_writer(&tmp, file)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!("configuration written to {}", self.path.display());
        Ok(())
    }
}
