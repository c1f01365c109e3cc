//! ONNX model cache directory surface
//!
//! Model artifacts live as `<models_dir>/<model_name>_<size>.onnx`. The
//! cache can be listed (with the active model flagged) and entries deleted.

use crate::DetectionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::info;

/// Metadata for one cached ONNX artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedModel {
    pub model_name: String,
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Creation time as seconds since the Unix epoch, when available
    pub created: Option<u64>,
    pub is_active: bool,
}

/// Cache path for a model exported at the given square input size
#[must_use]
pub fn model_file_path(models_dir: &Path, model_name: &str, image_size: u32) -> PathBuf {
    models_dir.join(format!("{model_name}_{image_size}.onnx"))
}

/// Scan the cache directory for `.onnx` artifacts.
///
/// `active_model` is the stem of the model currently loaded, if any; its
/// entry is flagged `is_active`.
pub fn list_cached_models(
    models_dir: &Path,
    active_model: Option<&str>,
) -> Result<Vec<CachedModel>, DetectionError> {
    let mut models = Vec::new();
    if !models_dir.exists() {
        return Ok(models);
    }

    for entry in std::fs::read_dir(models_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let metadata = entry.metadata()?;
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        models.push(CachedModel {
            model_name: stem.to_string(),
            file_path: path.clone(),
            file_size_bytes: metadata.len(),
            created,
            is_active: active_model == Some(stem),
        });
    }
    models.sort_by(|a, b| a.model_name.cmp(&b.model_name));
    Ok(models)
}

/// Delete a cached model by name (without extension).
///
/// Returns the number of bytes freed. The caller is responsible for
/// refusing deletion of the active model.
pub fn delete_cached_model(models_dir: &Path, model_name: &str) -> Result<u64, DetectionError> {
    let path = models_dir.join(format!("{model_name}.onnx"));
    if !path.exists() {
        return Err(DetectionError::ModelNotFound(path));
    }
    let size = std::fs::metadata(&path)?.len();
    std::fs::remove_file(&path)?;
    info!("deleted cached model {} ({} bytes)", path.display(), size);
    Ok(size)
}
