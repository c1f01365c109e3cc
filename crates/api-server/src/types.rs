//! API request and response types

use serde::{Deserialize, Serialize};
use streamlens_detection::CachedModel;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Model cache listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<CachedModel>,
    pub active_model: Option<String>,
}

/// Successful model deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteModelResponse {
    pub success: bool,
    pub message: String,
    pub freed_bytes: u64,
}

/// Successful detection config update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetectionResponse {
    pub success: bool,
    pub message: String,
    /// Whether a running stream picked the change up live
    pub applied_immediately: bool,
}

/// 422 body for label validation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidLabelsResponse {
    pub message: String,
    pub invalid_labels: Vec<String>,
    pub valid_labels: Vec<String>,
}
