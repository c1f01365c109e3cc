//! HTTP request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use streamlens_common::COCO_CLASSES;
use streamlens_detection::{delete_cached_model, list_cached_models, StreamDetectionConfig};
use tracing::{error, info};
use uuid::Uuid;

use crate::config_store::ConfigStoreError;
use crate::types::{
    DeleteModelResponse, HealthResponse, InvalidLabelsResponse, ModelsResponse,
    UpdateDetectionResponse,
};
use crate::ApiState;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get the YOLO runtime configuration resolved at startup
pub async fn get_yolo_config(State(state): State<ApiState>) -> Response {
    match &state.yolo {
        Some(config) => Json(config.as_ref().clone()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "YOLO model not initialized".to_string(),
        )
            .into_response(),
    }
}

/// List cached ONNX models, flagging the active one
pub async fn get_cached_models(State(state): State<ApiState>) -> Response {
    let active_model = state.yolo.as_ref().and_then(|c| {
        c.model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(String::from)
    });
    match list_cached_models(&state.models_dir, active_model.as_deref()) {
        Ok(models) => Json(ModelsResponse {
            models,
            active_model,
        })
        .into_response(),
        Err(e) => {
            error!("failed to list models: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list models: {e}"),
            )
                .into_response()
        }
    }
}

/// Delete a cached model; the active model cannot be deleted
pub async fn delete_model(
    State(state): State<ApiState>,
    Path(model_name): Path<String>,
) -> Response {
    let active = state.yolo.as_ref().and_then(|c| {
        c.model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(String::from)
    });
    if active.as_deref() == Some(model_name.as_str()) {
        return (
            StatusCode::CONFLICT,
            format!("Cannot delete active model: {model_name}"),
        )
            .into_response();
    }

    match delete_cached_model(&state.models_dir, &model_name) {
        Ok(freed_bytes) => Json(DeleteModelResponse {
            success: true,
            message: format!("Deleted model {model_name}.onnx"),
            freed_bytes,
        })
        .into_response(),
        Err(streamlens_detection::DetectionError::ModelNotFound(_)) => (
            StatusCode::NOT_FOUND,
            format!("Model not found: {model_name}"),
        )
            .into_response(),
        Err(e) => {
            error!("failed to delete model {model_name}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete model: {e}"),
            )
                .into_response()
        }
    }
}

/// Get a stream's detection configuration
pub async fn get_stream_detection(
    State(state): State<ApiState>,
    Path(stream_id): Path<Uuid>,
) -> Response {
    match state.store.detection_config(stream_id) {
        Ok(config) => Json(config).into_response(),
        Err(ConfigStoreError::UnknownStream(_)) => (
            StatusCode::NOT_FOUND,
            format!("Stream not found: {stream_id}"),
        )
            .into_response(),
        Err(e) => {
            error!("failed to read detection config: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read detection config: {e}"),
            )
                .into_response()
        }
    }
}

/// Update a stream's detection configuration.
///
/// Labels are validated against the COCO class table (422 with the
/// offending subset on failure); the persisted file is updated atomically
/// and a running stream picks the change up at its next frame boundary.
pub async fn update_stream_detection(
    State(state): State<ApiState>,
    Path(stream_id): Path<Uuid>,
    Json(config): Json<StreamDetectionConfig>,
) -> Response {
    match state.store.update_detection(stream_id, &config) {
        Ok(()) => {
            let applied_immediately = state
                .manager
                .update_detection_config(stream_id, config)
                .await;
            info!(
                "detection config updated for stream {stream_id} (live={})",
                applied_immediately
            );
            Json(UpdateDetectionResponse {
                success: true,
                message: format!("Detection config updated for stream {stream_id}"),
                applied_immediately,
            })
            .into_response()
        }
        Err(ConfigStoreError::InvalidLabels(invalid_labels)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(InvalidLabelsResponse {
                message: "Invalid COCO class labels".to_string(),
                invalid_labels,
                valid_labels: COCO_CLASSES.iter().map(|&s| s.to_string()).collect(),
            }),
        )
            .into_response(),
        Err(ConfigStoreError::InvalidConfidence(value)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("min_confidence {value} outside [0, 1]"),
        )
            .into_response(),
        Err(ConfigStoreError::UnknownStream(_)) => (
            StatusCode::NOT_FOUND,
            format!("Stream not found: {stream_id}"),
        )
            .into_response(),
        Err(e) => {
            error!("failed to update detection config: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to update detection config: {e}"),
            )
                .into_response()
        }
    }
}
