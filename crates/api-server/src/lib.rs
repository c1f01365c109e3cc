//! REST surface for StreamLens
//!
//! Exposes per-stream detection configuration, the model cache, and the
//! YOLO runtime configuration. Stream analytics tasks are owned by the
//! [`streamlens_stream::StreamManager`] held in the shared state; an
//! embedder attaches frame sources with [`ApiState::launch_stream`].

mod config_store;
mod handlers;
mod types;

pub use config_store::{ConfigFile, ConfigStore, ConfigStoreError, StreamEntry};
pub use handlers::*;
pub use types::*;

use axum::{
    routing::{delete, get},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use streamlens_detection::{Detector, SharedSession, YoloConfig};
use streamlens_stream::{FrameOutput, FrameSource, StreamManager, StreamSpec};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared state behind every handler
#[derive(Clone)]
pub struct ApiState {
    /// Registry of running stream tasks
    pub manager: Arc<StreamManager>,
    /// Persisted stream configuration
    pub store: Arc<ConfigStore>,
    /// ONNX model cache directory
    pub models_dir: PathBuf,
    /// Runtime model configuration; `None` until a model is initialized
    pub yolo: Option<Arc<YoloConfig>>,
    /// Process-wide inference session shared by all streams
    session: Option<SharedSession>,
}

impl ApiState {
    /// Create the state over a config store and model cache directory
    #[must_use]
    pub fn new(
        store: ConfigStore,
        models_dir: impl Into<PathBuf>,
        yolo: Option<YoloConfig>,
        session: Option<SharedSession>,
    ) -> Self {
        Self {
            manager: Arc::new(StreamManager::new()),
            store: Arc::new(store),
            models_dir: models_dir.into(),
            yolo: yolo.map(Arc::new),
            session,
        }
    }

    /// Start the analytics task for a persisted stream, pulling frames
    /// from `source` and emitting rendered frames into `output`.
    pub async fn launch_stream(
        &self,
        stream_id: Uuid,
        source: Box<dyn FrameSource>,
        output: mpsc::Sender<FrameOutput>,
    ) -> anyhow::Result<()> {
        let detection = self.store.detection_config(stream_id)?;
        let session = self
            .session
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no inference session initialized"))?;
        let image_size = self
            .yolo
            .as_ref()
            .map_or(640, |c| c.image_size);

        let detector = Detector::new(Box::new(session), image_size);
        self.manager
            .start_stream(StreamSpec::new(stream_id, detection), detector, source, output)
            .await?;
        Ok(())
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/yolo/config", get(get_yolo_config))
        .route("/api/models", get(get_cached_models))
        .route("/api/models/{model_name}", delete(delete_model))
        .route(
            "/api/streams/{stream_id}/detection",
            get(get_stream_detection).put(update_stream_detection),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("starting API server on {}", addr);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
