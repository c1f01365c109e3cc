//! StreamLens binary entry point

use streamlens_api_server::{start_server, ApiState, ConfigStore};
use streamlens_detection::{model_file_path, GpuBackend, OnnxSession, SharedSession, YoloConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamlens=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("STREAMLENS_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config_path =
        std::env::var("STREAMLENS_CONFIG").unwrap_or_else(|_| "config/config.yml".to_string());
    let models_dir =
        std::env::var("STREAMLENS_MODELS_DIR").unwrap_or_else(|_| "models".to_string());
    let model_name =
        std::env::var("STREAMLENS_MODEL").unwrap_or_else(|_| "yolo11n".to_string());
    let image_size: u32 = std::env::var("STREAMLENS_IMAGE_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(640);
    let gpu_backend: GpuBackend = std::env::var("STREAMLENS_GPU_BACKEND")
        .unwrap_or_else(|_| "none".to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    // Session construction fails fast when a GPU backend is requested but
    // unavailable; a missing model only disables detection.
    let model_path = model_file_path(std::path::Path::new(&models_dir), &model_name, image_size);
    let (yolo, session) = if model_path.exists() {
        let session = OnnxSession::open(&model_path, gpu_backend)?;
        let yolo = YoloConfig {
            model_name,
            image_size,
            gpu_backend,
            model_path,
        };
        tracing::info!(
            "model {} ready on backend {}",
            yolo.model_path.display(),
            yolo.gpu_backend
        );
        (Some(yolo), Some(SharedSession::new(Box::new(session))))
    } else {
        tracing::warn!(
            "model artifact {} not found, detection disabled",
            model_path.display()
        );
        (None, None)
    };

    let state = ApiState::new(ConfigStore::new(config_path), models_dir, yolo, session);

    tracing::info!("starting StreamLens");
    start_server(&addr, state).await?;
    Ok(())
}
