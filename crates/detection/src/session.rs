//! ONNX Runtime session construction with fail-fast GPU validation
//!
//! The session factory resolves the requested hardware backend up front:
//! when a GPU backend is requested its execution provider is registered
//! with `error_on_failure`, so a host without that provider fails session
//! construction instead of silently running on CPU.

use crate::DetectionError;
use ndarray::{Array3, ArrayView4};
use ort::execution_providers::{CPU, CUDA, OpenVINO, ROCm};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Requested inference hardware backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    Nvidia,
    Amd,
    Intel,
    /// CPU only
    None,
}

impl GpuBackend {
    /// Whether this backend requires a GPU execution provider
    #[must_use]
    pub fn requires_gpu(&self) -> bool {
        !matches!(self, GpuBackend::None)
    }
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuBackend::Nvidia => "nvidia",
            GpuBackend::Amd => "amd",
            GpuBackend::Intel => "intel",
            GpuBackend::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for GpuBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nvidia" => Ok(GpuBackend::Nvidia),
            "amd" => Ok(GpuBackend::Amd),
            "intel" => Ok(GpuBackend::Intel),
            "none" | "cpu" => Ok(GpuBackend::None),
            other => Err(format!("unknown GPU backend: {other}")),
        }
    }
}

/// Resolved YOLO runtime configuration, fixed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloConfig {
    /// Model variant, e.g. "yolo11n"
    pub model_name: String,
    /// Square input size the model was exported with
    pub image_size: u32,
    /// Hardware backend the session was built for
    pub gpu_backend: GpuBackend,
    /// Path of the ONNX artifact in the model cache
    pub model_path: PathBuf,
}

/// Opaque neural inference handle: one float tensor in, one out.
///
/// Implemented by the ONNX session; tests substitute a canned backend.
pub trait InferenceBackend: Send {
    /// Run the model on a `(1, 3, S, S)` input, returning the raw
    /// `(1, 4+C, N)` output
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>, DetectionError>;
}

/// ONNX Runtime-backed inference session
pub struct OnnxSession {
    session: Session,
}

impl OnnxSession {
    /// Build a session for `model_path` on the requested backend.
    ///
    /// Fails with [`DetectionError::GpuBackendUnavailable`] when a GPU
    /// backend was requested but its execution provider cannot be
    /// registered on this host.
    pub fn open(model_path: &Path, backend: GpuBackend) -> Result<Self, DetectionError> {
        if !model_path.exists() {
            return Err(DetectionError::ModelNotFound(model_path.to_path_buf()));
        }
        info!(
            "creating inference session: model={}, backend={}",
            model_path.display(),
            backend
        );

        let builder = Session::builder()
            .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
            .and_then(|b| Ok(b.with_intra_threads(num_cpus::get_physical())?))
            .and_then(|b| Ok(b.with_memory_pattern(true)?))
            .map_err(|e| DetectionError::SessionBuild(e.to_string()))?;

        // The requested GPU provider is registered with error_on_failure so
        // an unavailable backend fails construction instead of silently
        // running on the CPU fallback.
        let mut builder = match backend {
            GpuBackend::Nvidia => builder.with_execution_providers([
                CUDA::default().build().error_on_failure(),
                CPU::default().build(),
            ]),
            GpuBackend::Amd => builder.with_execution_providers([
                ROCm::default().build().error_on_failure(),
                CPU::default().build(),
            ]),
            GpuBackend::Intel => builder.with_execution_providers([
                OpenVINO::default().build().error_on_failure(),
                CPU::default().build(),
            ]),
            GpuBackend::None => builder
                .with_execution_providers([CPU::default().build()]),
        }
        .map_err(|e| match backend {
            GpuBackend::None => DetectionError::SessionBuild(e.to_string()),
            _ => DetectionError::GpuBackendUnavailable {
                backend,
                message: e.to_string(),
            },
        })?;

        let session = builder.commit_from_file(model_path).map_err(|e| match backend {
            GpuBackend::None => DetectionError::SessionBuild(e.to_string()),
            _ => DetectionError::GpuBackendUnavailable {
                backend,
                message: e.to_string(),
            },
        })?;

        info!("inference session ready: backend={}", backend);
        Ok(Self { session })
    }
}

impl InferenceBackend for OnnxSession {
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>, DetectionError> {
        // Zero-copy input: a view over the caller's tensor
        let tensor = TensorRef::from_array_view(input)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let dims = shape.as_ref();
        if dims.len() != 3 {
            return Err(DetectionError::BadOutputShape(format!(
                "expected 3D output tensor, got {}D",
                dims.len()
            )));
        }
        Array3::from_shape_vec(
            (dims[0] as usize, dims[1] as usize, dims[2] as usize),
            data.to_vec(),
        )
        .map_err(|e| DetectionError::BadOutputShape(e.to_string()))
    }
}

/// Process-wide inference handle shared between streams.
///
/// The underlying session runs one inference at a time behind a mutex;
/// clones share the same session.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Box<dyn InferenceBackend>>>,
}

impl SharedSession {
    /// Share `backend` across streams
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(backend)),
        }
    }
}

impl InferenceBackend for SharedSession {
    fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<Array3<f32>, DetectionError> {
        let mut backend = self
            .inner
            .lock()
            .map_err(|e| DetectionError::Inference(format!("session lock poisoned: {e}")))?;
        backend.run(input)
    }
}
