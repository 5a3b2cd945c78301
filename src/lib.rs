//! Preview Classifier
//!
//! Live camera preview with on-device classification of every analysis frame.
//!
//! # Architecture
//!
//! 1. **Acquisition**: `camera::CaptureSessionController` opens a camera through a
//!    `CameraProvider`, negotiates the preview size and streams frames to a display
//!    surface and a bounded analysis surface.
//! 2. **Conversion**: `convert` packs multi-plane 4:2:0 frames into NV21 and expands
//!    them to RGBA.
//! 3. **Classification**: `classify::FrameClassifier` crops, resizes, rotates and
//!    normalizes the bitmap, runs the model and picks the top label.
//! 4. **Notification**: results and lifecycle changes reach the host as `HostEvent`s.
//!
//! # Module Structure
//!
//! - `geometry`, `size`, `viewport`: sizes, size negotiation, display transforms
//! - `frame`, `convert`: frame and bitmap buffers, YUV to RGBA
//! - `camera`: session state machine, permit, worker, camera backends
//! - `classify`, `pipeline`: model backends, preprocessing, the analysis callback
//! - `config`, `host`, `error`: daemon configuration, host events, error taxonomy

pub mod camera;
pub mod classify;
pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod host;
pub mod pipeline;
pub mod size;
#[cfg(feature = "still-image")]
pub mod still;
pub mod viewport;

pub use camera::{
    CameraSessionState, CaptureSessionController, FrameListener, PreviewDisplay, SessionConfig,
    SyntheticCamera, SyntheticConfig,
};
pub use classify::{ClassificationResult, FrameClassifier, ModelAssets};
pub use config::AppConfig;
pub use error::PipelineError;
pub use frame::{Bitmap, BitmapFormat, Frame, Plane};
pub use geometry::{Rect, Size};
pub use host::HostEvent;
pub use pipeline::{AnalyzerStats, FrameAnalyzer};
pub use size::choose_optimal_size;
pub use viewport::{AffineMatrix, AutoFitLayout, Orientation, Rotation};
