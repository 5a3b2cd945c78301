//! Camera acquisition.
//!
//! `CaptureSessionController` drives a `CameraProvider` through the session
//! state machine in `state`, gated by the `Permit` in `permit`. Providers:
//! - `SyntheticCamera` for `stub://` ids (always built).
//! - `V4l2Camera` for device paths (feature `camera-v4l2`).

mod controller;
mod device;
mod display;
pub mod permit;
pub mod state;
mod synthetic;
#[cfg(feature = "camera-v4l2")]
mod v4l2;

pub use controller::{
    CaptureSessionController, FrameListener, SessionConfig, DEFAULT_ANALYSIS_DEPTH,
    DEFAULT_OPEN_TIMEOUT,
};
pub use device::{
    AeMode, AfMode, AnalysisSurface, CameraCharacteristics, CameraDevice, CameraProvider,
    CaptureRequest, CaptureSession, DeviceCallbacks, DisplaySurface, OutputTarget,
    RequestTemplate, SessionOutputs,
};
pub use display::{DisplayState, PreviewDisplay};
pub use permit::{Permit, PermitGuard};
pub use state::{CameraSessionState, SessionEvent};
pub use synthetic::{SyntheticCamera, SyntheticConfig, SyntheticStats, STUB_PREFIX};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::{V4l2Camera, V4l2Config};
