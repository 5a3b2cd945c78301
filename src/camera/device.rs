//! Seams between the session controller and a camera implementation.
//!
//! A camera backend provides three layers, mirroring how platform camera
//! stacks hand out resources:
//! - `CameraProvider`: enumerates characteristics and opens devices.
//! - `CameraDevice`: an open device that can create a capture session.
//! - `CaptureSession`: a configured session running a repeating request.
//!
//! Backends never call into the controller directly. Every asynchronous
//! completion goes through `DeviceCallbacks`, which posts a message onto the
//! controller's worker queue.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::frame::Frame;
use crate::geometry::Size;
use crate::viewport::{AffineMatrix, Rotation};

/// Static properties of a camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraCharacteristics {
    /// Clockwise angle the sensor image must be rotated to appear upright.
    pub sensor_orientation: u32,
    /// Sizes the camera can stream to a preview surface.
    pub output_sizes: Vec<Size>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfMode {
    Off,
    ContinuousPicture,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeMode {
    On,
    OnAutoFlash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    Display,
    Analysis,
}

/// A repeating capture configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub size: Size,
    pub rotation: Rotation,
    pub targets: Vec<OutputTarget>,
    pub af_mode: AfMode,
    pub ae_mode: AeMode,
}

impl CaptureRequest {
    /// Preview template: continuous auto-focus, auto-exposure with auto flash.
    pub fn preview(size: Size) -> Self {
        Self {
            template: RequestTemplate::Preview,
            size,
            rotation: Rotation::Rotation0,
            targets: Vec::new(),
            af_mode: AfMode::ContinuousPicture,
            ae_mode: AeMode::OnAutoFlash,
        }
    }

    pub fn with_target(mut self, target: OutputTarget) -> Self {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn targets(&self, target: OutputTarget) -> bool {
        self.targets.contains(&target)
    }
}

/// Live preview output. Implementations must tolerate calls from camera
/// threads.
pub trait DisplaySurface: Send + Sync {
    fn set_buffer_size(&self, _size: Size) {}

    fn set_aspect_ratio(&self, _width: u32, _height: u32) {}

    fn set_transform(&self, _matrix: AffineMatrix) {}

    /// Show a frame. The frame is borrowed; it continues on to analysis.
    fn present(&self, frame: &Frame);
}

/// Bounded hand-off of frames to the analysis callback.
///
/// At most `depth` frames are queued or being analyzed at once. A frame
/// offered while the surface is full is dropped on the spot.
#[derive(Clone)]
pub struct AnalysisSurface {
    tx: Sender<WorkerMessage>,
    in_flight: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
    depth: usize,
    size: Size,
}

impl AnalysisSurface {
    pub(crate) fn new(
        tx: Sender<WorkerMessage>,
        in_flight: Arc<AtomicUsize>,
        dropped: Arc<AtomicU64>,
        depth: usize,
        size: Size,
    ) -> Self {
        Self {
            tx,
            in_flight,
            dropped,
            depth: depth.max(1),
            size,
        }
    }

    /// Frame size this surface expects.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Hand a frame to the analysis callback. Returns false when it was dropped.
    pub fn offer(&self, frame: Frame) -> bool {
        let reserved = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.depth).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("analysis surface full, dropping frame {}", frame.sequence());
            return false;
        }
        if self.tx.send(WorkerMessage::Frame(frame)).is_err() {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The two outputs a preview session streams into.
#[derive(Clone)]
pub struct SessionOutputs {
    pub display: Arc<dyn DisplaySurface>,
    pub analysis: AnalysisSurface,
}

pub trait CameraProvider: Send {
    fn name(&self) -> &'static str;

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics>;

    /// Whether the process is authorized to use `camera_id`.
    fn has_permission(&self, camera_id: &str) -> bool;

    /// Start opening `camera_id`. An `Err` means the request was not issued;
    /// otherwise the outcome arrives through `callbacks`.
    fn open(&mut self, camera_id: &str, callbacks: DeviceCallbacks) -> Result<()>;
}

pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Start configuring a session streaming into `outputs`. The outcome
    /// arrives through `callbacks`.
    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: DeviceCallbacks,
    ) -> Result<()>;

    fn close(&mut self);
}

pub trait CaptureSession: Send {
    /// Start (or replace) the repeating request.
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()>;

    /// Stop streaming. Must not return before the session stops producing
    /// frames.
    fn close(&mut self);
}

// ----------------------------------------------------------------------------
// Worker messages
// ----------------------------------------------------------------------------

pub(crate) enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(String),
    SessionConfigured(Box<dyn CaptureSession>),
    SessionConfigureFailed(String),
}

pub(crate) enum WorkerMessage {
    Device { generation: u64, event: DeviceEvent },
    Frame(Frame),
    Geometry {
        preview: Size,
        rotation: Rotation,
        sensor_orientation: u32,
    },
    Close { reply: Sender<()> },
    Shutdown,
}

/// Completion handle given to camera backends. Cheap to clone and safe to use
/// from any thread.
#[derive(Clone)]
pub struct DeviceCallbacks {
    tx: Sender<WorkerMessage>,
    generation: u64,
}

impl DeviceCallbacks {
    pub(crate) fn new(tx: Sender<WorkerMessage>, generation: u64) -> Self {
        Self { tx, generation }
    }

    fn post(&self, event: DeviceEvent) {
        let message = WorkerMessage::Device {
            generation: self.generation,
            event,
        };
        if self.tx.send(message).is_err() {
            log::debug!("camera worker gone; dropping device callback");
        }
    }

    pub fn opened(&self, device: Box<dyn CameraDevice>) {
        self.post(DeviceEvent::Opened(device));
    }

    pub fn disconnected(&self) {
        self.post(DeviceEvent::Disconnected);
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.post(DeviceEvent::Error(reason.into()));
    }

    pub fn session_configured(&self, session: Box<dyn CaptureSession>) {
        self.post(DeviceEvent::SessionConfigured(session));
    }

    pub fn session_configure_failed(&self, reason: impl Into<String>) {
        self.post(DeviceEvent::SessionConfigureFailed(reason.into()));
    }
}
