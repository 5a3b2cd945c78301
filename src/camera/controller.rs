//! Camera session controller.
//!
//! The controller is the host-facing half: `open`/`close` run on the caller's
//! thread and gate the device with a single permit. Everything the device
//! reports back (open, disconnect, errors, session configuration, frames) is
//! handled on one dedicated worker thread which alone owns the device, the
//! capture session and the repeating request.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::{
    AnalysisSurface, CameraDevice, CameraProvider, CaptureRequest, CaptureSession,
    DeviceCallbacks, DeviceEvent, DisplaySurface, OutputTarget, SessionOutputs, WorkerMessage,
};
use super::permit::{Permit, PermitGuard};
use super::state::{CameraSessionState, SessionEvent};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::geometry::Size;
use crate::host::HostEvent;
use crate::size::choose_optimal_size;
use crate::viewport::{aspect_for_orientation, compute_transform, Orientation, Rotation};

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_ANALYSIS_DEPTH: usize = 2;

/// Receives frames delivered to the analysis surface, on the worker thread.
pub trait FrameListener: Send {
    /// Called once the preview size is known, before frames for it arrive.
    fn on_session_geometry(&mut self, _preview: Size, _sensor_orientation: u32) {}

    /// Called per frame. The frame is owned; dropping it releases it.
    fn on_frame(&mut self, frame: Frame);
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub camera_id: String,
    pub open_timeout: Duration,
    pub analysis_depth: usize,
    pub view_size: Size,
    pub orientation: Orientation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_id: "stub://0".to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            analysis_depth: DEFAULT_ANALYSIS_DEPTH,
            view_size: Size::new(1080, 1920),
            orientation: Orientation::Portrait,
        }
    }
}

/// Open request waiting for the device to answer. Holds the permit until the
/// worker receives that answer.
struct PendingOpen {
    _permit: PermitGuard,
    generation: u64,
}

#[derive(Clone, Copy, Debug)]
struct ViewGeometry {
    view: Size,
    rotation: Rotation,
    preview: Option<Size>,
}

struct Shared {
    state: Mutex<CameraSessionState>,
    pending_open: Mutex<Option<PendingOpen>>,
    generation: AtomicU64,
    host: Mutex<Sender<HostEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> CameraSessionState {
        *lock(&self.state)
    }

    fn transition(&self, event: SessionEvent) -> Result<CameraSessionState, PipelineError> {
        let next = {
            let mut state = lock(&self.state);
            let next = state.next(event)?;
            if *state != next {
                log::info!("camera session {:?} -> {:?} ({:?})", *state, next, event);
            }
            *state = next;
            next
        };
        self.notify(HostEvent::StateChanged(next));
        Ok(next)
    }

    fn notify(&self, event: HostEvent) {
        if lock(&self.host).send(event).is_err() {
            log::debug!("host receiver gone; dropping event");
        }
    }

    /// Drop the pending open for `generation`, releasing its permit.
    fn release_pending(&self, generation: u64) {
        let mut pending = lock(&self.pending_open);
        if pending.as_ref().map(|p| p.generation) == Some(generation) {
            pending.take();
        }
    }
}

pub struct CaptureSessionController {
    provider: Mutex<Box<dyn CameraProvider>>,
    display: Arc<dyn DisplaySurface>,
    shared: Arc<Shared>,
    permit: Permit,
    tx: Mutex<Sender<WorkerMessage>>,
    config: SessionConfig,
    geometry: Mutex<ViewGeometry>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSessionController {
    /// Spawn the camera worker. The camera stays closed until `open`.
    pub fn start(
        provider: Box<dyn CameraProvider>,
        display: Arc<dyn DisplaySurface>,
        listener: Box<dyn FrameListener>,
        host: Sender<HostEvent>,
        config: SessionConfig,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(CameraSessionState::Closed),
            pending_open: Mutex::new(None),
            generation: AtomicU64::new(0),
            host: Mutex::new(host),
        });

        let worker = CameraWorker {
            rx,
            tx: tx.clone(),
            shared: shared.clone(),
            display: display.clone(),
            listener,
            in_flight: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            analysis_depth: config.analysis_depth,
            preview: None,
            rotation: Rotation::Rotation0,
            device: None,
            session: None,
            request: None,
        };
        let handle = thread::Builder::new()
            .name("camera-worker".to_string())
            .spawn(move || worker.run())
            .context("spawn camera worker thread")?;
        log::info!(
            "camera controller started (provider={}, camera={})",
            provider.name(),
            config.camera_id
        );

        Ok(Self {
            provider: Mutex::new(provider),
            display,
            shared,
            permit: Permit::new(1),
            tx: Mutex::new(tx),
            geometry: Mutex::new(ViewGeometry {
                view: config.view_size,
                rotation: Rotation::Rotation0,
                preview: None,
            }),
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Start opening the camera for a preview close to `resolution`.
    ///
    /// Returns once the open request is issued. The rest of the bring-up is
    /// reported through `HostEvent`s.
    pub fn open(&self, resolution: Size, rotation: Rotation) -> Result<(), PipelineError> {
        let camera_id = self.config.camera_id.as_str();
        let characteristics = lock(&self.provider)
            .characteristics(camera_id)
            .map_err(|err| PipelineError::DeviceError(format!("{:#}", err)))?;
        let preview = choose_optimal_size(
            &characteristics.output_sizes,
            resolution.width,
            resolution.height,
        )
        .ok_or_else(|| {
            PipelineError::ConfigurationFailed(format!(
                "camera {} reports no preview output sizes",
                camera_id
            ))
        })?;
        log::info!(
            "preview size {} for requested {} (sensor orientation {})",
            preview,
            resolution,
            characteristics.sensor_orientation
        );

        let permit = self
            .permit
            .try_acquire_for(self.config.open_timeout)
            .ok_or(PipelineError::Timeout(self.config.open_timeout))?;

        let mut provider = lock(&self.provider);
        if !provider.has_permission(camera_id) {
            log::warn!("camera {} not authorized", camera_id);
            return Err(PipelineError::PermissionDenied(format!(
                "no permission to use camera {}",
                camera_id
            )));
        }
        self.shared.transition(SessionEvent::Open)?;

        // Geometry only changes once this open is accepted.
        let sensor_orientation = characteristics.sensor_orientation;
        if let Err(err) = self.send(WorkerMessage::Geometry {
            preview,
            rotation,
            sensor_orientation,
        }) {
            let _ = self.shared.transition(SessionEvent::OpenFailed);
            return Err(err);
        }
        let aspect = aspect_for_orientation(preview, self.config.orientation);
        self.display.set_aspect_ratio(aspect.width, aspect.height);
        self.display.set_buffer_size(preview);
        self.shared.notify(HostEvent::PreviewSizeChosen {
            size: preview,
            sensor_orientation,
        });
        {
            let mut geometry = lock(&self.geometry);
            geometry.preview = Some(preview);
            geometry.rotation = rotation;
        }
        self.apply_transform();

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.shared.pending_open) = Some(PendingOpen {
            _permit: permit,
            generation,
        });
        let callbacks = DeviceCallbacks::new(self.sender(), generation);
        if let Err(err) = provider.open(camera_id, callbacks) {
            self.shared.release_pending(generation);
            let _ = self.shared.transition(SessionEvent::OpenFailed);
            return Err(PipelineError::DeviceError(format!(
                "open camera {}: {:#}",
                camera_id, err
            )));
        }
        log::info!("camera {} open requested via {}", camera_id, provider.name());
        Ok(())
    }

    /// Tear down the session and device. Waits for any pending open to
    /// resolve first.
    pub fn close(&self) -> Result<(), PipelineError> {
        let _permit = self.permit.acquire();
        if self.shared.state() == CameraSessionState::Closed {
            return Ok(());
        }
        self.shared.transition(SessionEvent::Close)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        let sent = self.send(WorkerMessage::Close { reply: reply_tx });
        if sent.is_ok() {
            // An Err here means the worker exited; it tears down on exit.
            let _ = reply_rx.recv();
        }
        self.shared.transition(SessionEvent::Closed)?;
        log::info!("camera {} closed", self.config.camera_id);
        sent
    }

    /// The view was resized; recompute the preview transform.
    pub fn resize_view(&self, view: Size) {
        lock(&self.geometry).view = view;
        self.apply_transform();
    }

    pub fn set_display_rotation(&self, rotation: Rotation) {
        lock(&self.geometry).rotation = rotation;
        self.apply_transform();
    }

    pub fn state(&self) -> CameraSessionState {
        self.shared.state()
    }

    pub fn permits_available(&self) -> usize {
        self.permit.available()
    }

    pub fn preview_size(&self) -> Option<Size> {
        lock(&self.geometry).preview
    }

    /// Close the camera and join the worker. Idempotent.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let Some(handle) = lock(&self.worker).take() else {
            return Ok(());
        };
        let closed = self.close();
        let _ = self.send(WorkerMessage::Shutdown);
        if handle.join().is_err() {
            log::error!("camera worker panicked");
        }
        closed
    }

    fn apply_transform(&self) {
        let geometry = *lock(&self.geometry);
        let Some(preview) = geometry.preview else {
            return;
        };
        if geometry.view.is_empty() {
            return;
        }
        self.display
            .set_transform(compute_transform(geometry.view, preview, geometry.rotation));
    }

    fn sender(&self) -> Sender<WorkerMessage> {
        lock(&self.tx).clone()
    }

    fn send(&self, message: WorkerMessage) -> Result<(), PipelineError> {
        self.sender()
            .send(message)
            .map_err(|_| PipelineError::DeviceError("camera worker stopped".to_string()))
    }
}

impl Drop for CaptureSessionController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("camera controller stop: {}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

struct CameraWorker {
    rx: Receiver<WorkerMessage>,
    tx: Sender<WorkerMessage>,
    shared: Arc<Shared>,
    display: Arc<dyn DisplaySurface>,
    listener: Box<dyn FrameListener>,
    in_flight: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
    analysis_depth: usize,
    preview: Option<Size>,
    rotation: Rotation,
    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    request: Option<CaptureRequest>,
}

impl CameraWorker {
    fn run(mut self) {
        log::debug!("camera worker running");
        while let Ok(message) = self.rx.recv() {
            match message {
                WorkerMessage::Device { generation, event } => {
                    self.handle_device(generation, event)
                }
                WorkerMessage::Frame(frame) => self.handle_frame(frame),
                WorkerMessage::Geometry {
                    preview,
                    rotation,
                    sensor_orientation,
                } => {
                    self.preview = Some(preview);
                    self.rotation = rotation;
                    self.listener.on_session_geometry(preview, sensor_orientation);
                }
                WorkerMessage::Close { reply } => {
                    self.teardown();
                    let _ = reply.send(());
                }
                WorkerMessage::Shutdown => break,
            }
        }
        self.teardown();
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            log::info!("camera worker exiting ({} frames dropped at analysis)", dropped);
        } else {
            log::debug!("camera worker exiting");
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        if self.shared.state() == CameraSessionState::Previewing {
            self.listener.on_frame(frame);
        } else {
            log::debug!("dropping frame {} outside preview", frame.sequence());
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn handle_device(&mut self, generation: u64, event: DeviceEvent) {
        if generation != self.shared.generation.load(Ordering::Acquire) {
            log::debug!("ignoring callback from stale open {}", generation);
            match event {
                DeviceEvent::Opened(mut device) => device.close(),
                DeviceEvent::SessionConfigured(mut session) => session.close(),
                _ => {}
            }
            return;
        }

        match event {
            DeviceEvent::Opened(mut device) => {
                self.shared.release_pending(generation);
                if self.shared.state() != CameraSessionState::Opening {
                    log::warn!("camera {} opened outside Opening; closing", device.id());
                    device.close();
                    return;
                }
                log::info!("camera {} opened", device.id());
                if self.device.is_some() {
                    log::warn!("replacing a camera device that was never closed");
                    self.teardown();
                }
                self.device = Some(device);
                self.transition(SessionEvent::DeviceOpened);
                self.create_preview_session(generation);
            }
            DeviceEvent::Disconnected => {
                self.shared.release_pending(generation);
                log::warn!("camera disconnected");
                self.teardown();
                self.transition(SessionEvent::Disconnected);
            }
            DeviceEvent::Error(reason) => {
                self.shared.release_pending(generation);
                let state = self.shared.state();
                if matches!(state, CameraSessionState::Closed | CameraSessionState::Closing) {
                    log::debug!("device error after close: {}", reason);
                    self.teardown();
                    return;
                }
                log::error!("camera device error: {}", reason);
                self.teardown();
                self.transition(SessionEvent::Failed);
                self.shared
                    .notify(HostEvent::Fatal(PipelineError::DeviceError(reason)));
            }
            DeviceEvent::SessionConfigured(mut session) => {
                let ready = self.device.is_some()
                    && self.shared.state() == CameraSessionState::Configuring;
                let Some(request) = self.request.clone().filter(|_| ready) else {
                    log::debug!("session configured after device closed; closing it");
                    session.close();
                    return;
                };
                match session.set_repeating_request(&request) {
                    Ok(()) => {
                        self.session = Some(session);
                        self.transition(SessionEvent::SessionConfigured);
                    }
                    Err(err) => {
                        session.close();
                        self.fail_configuration(format!("start repeating request: {:#}", err));
                    }
                }
            }
            DeviceEvent::SessionConfigureFailed(reason) => {
                self.fail_configuration(reason);
            }
        }
    }

    fn create_preview_session(&mut self, generation: u64) {
        let Some(preview) = self.preview else {
            self.fail_configuration("preview size unknown".to_string());
            return;
        };
        let outputs = SessionOutputs {
            display: self.display.clone(),
            analysis: AnalysisSurface::new(
                self.tx.clone(),
                self.in_flight.clone(),
                self.dropped.clone(),
                self.analysis_depth,
                preview,
            ),
        };
        let request = CaptureRequest::preview(preview)
            .with_rotation(self.rotation)
            .with_target(OutputTarget::Display)
            .with_target(OutputTarget::Analysis);
        self.request = Some(request);

        let callbacks = DeviceCallbacks::new(self.tx.clone(), generation);
        let Some(device) = self.device.as_mut() else {
            return;
        };
        if let Err(err) = device.create_capture_session(outputs, callbacks) {
            self.fail_configuration(format!("create capture session: {:#}", err));
        }
    }

    fn fail_configuration(&mut self, reason: String) {
        log::warn!("preview session configuration failed: {}", reason);
        self.teardown();
        self.transition(SessionEvent::Failed);
        self.shared
            .notify(HostEvent::Notice(PipelineError::ConfigurationFailed(reason)));
    }

    fn transition(&self, event: SessionEvent) {
        if let Err(err) = self.shared.transition(event) {
            log::debug!("ignored session event: {}", err);
        }
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut device) = self.device.take() {
            log::info!("closing camera {}", device.id());
            device.close();
        }
        self.request = None;
    }
}
