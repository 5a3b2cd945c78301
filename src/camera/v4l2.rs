//! V4L2 camera backend.
//!
//! Camera ids are device paths such as `/dev/video0`. Frames are captured as
//! planar I420 (`YU12`) into memory-mapped buffers. The capture thread owns
//! the device while streaming and hands it back when stopped.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::device::{
    CameraCharacteristics, CameraDevice, CameraProvider, CaptureRequest, CaptureSession,
    DeviceCallbacks, OutputTarget, SessionOutputs,
};
use crate::frame::{Frame, Plane};
use crate::geometry::Size;

const YU12: &[u8; 4] = b"YU12";

#[derive(Clone, Debug)]
pub struct V4l2Config {
    pub fps: u32,
    pub buffers: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self { fps: 10, buffers: 4 }
    }
}

pub struct V4l2Camera {
    config: V4l2Config,
}

impl V4l2Camera {
    pub fn new(config: V4l2Config) -> Self {
        Self { config }
    }
}

impl CameraProvider for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics> {
        use v4l::framesize::FrameSizeEnum;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(camera_id)
            .with_context(|| format!("open v4l2 device {}", camera_id))?;
        let mut output_sizes = Vec::new();
        match device.enum_framesizes(v4l::FourCC::new(YU12)) {
            Ok(sizes) => {
                for framesize in sizes {
                    match framesize.size {
                        FrameSizeEnum::Discrete(discrete) => {
                            output_sizes.push(Size::new(discrete.width, discrete.height));
                        }
                        FrameSizeEnum::Stepwise(stepwise) => {
                            output_sizes.push(Size::new(stepwise.max_width, stepwise.max_height));
                            output_sizes.push(Size::new(stepwise.min_width, stepwise.min_height));
                        }
                    }
                }
            }
            Err(err) => {
                log::warn!("V4l2Camera: cannot list frame sizes on {}: {}", camera_id, err)
            }
        }
        if output_sizes.is_empty() {
            let format = device.format().context("read v4l2 format")?;
            output_sizes.push(Size::new(format.width, format.height));
        }

        Ok(CameraCharacteristics {
            sensor_orientation: 0,
            output_sizes,
        })
    }

    fn has_permission(&self, camera_id: &str) -> bool {
        match OpenOptions::new().read(true).write(true).open(camera_id) {
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => false,
            // Other failures surface from `open` as device errors.
            Err(_) => true,
        }
    }

    fn open(&mut self, camera_id: &str, callbacks: DeviceCallbacks) -> Result<()> {
        let device = v4l::Device::with_path(camera_id)
            .with_context(|| format!("open v4l2 device {}", camera_id))?;
        log::info!("V4l2Camera: opened {}", camera_id);
        callbacks.opened(Box::new(V4l2Device {
            id: camera_id.to_string(),
            config: self.config.clone(),
            device: Some(device),
        }));
        Ok(())
    }
}

struct V4l2Device {
    id: String,
    config: V4l2Config,
    device: Option<v4l::Device>,
}

impl CameraDevice for V4l2Device {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: DeviceCallbacks,
    ) -> Result<()> {
        use v4l::video::Capture;

        let mut device = self
            .device
            .take()
            .ok_or_else(|| anyhow!("v4l2 device {} already streaming", self.id))?;
        let size = outputs.analysis.size();
        let mut format = device.format().context("read v4l2 format")?;
        format.width = size.width;
        format.height = size.height;
        format.fourcc = v4l::FourCC::new(YU12);

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                self.device = Some(device);
                callbacks.session_configure_failed(format!("set YU12 {}: {}", size, err));
                return Ok(());
            }
        };
        let delivered = Size::new(format.width, format.height);
        if format.fourcc != v4l::FourCC::new(YU12) || delivered != size {
            self.device = Some(device);
            callbacks.session_configure_failed(format!(
                "device delivers {} {}, wanted YU12 {}",
                format.fourcc, delivered, size
            ));
            return Ok(());
        }

        if self.config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("V4l2Camera: failed to set fps on {}: {}", self.id, err);
            }
        }

        callbacks.session_configured(Box::new(V4l2Session {
            id: self.id.clone(),
            buffers: self.config.buffers,
            luma_stride: format.stride as usize,
            outputs,
            callbacks: callbacks.clone(),
            device: Some(device),
            running: Arc::new(AtomicBool::new(false)),
            capture: None,
        }));
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
        log::info!("V4l2Camera: closed {}", self.id);
    }
}

struct V4l2Session {
    id: String,
    buffers: u32,
    luma_stride: usize,
    outputs: SessionOutputs,
    callbacks: DeviceCallbacks,
    device: Option<v4l::Device>,
    running: Arc<AtomicBool>,
    capture: Option<JoinHandle<v4l::Device>>,
}

impl V4l2Session {
    fn stop_capture(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.capture.take() {
            match handle.join() {
                Ok(device) => self.device = Some(device),
                Err(_) => log::warn!("V4l2Camera: capture thread for {} panicked", self.id),
            }
        }
    }
}

impl CaptureSession for V4l2Session {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        self.stop_capture();
        let device = self
            .device
            .take()
            .ok_or_else(|| anyhow!("v4l2 device {} unavailable", self.id))?;

        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        let size = request.size;
        let luma_stride = self.luma_stride.max(size.width as usize);
        let buffers = self.buffers;
        let outputs = self.outputs.clone();
        let callbacks = self.callbacks.clone();
        let to_display = request.targets(OutputTarget::Display);
        let to_analysis = request.targets(OutputTarget::Analysis);

        let handle = thread::Builder::new()
            .name("v4l2-capture".to_string())
            .spawn(move || {
                let capture = CaptureLoop {
                    size,
                    luma_stride,
                    buffers,
                    outputs,
                    to_display,
                    to_analysis,
                };
                if let Err(err) = capture.run(&device, &running) {
                    callbacks.error(format!("{:#}", err));
                }
                device
            })
            .context("spawn v4l2 capture thread")?;
        self.capture = Some(handle);
        log::info!("V4l2Camera: streaming {} from {}", size, self.id);
        Ok(())
    }

    fn close(&mut self) {
        self.stop_capture();
        self.device = None;
    }
}

impl Drop for V4l2Session {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Streaming state moved onto the capture thread.
struct CaptureLoop {
    size: Size,
    luma_stride: usize,
    buffers: u32,
    outputs: SessionOutputs,
    to_display: bool,
    to_analysis: bool,
}

impl CaptureLoop {
    fn run(&self, device: &v4l::Device, running: &AtomicBool) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::io::traits::CaptureStream;

        let mut stream =
            v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, self.buffers)
                .context("create v4l2 buffer stream")?;
        let start = Instant::now();
        let mut sequence = 0u64;
        while running.load(Ordering::Acquire) {
            let (buf, _meta) = stream.next().context("capture v4l2 frame")?;
            sequence += 1;
            let frame = match i420_frame(self.size, self.luma_stride, buf, start, sequence) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("V4l2Camera: dropping frame {}: {:#}", sequence, err);
                    continue;
                }
            };
            if self.to_display {
                self.outputs.display.present(&frame);
            }
            if self.to_analysis {
                self.outputs.analysis.offer(frame);
            }
        }
        Ok(())
    }
}

/// Split a strided YU12 buffer into three planes.
fn i420_frame(
    size: Size,
    luma_stride: usize,
    buf: &[u8],
    start: Instant,
    sequence: u64,
) -> Result<Frame> {
    let chroma_stride = luma_stride.div_ceil(2);
    let luma_len = luma_stride * size.height as usize;
    let chroma_len = chroma_stride * size.height.div_ceil(2) as usize;
    if buf.len() < luma_len + 2 * chroma_len {
        return Err(anyhow!(
            "short YU12 buffer: expected {}, got {}",
            luma_len + 2 * chroma_len,
            buf.len()
        ));
    }
    let planes = vec![
        Plane::new(buf[..luma_len].to_vec(), luma_stride, 1),
        Plane::new(buf[luma_len..luma_len + chroma_len].to_vec(), chroma_stride, 1),
        Plane::new(
            buf[luma_len + chroma_len..luma_len + 2 * chroma_len].to_vec(),
            chroma_stride,
            1,
        ),
    ];
    Ok(Frame::new(size, planes, start.elapsed(), sequence))
}
