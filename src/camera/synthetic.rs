//! Synthetic camera for `stub://` identifiers.
//!
//! Produces 4:2:0 frames with interleaved chroma (pixel stride 2), the same
//! layout phone sensors commonly deliver. The scene is a solid color that
//! advances through `scene` every `scene_frames` frames, optionally with
//! seeded luma noise. Failure knobs let tests drive every controller path.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::device::{
    CameraCharacteristics, CameraDevice, CameraProvider, CaptureRequest, CaptureSession,
    DeviceCallbacks, OutputTarget, SessionOutputs,
};
use crate::convert::rgb_to_yuv;
use crate::frame::Frame;
use crate::geometry::Size;

pub const STUB_PREFIX: &str = "stub://";

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub sensor_orientation: u32,
    pub output_sizes: Vec<Size>,
    pub fps: u32,
    /// RGB colors the scene cycles through.
    pub scene: Vec<[u8; 3]>,
    pub scene_frames: u64,
    /// Maximum luma deviation added per pixel. 0 disables noise.
    pub noise: u8,
    pub seed: u64,
    pub permission_granted: bool,
    /// Delay between the open request and the `opened` callback.
    pub open_delay: Duration,
    pub fail_open: bool,
    pub fail_configure: bool,
    /// Report a device error after this many frames.
    pub error_after_frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sensor_orientation: 90,
            output_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1280, 720),
                Size::new(640, 480),
                Size::new(320, 240),
            ],
            fps: 10,
            scene: vec![[220, 40, 40], [40, 200, 60], [40, 60, 220]],
            scene_frames: 50,
            noise: 0,
            seed: 7,
            permission_granted: true,
            open_delay: Duration::ZERO,
            fail_open: false,
            fail_configure: false,
            error_after_frames: None,
        }
    }
}

/// Counters shared by a `SyntheticCamera` and everything it spawned.
#[derive(Debug, Default)]
pub struct SyntheticStats {
    opens: AtomicU64,
    frames: AtomicU64,
    active_sessions: AtomicU64,
    open_devices: AtomicU64,
    last_request: Mutex<Option<CaptureRequest>>,
}

impl SyntheticStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Devices handed out by `open` and not yet closed.
    pub fn open_devices(&self) -> u64 {
        self.open_devices.load(Ordering::Acquire)
    }

    /// The most recent repeating request any session started.
    pub fn last_request(&self) -> Option<CaptureRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    stats: Arc<SyntheticStats>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            stats: Arc::new(SyntheticStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SyntheticStats> {
        self.stats.clone()
    }

    fn check_id(camera_id: &str) -> Result<()> {
        if camera_id.starts_with(STUB_PREFIX) {
            Ok(())
        } else {
            Err(anyhow!("{} is not a synthetic camera id", camera_id))
        }
    }
}

impl CameraProvider for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics> {
        Self::check_id(camera_id)?;
        Ok(CameraCharacteristics {
            sensor_orientation: self.config.sensor_orientation,
            output_sizes: self.config.output_sizes.clone(),
        })
    }

    fn has_permission(&self, _camera_id: &str) -> bool {
        self.config.permission_granted
    }

    fn open(&mut self, camera_id: &str, callbacks: DeviceCallbacks) -> Result<()> {
        Self::check_id(camera_id)?;
        if self.config.fail_open {
            return Err(anyhow!("synthetic camera {} refused to open", camera_id));
        }
        self.stats.opens.fetch_add(1, Ordering::Relaxed);

        let device = SyntheticDevice {
            id: camera_id.to_string(),
            config: self.config.clone(),
            stats: self.stats.clone(),
            closed: false,
        };
        self.stats.open_devices.fetch_add(1, Ordering::AcqRel);
        let delay = self.config.open_delay;
        thread::Builder::new()
            .name("synthetic-open".to_string())
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                callbacks.opened(Box::new(device));
            })
            .context("spawn synthetic open thread")?;
        log::info!("SyntheticCamera: opening {}", camera_id);
        Ok(())
    }
}

struct SyntheticDevice {
    id: String,
    config: SyntheticConfig,
    stats: Arc<SyntheticStats>,
    closed: bool,
}

impl CameraDevice for SyntheticDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: SessionOutputs,
        callbacks: DeviceCallbacks,
    ) -> Result<()> {
        if self.config.fail_configure {
            callbacks.session_configure_failed(format!(
                "synthetic camera {} rejected the session",
                self.id
            ));
            return Ok(());
        }
        let session = SyntheticSession {
            config: self.config.clone(),
            stats: self.stats.clone(),
            outputs,
            callbacks: callbacks.clone(),
            running: Arc::new(AtomicBool::new(false)),
            sensor: None,
        };
        callbacks.session_configured(Box::new(session));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.open_devices.fetch_sub(1, Ordering::AcqRel);
            log::debug!("SyntheticCamera: device {} closed", self.id);
        }
    }
}

struct SyntheticSession {
    config: SyntheticConfig,
    stats: Arc<SyntheticStats>,
    outputs: SessionOutputs,
    callbacks: DeviceCallbacks,
    running: Arc<AtomicBool>,
    sensor: Option<JoinHandle<()>>,
}

impl SyntheticSession {
    fn stop_sensor(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.sensor.take() {
            if handle.join().is_err() {
                log::warn!("SyntheticCamera: sensor thread panicked");
            }
            self.stats.active_sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl CaptureSession for SyntheticSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<()> {
        self.stop_sensor();
        *self
            .stats
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        let mut sensor = SyntheticSensor::new(&self.config, request.size);
        let outputs = self.outputs.clone();
        let callbacks = self.callbacks.clone();
        let stats = self.stats.clone();
        let to_display = request.targets(OutputTarget::Display);
        let to_analysis = request.targets(OutputTarget::Analysis);
        let interval = Duration::from_millis(1000 / u64::from(self.config.fps.max(1)));
        let error_after = self.config.error_after_frames;

        let handle = thread::Builder::new()
            .name("synthetic-sensor".to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    let frame = match sensor.next_frame() {
                        Ok(frame) => frame,
                        Err(err) => {
                            callbacks.error(format!("synthetic sensor: {:#}", err));
                            break;
                        }
                    };
                    stats.frames.fetch_add(1, Ordering::Relaxed);
                    let sequence = frame.sequence();
                    if to_display {
                        outputs.display.present(&frame);
                    }
                    if to_analysis {
                        outputs.analysis.offer(frame);
                    }
                    if error_after.is_some_and(|limit| sequence >= limit) {
                        callbacks.error("synthetic camera fault injected");
                        break;
                    }
                    thread::sleep(interval);
                }
            })
            .context("spawn synthetic sensor thread")?;
        self.sensor = Some(handle);
        self.stats.active_sessions.fetch_add(1, Ordering::AcqRel);
        log::info!(
            "SyntheticCamera: streaming {} at {} fps",
            request.size,
            self.config.fps
        );
        Ok(())
    }

    fn close(&mut self) {
        self.stop_sensor();
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.stop_sensor();
    }
}

/// Frame generator. Owned by the sensor thread.
struct SyntheticSensor {
    size: Size,
    scene: Vec<[u8; 3]>,
    scene_frames: u64,
    noise: u8,
    rng: StdRng,
    start: Instant,
    frame_count: u64,
    buffer: Vec<u8>,
}

impl SyntheticSensor {
    fn new(config: &SyntheticConfig, size: Size) -> Self {
        let scene = if config.scene.is_empty() {
            vec![[128, 128, 128]]
        } else {
            config.scene.clone()
        };
        Self {
            size,
            scene,
            scene_frames: config.scene_frames.max(1),
            noise: config.noise,
            rng: StdRng::seed_from_u64(config.seed),
            start: Instant::now(),
            frame_count: 0,
            buffer: Vec::new(),
        }
    }

    fn scene_color(&self) -> [u8; 3] {
        let index = (self.frame_count / self.scene_frames) as usize % self.scene.len();
        self.scene[index]
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let [r, g, b] = self.scene_color();
        let (y, u, v) = rgb_to_yuv(r, g, b);

        let luma_len = self.size.width as usize * self.size.height as usize;
        let chroma_len =
            2 * self.size.width.div_ceil(2) as usize * self.size.height.div_ceil(2) as usize;
        self.buffer.clear();
        self.buffer.resize(luma_len, y);
        if self.noise > 0 {
            let spread = i16::from(self.noise);
            for sample in &mut self.buffer {
                let delta = self.rng.gen_range(-spread..=spread);
                *sample = (i16::from(*sample) + delta).clamp(0, 255) as u8;
            }
        }
        // NV21 chroma: V then U.
        for _ in 0..chroma_len / 2 {
            self.buffer.extend_from_slice(&[v, u]);
        }

        self.frame_count += 1;
        Frame::from_nv21(
            self.size,
            &self.buffer,
            self.start.elapsed(),
            self.frame_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert;

    #[test]
    fn sensor_frames_decode_to_scene_color() -> Result<()> {
        let config = SyntheticConfig {
            scene: vec![[200, 30, 30], [30, 30, 200]],
            scene_frames: 2,
            ..SyntheticConfig::default()
        };
        let mut sensor = SyntheticSensor::new(&config, Size::new(8, 6));

        let first = convert(&sensor.next_frame()?)?;
        let px = first.pixel(3, 3);
        assert!((px[0] as i32 - 200).abs() <= 2, "red channel {}", px[0]);
        assert!((px[2] as i32 - 30).abs() <= 2, "blue channel {}", px[2]);

        sensor.next_frame()?;
        let third = sensor.next_frame()?;
        assert_eq!(third.sequence(), 3);
        let px = convert(&third)?.pixel(0, 0);
        assert!((px[2] as i32 - 200).abs() <= 2, "blue channel {}", px[2]);
        Ok(())
    }

    #[test]
    fn noise_is_seeded() -> Result<()> {
        let config = SyntheticConfig {
            noise: 20,
            ..SyntheticConfig::default()
        };
        let mut a = SyntheticSensor::new(&config, Size::new(4, 4));
        let mut b = SyntheticSensor::new(&config, Size::new(4, 4));
        let fa = a.next_frame()?;
        let fb = b.next_frame()?;
        assert_eq!(fa.planes()[0].data(), fb.planes()[0].data());
        Ok(())
    }

    #[test]
    fn rejects_foreign_ids() {
        let camera = SyntheticCamera::new(SyntheticConfig::default());
        assert!(camera.characteristics("/dev/video0").is_err());
        assert!(camera.characteristics("stub://front").is_ok());
    }
}
