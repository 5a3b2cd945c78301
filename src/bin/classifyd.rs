//! classifyd - live preview classification daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by PREVIEW_CONFIG, then environment)
//! 2. Initializes the classifier from the model assets
//! 3. Opens the camera and classifies every analysis frame
//! 4. Closes the camera on Ctrl-C or after --seconds

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use preview_classifier::camera::{CameraProvider, STUB_PREFIX};
use preview_classifier::{
    AppConfig, CaptureSessionController, FrameAnalyzer, FrameClassifier, HostEvent,
    PreviewDisplay, SyntheticCamera, SyntheticConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (TOML or JSON).
    #[arg(long, env = "PREVIEW_CONFIG")]
    config: Option<PathBuf>,
    /// Camera id: `stub://...` or a V4L2 device path.
    #[arg(long)]
    camera: Option<String>,
    /// Stop after this many seconds. 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    seconds: u64,
    /// Model file, overriding the configured one.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Label file, overriding the configured one.
    #[arg(long)]
    labels: Option<PathBuf>,
    /// Classify one still image and exit.
    #[cfg(feature = "still-image")]
    #[arg(long)]
    image: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = AppConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        cfg.camera.id = camera;
    }
    if let Some(model) = args.model {
        cfg.classifier.model_path = model;
    }
    if let Some(labels) = args.labels {
        cfg.classifier.labels_path = labels;
    }

    let mut classifier = FrameClassifier::new(cfg.model_assets());
    classifier
        .init()
        .context("classifier initialization failed")?;

    #[cfg(feature = "still-image")]
    if let Some(path) = args.image.as_deref() {
        let bitmap = preview_classifier::still::load_bitmap(path)?;
        let rotation = cfg.classifier.rotation_override.unwrap_or(0);
        let result = classifier.classify(&bitmap, rotation)?;
        log::info!("{}: {}", path.display(), result);
        println!("{}\t{:.4}", result.label(), result.confidence());
        return Ok(());
    }

    let (host_tx, host_rx) = mpsc::channel();
    let mut analyzer = FrameAnalyzer::new(classifier, host_tx.clone());
    if let Some(degrees) = cfg.classifier.rotation_override {
        analyzer = analyzer.with_rotation_override(degrees);
    }
    let stats = analyzer.stats();
    let display = Arc::new(PreviewDisplay::new());

    let controller = CaptureSessionController::start(
        build_provider(&cfg)?,
        display.clone(),
        Box::new(analyzer),
        host_tx,
        cfg.session_config(),
    )?;
    controller.open(cfg.camera.target, cfg.display.rotation)?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let deadline = (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    log::info!("classifyd running on {} (Ctrl-C to stop)", cfg.camera.id);
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let event = match host_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        match event {
            HostEvent::PreviewSizeChosen {
                size,
                sensor_orientation,
            } => {
                log::info!("preview {} (sensor orientation {})", size, sensor_orientation);
            }
            HostEvent::StateChanged(state) => log::info!("camera state {:?}", state),
            HostEvent::Notice(err) => log::warn!("camera notice: {}", err),
            HostEvent::Fatal(err) => {
                log::error!("camera failed: {}", err);
                break;
            }
            HostEvent::Classified {
                result,
                sequence,
                timestamp,
            } => {
                log::info!(
                    "frame {} @ {} ms: {}",
                    sequence,
                    timestamp.as_millis(),
                    result
                );
            }
        }
    }

    log::info!("shutting down camera...");
    controller.stop()?;
    let shown = display.snapshot();
    log::info!(
        "frames presented {}, analyzed {}, failed {}",
        shown.frames_presented,
        stats.analyzed(),
        stats.failed()
    );
    Ok(())
}

fn build_provider(cfg: &AppConfig) -> Result<Box<dyn CameraProvider>> {
    if cfg.camera.id.starts_with(STUB_PREFIX) {
        return Ok(Box::new(SyntheticCamera::new(SyntheticConfig {
            fps: cfg.camera.fps,
            ..SyntheticConfig::default()
        })));
    }
    #[cfg(feature = "camera-v4l2")]
    {
        use preview_classifier::camera::{V4l2Camera, V4l2Config};
        Ok(Box::new(V4l2Camera::new(V4l2Config {
            fps: cfg.camera.fps,
            ..V4l2Config::default()
        })))
    }
    #[cfg(not(feature = "camera-v4l2"))]
    {
        Err(anyhow!(
            "camera {} needs V4L2 support; rebuild with --features camera-v4l2",
            cfg.camera.id
        ))
    }
}
