use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::{SessionConfig, DEFAULT_ANALYSIS_DEPTH, DEFAULT_OPEN_TIMEOUT};
use crate::classify::{
    BackendKind, InputSpec, ModelAssets, TensorLayout, DEFAULT_LABEL_FILE, DEFAULT_MODEL_FILE,
};
use crate::geometry::Size;
use crate::viewport::{Orientation, Rotation};

const DEFAULT_CAMERA_ID: &str = "stub://0";
const DEFAULT_TARGET_WIDTH: u32 = 640;
const DEFAULT_TARGET_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_VIEW_WIDTH: u32 = 1080;
const DEFAULT_VIEW_HEIGHT: u32 = 1920;
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_INPUT_SIDE: u32 = 224;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    display: Option<DisplayConfigFile>,
    classifier: Option<ClassifierConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    id: Option<String>,
    target_width: Option<u32>,
    target_height: Option<u32>,
    open_timeout_ms: Option<u64>,
    analysis_depth: Option<usize>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<i32>,
    orientation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    backend: Option<String>,
    assets_dir: Option<PathBuf>,
    model: Option<PathBuf>,
    labels: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    layout: Option<String>,
    rotation_override: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraSettings,
    pub display: DisplaySettings,
    pub classifier: ClassifierSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub id: String,
    pub target: Size,
    pub open_timeout: Duration,
    pub analysis_depth: usize,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub view: Size,
    pub rotation: Rotation,
    pub orientation: Orientation,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// Explicit backend; otherwise chosen from the model file extension.
    pub backend: Option<BackendKind>,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub input: InputSpec,
    pub rotation_override: Option<i32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let assets = Path::new(DEFAULT_ASSETS_DIR);
        Self {
            camera: CameraSettings {
                id: DEFAULT_CAMERA_ID.to_string(),
                target: Size::new(DEFAULT_TARGET_WIDTH, DEFAULT_TARGET_HEIGHT),
                open_timeout: DEFAULT_OPEN_TIMEOUT,
                analysis_depth: DEFAULT_ANALYSIS_DEPTH,
                fps: DEFAULT_FPS,
            },
            display: DisplaySettings {
                view: Size::new(DEFAULT_VIEW_WIDTH, DEFAULT_VIEW_HEIGHT),
                rotation: Rotation::Rotation0,
                orientation: Orientation::Portrait,
            },
            classifier: ClassifierSettings {
                backend: None,
                model_path: assets.join(DEFAULT_MODEL_FILE),
                labels_path: assets.join(DEFAULT_LABEL_FILE),
                input: InputSpec {
                    width: DEFAULT_INPUT_SIDE,
                    height: DEFAULT_INPUT_SIDE,
                    layout: TensorLayout::Nhwc,
                },
                rotation_override: None,
            },
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `PREVIEW_CONFIG`, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PREVIEW_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, reading `path` instead of `PREVIEW_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        let camera = file.camera.unwrap_or_default();
        if let Some(id) = camera.id {
            cfg.camera.id = id;
        }
        cfg.camera.target = Size::new(
            camera.target_width.unwrap_or(cfg.camera.target.width),
            camera.target_height.unwrap_or(cfg.camera.target.height),
        );
        if let Some(ms) = camera.open_timeout_ms {
            cfg.camera.open_timeout = Duration::from_millis(ms);
        }
        cfg.camera.analysis_depth = camera.analysis_depth.unwrap_or(cfg.camera.analysis_depth);
        cfg.camera.fps = camera.fps.unwrap_or(cfg.camera.fps);

        let display = file.display.unwrap_or_default();
        cfg.display.view = Size::new(
            display.width.unwrap_or(cfg.display.view.width),
            display.height.unwrap_or(cfg.display.view.height),
        );
        if let Some(degrees) = display.rotation {
            cfg.display.rotation =
                Rotation::from_degrees(degrees).context("invalid display.rotation")?;
        }
        if let Some(orientation) = display.orientation.as_deref() {
            cfg.display.orientation = parse_orientation(orientation)?;
        }

        let classifier = file.classifier.unwrap_or_default();
        let assets_dir = classifier
            .assets_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
        cfg.classifier.model_path = assets_dir.join(
            classifier
                .model
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_FILE)),
        );
        cfg.classifier.labels_path = assets_dir.join(
            classifier
                .labels
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABEL_FILE)),
        );
        if let Some(backend) = classifier.backend.as_deref() {
            cfg.classifier.backend = Some(BackendKind::parse(backend)?);
        }
        cfg.classifier.input.width = classifier
            .input_width
            .unwrap_or(cfg.classifier.input.width);
        cfg.classifier.input.height = classifier
            .input_height
            .unwrap_or(cfg.classifier.input.height);
        if let Some(layout) = classifier.layout.as_deref() {
            cfg.classifier.input.layout = TensorLayout::parse(layout)?;
        }
        cfg.classifier.rotation_override = classifier.rotation_override;

        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(id) = std::env::var("PREVIEW_CAMERA_ID") {
            if !id.trim().is_empty() {
                self.camera.id = id;
            }
        }
        if let Some(width) = env_number::<u32>("PREVIEW_TARGET_WIDTH")? {
            self.camera.target.width = width;
        }
        if let Some(height) = env_number::<u32>("PREVIEW_TARGET_HEIGHT")? {
            self.camera.target.height = height;
        }
        if let Some(ms) = env_number::<u64>("PREVIEW_OPEN_TIMEOUT_MS")? {
            self.camera.open_timeout = Duration::from_millis(ms);
        }
        if let Some(depth) = env_number::<usize>("PREVIEW_ANALYSIS_DEPTH")? {
            self.camera.analysis_depth = depth;
        }
        if let Ok(path) = std::env::var("PREVIEW_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.classifier.model_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("PREVIEW_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.classifier.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("PREVIEW_BACKEND") {
            if !backend.trim().is_empty() {
                self.classifier.backend = Some(BackendKind::parse(&backend)?);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.id.trim().is_empty() {
            return Err(anyhow!("camera.id must not be empty"));
        }
        if self.camera.target.is_empty() {
            return Err(anyhow!(
                "camera target size must be non-zero, got {}",
                self.camera.target
            ));
        }
        if self.camera.open_timeout.is_zero() {
            return Err(anyhow!("camera.open_timeout_ms must be greater than zero"));
        }
        if self.camera.analysis_depth == 0 {
            return Err(anyhow!("camera.analysis_depth must be at least 1"));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera.fps must be greater than zero"));
        }
        if self.display.view.is_empty() {
            return Err(anyhow!(
                "display size must be non-zero, got {}",
                self.display.view
            ));
        }
        if self.classifier.input.is_empty() {
            return Err(anyhow!("classifier input size must be non-zero"));
        }
        if let Some(degrees) = self.classifier.rotation_override {
            Rotation::from_degrees(degrees).context("invalid classifier.rotation_override")?;
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_id: self.camera.id.clone(),
            open_timeout: self.camera.open_timeout,
            analysis_depth: self.camera.analysis_depth,
            view_size: self.display.view,
            orientation: self.display.orientation,
        }
    }

    pub fn model_assets(&self) -> ModelAssets {
        let assets = ModelAssets::new(&self.classifier.model_path, &self.classifier.labels_path)
            .with_input(self.classifier.input);
        match self.classifier.backend {
            Some(backend) => assets.with_backend(backend),
            None => assets,
        }
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_orientation(value: &str) -> Result<Orientation> {
    match value.trim().to_ascii_lowercase().as_str() {
        "portrait" => Ok(Orientation::Portrait),
        "landscape" => Ok(Orientation::Landscape),
        other => Err(anyhow!(
            "display.orientation must be portrait or landscape, got {:?}",
            other
        )),
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be an integer", key)),
        _ => Ok(None),
    }
}
