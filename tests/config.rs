use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use preview_classifier::classify::{BackendKind, TensorLayout};
use preview_classifier::{AppConfig, Orientation, Rotation, Size};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PREVIEW_CONFIG",
        "PREVIEW_CAMERA_ID",
        "PREVIEW_TARGET_WIDTH",
        "PREVIEW_TARGET_HEIGHT",
        "PREVIEW_OPEN_TIMEOUT_MS",
        "PREVIEW_ANALYSIS_DEPTH",
        "PREVIEW_MODEL_PATH",
        "PREVIEW_LABELS_PATH",
        "PREVIEW_BACKEND",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AppConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.id, "stub://0");
    assert_eq!(cfg.camera.target, Size::new(640, 480));
    assert_eq!(cfg.camera.open_timeout, Duration::from_millis(2500));
    assert_eq!(cfg.camera.analysis_depth, 2);
    assert_eq!(cfg.display.view, Size::new(1080, 1920));
    assert_eq!(cfg.display.orientation, Orientation::Portrait);
    assert_eq!(cfg.classifier.input.size(), Size::new(224, 224));
    assert_eq!(
        cfg.classifier.model_path,
        PathBuf::from("assets/mobilenet_imagenet_model.onnx")
    );
    assert_eq!(cfg.model_assets().backend, BackendKind::Tract);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "camera": {
                "id": "stub://front",
                "target_width": 1280,
                "target_height": 720,
                "open_timeout_ms": 1000,
                "analysis_depth": 4
            },
            "display": { "width": 1920, "height": 1080, "rotation": 90, "orientation": "landscape" },
            "classifier": {
                "assets_dir": "/opt/models",
                "model": "colors.json",
                "input_width": 32,
                "input_height": 32,
                "layout": "nchw"
            }
        }"#,
    );
    std::env::set_var("PREVIEW_CONFIG", file.path());
    std::env::set_var("PREVIEW_TARGET_WIDTH", "320");
    std::env::set_var("PREVIEW_ANALYSIS_DEPTH", "1");
    std::env::set_var("PREVIEW_LABELS_PATH", "/tmp/colors.txt");

    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.camera.id, "stub://front");
    assert_eq!(cfg.camera.target, Size::new(320, 720));
    assert_eq!(cfg.camera.open_timeout, Duration::from_millis(1000));
    assert_eq!(cfg.camera.analysis_depth, 1);
    assert_eq!(cfg.display.view, Size::new(1920, 1080));
    assert_eq!(cfg.display.rotation, Rotation::Rotation90);
    assert_eq!(cfg.display.orientation, Orientation::Landscape);
    assert_eq!(cfg.classifier.model_path, PathBuf::from("/opt/models/colors.json"));
    assert_eq!(cfg.classifier.labels_path, PathBuf::from("/tmp/colors.txt"));
    assert_eq!(cfg.classifier.input.layout, TensorLayout::Nchw);

    let assets = cfg.model_assets();
    assert_eq!(assets.backend, BackendKind::Centroid);
    let session = cfg.session_config();
    assert_eq!(session.camera_id, "stub://front");
    assert_eq!(session.analysis_depth, 1);
    assert_eq!(session.view_size, Size::new(1920, 1080));

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
[camera]
id = "/dev/video0"
fps = 15

[classifier]
backend = "centroid"
model = "model.onnx"
rotation_override = 270
"#,
    );
    let cfg = AppConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.camera.id, "/dev/video0");
    assert_eq!(cfg.camera.fps, 15);
    assert_eq!(cfg.classifier.rotation_override, Some(270));
    // An explicit backend wins over the model extension.
    assert_eq!(cfg.model_assets().backend, BackendKind::Centroid);
}

#[test]
fn backend_env_override_is_parsed() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PREVIEW_BACKEND", "onnx");
    std::env::set_var("PREVIEW_MODEL_PATH", "/srv/model.json");
    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.classifier.backend, Some(BackendKind::Tract));
    assert_eq!(cfg.classifier.model_path, PathBuf::from("/srv/model.json"));

    std::env::set_var("PREVIEW_BACKEND", "tflite");
    assert!(AppConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PREVIEW_ANALYSIS_DEPTH", "0");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("analysis_depth"), "{}", err);

    std::env::set_var("PREVIEW_ANALYSIS_DEPTH", "two");
    assert!(AppConfig::load().is_err());
    clear_env();

    std::env::set_var("PREVIEW_OPEN_TIMEOUT_MS", "0");
    assert!(AppConfig::load().is_err());
    clear_env();

    let rotated = config_file(".json", r#"{ "display": { "rotation": 45 } }"#);
    assert!(AppConfig::load_from(Some(rotated.path())).is_err());

    let sideways = config_file(".json", r#"{ "display": { "orientation": "sideways" } }"#);
    assert!(AppConfig::load_from(Some(sideways.path())).is_err());

    let override_45 = config_file(".json", r#"{ "classifier": { "rotation_override": 45 } }"#);
    assert!(AppConfig::load_from(Some(override_45.path())).is_err());

    let malformed = config_file(".json", "{ not json");
    assert!(AppConfig::load_from(Some(malformed.path())).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PREVIEW_CONFIG", "/nonexistent/preview.toml");
    let err = AppConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
