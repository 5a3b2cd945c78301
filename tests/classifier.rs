use std::fs;
use std::path::Path;

use tempfile::TempDir;

use preview_classifier::classify::BackendKind;
use preview_classifier::{Bitmap, FrameClassifier, ModelAssets, PipelineError, Size};

const MODEL: &str = r#"{
    "input": { "width": 16, "height": 16, "layout": "nhwc" },
    "temperature": 0.05,
    "centroids": [[0.9, 0.1, 0.1], [0.1, 0.8, 0.2], [0.1, 0.2, 0.9]]
}"#;

fn write_assets(dir: &Path, labels: &str) -> ModelAssets {
    let model = dir.join("colors.json");
    let labels_path = dir.join("labels.txt");
    fs::write(&model, MODEL).expect("write model");
    fs::write(&labels_path, labels).expect("write labels");
    ModelAssets::new(model, labels_path)
}

fn ready_classifier(dir: &TempDir) -> FrameClassifier {
    let mut classifier = FrameClassifier::new(write_assets(dir.path(), "red\ngreen\nblue\n"));
    classifier.init().expect("init classifier");
    classifier
}

#[test]
fn classifies_solid_colors() {
    let dir = TempDir::new().expect("temp dir");
    let mut classifier = ready_classifier(&dir);
    assert_eq!(classifier.assets().backend, BackendKind::Centroid);
    assert_eq!(classifier.model_input_size(), Size::new(16, 16));
    assert_eq!(classifier.labels(), ["red", "green", "blue"]);

    for (rgba, label) in [
        ([230, 25, 25, 255], "red"),
        ([30, 200, 50, 255], "green"),
        ([20, 50, 230, 255], "blue"),
    ] {
        let result = classifier
            .classify(&Bitmap::filled(64, 48, rgba), 90)
            .expect("classify");
        assert_eq!(result.label(), label);
        assert!(result.confidence() > 0.9, "{}", result);
        assert!(result.confidence() <= 1.0);
    }
}

#[test]
fn classification_is_deterministic() {
    let dir = TempDir::new().expect("temp dir");
    let mut classifier = ready_classifier(&dir);
    let bitmap = Bitmap::filled(40, 30, [120, 120, 40, 255]);

    let first = classifier.classify(&bitmap, 0).expect("classify");
    for rotation in [0, 90, 180, 270] {
        let again = classifier.classify(&bitmap, rotation).expect("classify");
        assert_eq!(again.label(), first.label());
        assert!((again.confidence() - first.confidence()).abs() < 1e-6);
    }
}

#[test]
fn uninitialized_classifier_yields_empty_result() {
    let dir = TempDir::new().expect("temp dir");
    let mut classifier = FrameClassifier::new(write_assets(dir.path(), "red\ngreen\nblue\n"));
    let bitmap = Bitmap::filled(8, 8, [255, 0, 0, 255]);

    assert!(!classifier.is_initialized());
    assert_eq!(classifier.model_input_size(), Size::new(0, 0));
    assert!(classifier.classify(&bitmap, 0).expect("classify").is_empty());

    let err = classifier.try_classify(&bitmap, 0).unwrap_err();
    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::Uninitialized)
    );
}

#[test]
fn label_count_must_match_model_outputs() {
    let dir = TempDir::new().expect("temp dir");
    let mut classifier = FrameClassifier::new(write_assets(dir.path(), "red\nblue\n"));
    let err = classifier.init().unwrap_err();
    assert!(format!("{:#}", err).contains("3 scores but 2 labels"), "{:#}", err);
    assert!(!classifier.is_initialized());
}

#[test]
fn missing_or_empty_assets_fail_init() {
    let dir = TempDir::new().expect("temp dir");

    let mut missing = FrameClassifier::new(ModelAssets::in_dir(&dir.path().join("absent")));
    assert!(missing.init().is_err());

    let mut empty_labels = FrameClassifier::new(write_assets(dir.path(), "\n  \n"));
    assert!(empty_labels.init().is_err());

    let bad_model = dir.path().join("bad.json");
    fs::write(&bad_model, r#"{ "centroids": [] }"#).expect("write model");
    let assets = ModelAssets::new(bad_model, dir.path().join("labels.txt"));
    let mut invalid = FrameClassifier::new(assets);
    assert!(invalid.init().is_err());
}

#[cfg(not(feature = "backend-tract"))]
#[test]
fn onnx_models_need_the_tract_backend() {
    let dir = TempDir::new().expect("temp dir");
    let model = dir.path().join("model.onnx");
    fs::write(&model, b"not really onnx").expect("write model");
    fs::write(dir.path().join("labels.txt"), "a\n").expect("write labels");

    let assets = ModelAssets::new(model, dir.path().join("labels.txt"));
    assert_eq!(assets.backend, BackendKind::Tract);
    let err = FrameClassifier::new(assets).init().unwrap_err();
    assert!(format!("{:#}", err).contains("backend-tract"), "{:#}", err);
}

#[test]
fn finish_is_idempotent_and_allows_reinit() {
    let dir = TempDir::new().expect("temp dir");
    let mut classifier = ready_classifier(&dir);
    let bitmap = Bitmap::filled(8, 8, [20, 50, 230, 255]);

    classifier.finish();
    classifier.finish();
    assert!(!classifier.is_initialized());
    assert!(classifier.labels().is_empty());
    assert!(classifier.classify(&bitmap, 0).expect("classify").is_empty());

    classifier.init().expect("reinit");
    assert_eq!(classifier.classify(&bitmap, 0).expect("classify").label(), "blue");
}
