use std::collections::BTreeSet;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use preview_classifier::classify::{CentroidBackend, InputSpec, TensorLayout};
use preview_classifier::{
    CameraSessionState, CaptureSessionController, FrameAnalyzer, FrameClassifier, HostEvent,
    ModelAssets, PreviewDisplay, Rotation, SessionConfig, Size, SyntheticCamera,
    SyntheticConfig,
};

fn color_classifier() -> FrameClassifier {
    let mut classifier = FrameClassifier::new(ModelAssets::in_dir(Path::new("unused")));
    let backend = CentroidBackend::new(
        InputSpec {
            width: 32,
            height: 32,
            layout: TensorLayout::Nchw,
        },
        vec![[0.85, 0.15, 0.15], [0.15, 0.8, 0.25], [0.15, 0.25, 0.85]],
        0.05,
    )
    .expect("centroid backend");
    classifier
        .init_with(
            Box::new(backend),
            vec!["red".to_string(), "green".to_string(), "blue".to_string()],
        )
        .expect("init classifier");
    classifier
}

fn start(camera: SyntheticConfig) -> (CaptureSessionController, Receiver<HostEvent>) {
    let (tx, rx) = mpsc::channel();
    let analyzer = FrameAnalyzer::new(color_classifier(), tx.clone());
    let controller = CaptureSessionController::start(
        Box::new(SyntheticCamera::new(camera)),
        Arc::new(PreviewDisplay::new()),
        Box::new(analyzer),
        tx,
        SessionConfig::default(),
    )
    .expect("start controller");
    (controller, rx)
}

/// Collect `(label, sequence)` pairs until `done` holds or the deadline passes.
fn collect_classified(
    events: &Receiver<HostEvent>,
    done: impl Fn(&[(String, u64)]) -> bool,
) -> Vec<(String, u64)> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while !done(&seen) {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        match events.recv_timeout(remaining) {
            Ok(HostEvent::Classified {
                result, sequence, ..
            }) => seen.push((result.label().to_string(), sequence)),
            Ok(HostEvent::Fatal(err)) => panic!("camera failed: {}", err),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    seen
}

#[test]
fn synthetic_frames_are_classified() {
    let (controller, events) = start(SyntheticConfig {
        fps: 50,
        scene: vec![[220, 40, 40]],
        noise: 12,
        ..SyntheticConfig::default()
    });
    controller
        .open(Size::new(320, 240), Rotation::Rotation0)
        .expect("open");

    let seen = collect_classified(&events, |seen| seen.len() >= 5);
    assert!(seen.len() >= 5, "only {} classifications", seen.len());
    assert!(seen.iter().all(|(label, _)| label == "red"), "{:?}", seen);
    assert!(seen.windows(2).all(|pair| pair[0].1 < pair[1].1));

    controller.close().expect("close");
    assert_eq!(controller.state(), CameraSessionState::Closed);
}

#[test]
fn classification_follows_the_scene() {
    let (controller, events) = start(SyntheticConfig {
        fps: 50,
        scene_frames: 4,
        ..SyntheticConfig::default()
    });
    controller
        .open(Size::new(320, 240), Rotation::Rotation0)
        .expect("open");

    let seen = collect_classified(&events, |seen| {
        seen.iter().map(|(label, _)| label.as_str()).collect::<BTreeSet<_>>().len() == 3
    });
    let labels: BTreeSet<&str> = seen.iter().map(|(label, _)| label.as_str()).collect();
    assert_eq!(labels, BTreeSet::from(["blue", "green", "red"]));

    controller.stop().expect("stop");
}
