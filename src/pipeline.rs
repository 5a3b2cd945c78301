//! Analysis callback: convert, release, classify, notify.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::camera::FrameListener;
use crate::classify::FrameClassifier;
use crate::convert::yuv_to_rgb_into;
use crate::frame::{Bitmap, Frame};
use crate::geometry::Size;
use crate::host::HostEvent;

#[derive(Debug, Default)]
pub struct AnalyzerStats {
    analyzed: AtomicU64,
    failed: AtomicU64,
}

impl AnalyzerStats {
    pub fn analyzed(&self) -> u64 {
        self.analyzed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// `FrameListener` that classifies each analysis frame.
///
/// One output bitmap and one conversion buffer are reused across frames. The
/// frame itself is dropped as soon as it has been converted.
pub struct FrameAnalyzer {
    classifier: FrameClassifier,
    host: Sender<HostEvent>,
    sensor_orientation: i32,
    rotation_override: Option<i32>,
    output: Option<Bitmap>,
    scratch: Vec<u8>,
    stats: Arc<AnalyzerStats>,
}

impl FrameAnalyzer {
    pub fn new(classifier: FrameClassifier, host: Sender<HostEvent>) -> Self {
        Self {
            classifier,
            host,
            sensor_orientation: 0,
            rotation_override: None,
            output: None,
            scratch: Vec::new(),
            stats: Arc::new(AnalyzerStats::default()),
        }
    }

    /// Classify with a fixed rotation instead of the sensor orientation.
    pub fn with_rotation_override(mut self, degrees: i32) -> Self {
        self.rotation_override = Some(degrees);
        self
    }

    pub fn stats(&self) -> Arc<AnalyzerStats> {
        self.stats.clone()
    }

    fn output_for(&mut self, size: Size) -> &mut Bitmap {
        if self.output.as_ref().map(Bitmap::size) != Some(size) {
            self.output = Some(Bitmap::new(size.width, size.height));
        }
        self.output.get_or_insert_with(|| Bitmap::new(size.width, size.height))
    }
}

impl FrameListener for FrameAnalyzer {
    fn on_session_geometry(&mut self, preview: Size, sensor_orientation: u32) {
        self.sensor_orientation = sensor_orientation as i32;
        self.output = Some(Bitmap::new(preview.width, preview.height));
    }

    fn on_frame(&mut self, frame: Frame) {
        let sequence = frame.sequence();
        let timestamp = frame.timestamp();
        let crop = frame.crop().size();

        let mut scratch = std::mem::take(&mut self.scratch);
        let output = self.output_for(crop);
        let converted = yuv_to_rgb_into(&frame, &mut scratch, output);
        drop(frame);
        self.scratch = scratch;
        if let Err(err) = converted {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            log::warn!("frame {} conversion failed: {:#}", sequence, err);
            return;
        }

        let rotation = self.rotation_override.unwrap_or(self.sensor_orientation);
        let Some(output) = self.output.as_ref() else {
            return;
        };
        match self.classifier.classify(output, rotation) {
            Ok(result) => {
                self.stats.analyzed.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame {} classified as {}", sequence, result);
                let event = HostEvent::Classified {
                    result,
                    sequence,
                    timestamp,
                };
                if self.host.send(event).is_err() {
                    log::debug!("host receiver gone; dropping classification");
                }
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame {} classification failed: {:#}", sequence, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CentroidBackend, InputSpec, ModelAssets, TensorLayout};
    use crate::convert::rgb_to_yuv;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Duration;

    fn nv21_frame(size: Size, rgb: [u8; 3], sequence: u64) -> Result<Frame> {
        let (y, u, v) = rgb_to_yuv(rgb[0], rgb[1], rgb[2]);
        let luma = (size.width * size.height) as usize;
        let mut data = vec![y; luma];
        for _ in 0..luma / 4 {
            data.extend_from_slice(&[v, u]);
        }
        Frame::from_nv21(size, &data, Duration::from_millis(sequence * 100), sequence)
    }

    fn classifier() -> Result<FrameClassifier> {
        let mut classifier = FrameClassifier::new(ModelAssets::in_dir(Path::new("unused")));
        let backend = CentroidBackend::new(
            InputSpec {
                width: 4,
                height: 4,
                layout: TensorLayout::Nhwc,
            },
            vec![[0.9, 0.1, 0.1], [0.1, 0.1, 0.9]],
            0.05,
        )?;
        classifier.init_with(Box::new(backend), vec!["red".into(), "blue".into()])?;
        Ok(classifier)
    }

    #[test]
    fn classifies_frames_and_reports_to_host() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut analyzer = FrameAnalyzer::new(classifier()?, tx);
        let stats = analyzer.stats();
        analyzer.on_session_geometry(Size::new(8, 8), 90);

        analyzer.on_frame(nv21_frame(Size::new(8, 8), [230, 20, 20], 1)?);
        analyzer.on_frame(nv21_frame(Size::new(8, 8), [20, 20, 230], 2)?);

        let labels: Vec<(String, u64)> = rx
            .try_iter()
            .filter_map(|event| match event {
                HostEvent::Classified {
                    result, sequence, ..
                } => Some((result.label().to_string(), sequence)),
                _ => None,
            })
            .collect();
        assert_eq!(
            labels,
            vec![("red".to_string(), 1), ("blue".to_string(), 2)]
        );
        assert_eq!(stats.analyzed(), 2);
        assert_eq!(stats.failed(), 0);
        Ok(())
    }

    #[test]
    fn conversion_failure_is_counted() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut analyzer = FrameAnalyzer::new(classifier()?, tx);
        let stats = analyzer.stats();

        analyzer.on_frame(Frame::new(Size::new(4, 4), Vec::new(), Duration::ZERO, 1));
        assert_eq!(stats.failed(), 1);
        assert!(rx.try_recv().is_err());

        // A later frame of a different size still works.
        analyzer.on_frame(nv21_frame(Size::new(6, 4), [230, 20, 20], 2)?);
        assert_eq!(stats.analyzed(), 1);
        Ok(())
    }
}
