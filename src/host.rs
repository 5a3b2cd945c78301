use std::time::Duration;

use crate::camera::CameraSessionState;
use crate::classify::ClassificationResult;
use crate::error::PipelineError;
use crate::geometry::Size;

/// Notifications from the pipeline to the host.
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    /// The preview size was negotiated; the host may lay out its view.
    PreviewSizeChosen { size: Size, sensor_orientation: u32 },
    StateChanged(CameraSessionState),
    /// Recoverable failure, e.g. a rejected session configuration.
    Notice(PipelineError),
    /// The camera is unusable. The host should tear down its camera screen.
    Fatal(PipelineError),
    Classified {
        result: ClassificationResult,
        sequence: u64,
        timestamp: Duration,
    },
}
