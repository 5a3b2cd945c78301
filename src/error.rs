use std::time::Duration;

use crate::camera::state::{CameraSessionState, SessionEvent};

/// Failures surfaced to the host, either synchronously from `open`/`close`
/// or asynchronously as `HostEvent::Notice` / `HostEvent::Fatal`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// The caller lacks camera authorization.
    PermissionDenied(String),
    /// The open/close permit was not acquired in time.
    Timeout(Duration),
    /// Camera hardware or driver failure.
    DeviceError(String),
    /// Session setup was rejected.
    ConfigurationFailed(String),
    /// The classifier was used before `init`.
    Uninitialized,
    /// The session state machine rejected an event.
    InvalidState {
        state: CameraSessionState,
        event: SessionEvent,
    },
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::PermissionDenied(_) => "permission_denied",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::DeviceError(_) => "device_error",
            PipelineError::ConfigurationFailed(_) => "configuration_failed",
            PipelineError::Uninitialized => "uninitialized",
            PipelineError::InvalidState { .. } => "invalid_state",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::PermissionDenied(msg) => write!(f, "{}: {}", self.code(), msg),
            PipelineError::Timeout(waited) => write!(
                f,
                "{}: camera lock not acquired within {} ms",
                self.code(),
                waited.as_millis()
            ),
            PipelineError::DeviceError(msg) => write!(f, "{}: {}", self.code(), msg),
            PipelineError::ConfigurationFailed(msg) => write!(f, "{}: {}", self.code(), msg),
            PipelineError::Uninitialized => {
                write!(f, "{}: classifier used before init", self.code())
            }
            PipelineError::InvalidState { state, event } => {
                write!(f, "{}: {:?} not allowed in {:?}", self.code(), event, state)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = PipelineError::Timeout(Duration::from_millis(2500));
        assert_eq!(
            err.to_string(),
            "timeout: camera lock not acquired within 2500 ms"
        );
    }

    #[test]
    fn converts_into_anyhow_and_back() {
        let err: anyhow::Error = PipelineError::Uninitialized.into();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::Uninitialized)
        );
    }
}
