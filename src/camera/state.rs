//! Camera session state machine.

use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraSessionState {
    #[default]
    Closed,
    Opening,
    Configuring,
    Previewing,
    Closing,
    Error,
}

/// Inputs that drive `CameraSessionState` transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// `open` was accepted and the device request issued.
    Open,
    /// The device request failed synchronously.
    OpenFailed,
    /// The device reported it is open.
    DeviceOpened,
    /// The preview session is configured and repeating.
    SessionConfigured,
    /// A device error or rejected session configuration.
    Failed,
    /// The device went away.
    Disconnected,
    /// `close` started tearing the session down.
    Close,
    /// Teardown finished.
    Closed,
}

impl CameraSessionState {
    /// The state reached from `self` on `event`, or `InvalidState`.
    pub fn next(self, event: SessionEvent) -> Result<CameraSessionState, PipelineError> {
        use CameraSessionState as S;
        use SessionEvent as E;

        let next = match (self, event) {
            (S::Closed | S::Error, E::Open) => S::Opening,
            (S::Opening, E::OpenFailed) => S::Closed,
            (S::Opening, E::DeviceOpened) => S::Configuring,
            (S::Configuring, E::SessionConfigured) => S::Previewing,
            (S::Opening | S::Configuring | S::Previewing, E::Failed) => S::Error,
            (S::Opening | S::Configuring | S::Previewing, E::Disconnected) => S::Closed,
            (S::Opening | S::Configuring | S::Previewing | S::Error, E::Close) => S::Closing,
            (S::Closing, E::Closed) => S::Closed,
            (state, event) => return Err(PipelineError::InvalidState { state, event }),
        };
        Ok(next)
    }

    /// True while a device handle may be held.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CameraSessionState::Opening
                | CameraSessionState::Configuring
                | CameraSessionState::Previewing
                | CameraSessionState::Closing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CameraSessionState as S;
    use SessionEvent as E;

    fn run(events: &[SessionEvent]) -> Result<CameraSessionState, PipelineError> {
        events.iter().try_fold(S::Closed, |state, &event| state.next(event))
    }

    #[test]
    fn happy_path_reaches_previewing_and_back() {
        assert_eq!(
            run(&[E::Open, E::DeviceOpened, E::SessionConfigured]),
            Ok(S::Previewing)
        );
        assert_eq!(
            run(&[E::Open, E::DeviceOpened, E::SessionConfigured, E::Close, E::Closed]),
            Ok(S::Closed)
        );
    }

    #[test]
    fn cannot_open_twice() {
        assert_eq!(
            run(&[E::Open, E::Open]),
            Err(PipelineError::InvalidState {
                state: S::Opening,
                event: E::Open
            })
        );
    }

    #[test]
    fn error_state_can_reopen_or_close() {
        assert_eq!(run(&[E::Open, E::Failed, E::Open]), Ok(S::Opening));
        assert_eq!(run(&[E::Open, E::Failed, E::Close, E::Closed]), Ok(S::Closed));
    }

    #[test]
    fn sync_open_failure_returns_to_closed() {
        assert_eq!(run(&[E::Open, E::OpenFailed]), Ok(S::Closed));
    }

    #[test]
    fn steps_cannot_be_skipped() {
        assert!(run(&[E::Open, E::SessionConfigured]).is_err());
        assert!(run(&[E::DeviceOpened]).is_err());
        assert!(run(&[E::Close]).is_err());
    }

    #[test]
    fn disconnect_closes_session() {
        assert_eq!(
            run(&[E::Open, E::DeviceOpened, E::SessionConfigured, E::Disconnected]),
            Ok(S::Closed)
        );
    }
}
