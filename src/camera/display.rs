use std::sync::{Mutex, MutexGuard, PoisonError};

use super::device::DisplaySurface;
use crate::frame::Frame;
use crate::geometry::Size;
use crate::viewport::{AffineMatrix, AutoFitLayout};

/// Observable state of a `PreviewDisplay`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub layout: AutoFitLayout,
    pub buffer_size: Option<Size>,
    pub transform: AffineMatrix,
    pub frames_presented: u64,
    pub last_sequence: Option<u64>,
}

/// Headless display surface. Records what a real view would apply.
#[derive(Default)]
pub struct PreviewDisplay {
    state: Mutex<DisplayState>,
}

impl PreviewDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> DisplayState {
        self.lock().clone()
    }

    /// Size the view would take inside `width` x `height`.
    pub fn measure(&self, width: u32, height: u32) -> Size {
        self.lock().layout.measure(width, height)
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySurface for PreviewDisplay {
    fn set_buffer_size(&self, size: Size) {
        self.lock().buffer_size = Some(size);
    }

    fn set_aspect_ratio(&self, width: u32, height: u32) {
        self.lock().layout.set_aspect_ratio(width, height);
    }

    fn set_transform(&self, matrix: AffineMatrix) {
        self.lock().transform = matrix;
    }

    fn present(&self, frame: &Frame) {
        let mut state = self.lock();
        state.frames_presented += 1;
        state.last_sequence = Some(frame.sequence());
    }
}
