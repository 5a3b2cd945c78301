use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::geometry::Size;

/// Memory order of the RGB input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, height, width, 3]`
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`
    Nchw,
}

impl TensorLayout {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(anyhow!("unknown tensor layout {:?} (expected nhwc or nchw)", other)),
        }
    }
}

/// Geometry of the model's image input. Always three channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub layout: TensorLayout,
}

impl Default for InputSpec {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            layout: TensorLayout::Nhwc,
        }
    }
}

impl InputSpec {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Number of f32 elements in one input tensor.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inference backend.
///
/// Input is a normalized RGB tensor laid out per `input_spec`; output is one
/// score per label.
pub trait ModelBackend: Send {
    fn name(&self) -> &'static str;

    fn input_spec(&self) -> InputSpec;

    fn run(&mut self, input: &[f32]) -> Result<Vec<f32>>;

    /// Run a zeroed input once and report the output length.
    fn warm_up(&mut self) -> Result<usize> {
        let zeros = vec![0.0; self.input_spec().len()];
        Ok(self.run(&zeros)?.len())
    }

    /// Release model resources.
    fn close(&mut self) {}
}
