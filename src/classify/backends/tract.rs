#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::classify::backend::{InputSpec, ModelBackend, TensorLayout};

/// Tract-based backend for ONNX classification models.
///
/// Loads a local model file with a single f32 image input and a single score
/// vector output.
pub struct TractBackend {
    model: Option<TypedRunnableModel<TypedModel>>,
    input: InputSpec,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input: InputSpec) -> Result<Self> {
        let model_path = model_path.as_ref();
        let [n, d1, d2, d3] = Self::shape(input);
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(n, d1, d2, d3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model: Some(model),
            input,
        })
    }

    fn shape(input: InputSpec) -> [usize; 4] {
        let (w, h) = (input.width as usize, input.height as usize);
        match input.layout {
            TensorLayout::Nhwc => [1, h, w, 3],
            TensorLayout::Nchw => [1, 3, h, w],
        }
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_spec(&self) -> InputSpec {
        self.input
    }

    fn run(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("ONNX model already closed"))?;
        if input.len() != self.input.len() {
            return Err(anyhow!(
                "expected {} input values, received {}",
                self.input.len(),
                input.len()
            ));
        }
        let tensor = tract_ndarray::Array4::from_shape_vec(Self::shape(self.input), input.to_vec())
            .context("failed to shape input tensor")?
            .into_tensor();
        let outputs = model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Ok(scores.iter().copied().collect())
    }

    fn close(&mut self) {
        self.model = None;
    }
}
