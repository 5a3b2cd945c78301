use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::classify::backend::{InputSpec, ModelBackend, TensorLayout};

fn default_temperature() -> f32 {
    0.05
}

#[derive(Debug, Deserialize)]
struct CentroidModelFile {
    input: InputSpec,
    #[serde(default = "default_temperature")]
    temperature: f32,
    centroids: Vec<[f32; 3]>,
}

/// Nearest-color classifier.
///
/// Model files are JSON:
///
/// ```json
/// { "input": { "width": 32, "height": 32, "layout": "nhwc" },
///   "temperature": 0.05,
///   "centroids": [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]] }
/// ```
///
/// Centroids are normalized RGB, one per label. Scores are a softmax over the
/// negative squared distance between the input's mean color and each centroid.
pub struct CentroidBackend {
    input: InputSpec,
    temperature: f32,
    centroids: Vec<[f32; 3]>,
}

impl CentroidBackend {
    pub fn new(input: InputSpec, centroids: Vec<[f32; 3]>, temperature: f32) -> Result<Self> {
        if input.is_empty() {
            return Err(anyhow!("model input must be non-empty"));
        }
        if centroids.is_empty() {
            return Err(anyhow!("model has no centroids"));
        }
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(anyhow!("temperature must be positive, got {}", temperature));
        }
        Ok(Self {
            input,
            temperature,
            centroids,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read centroid model {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid centroid model {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CentroidModelFile = serde_json::from_str(raw)?;
        Self::new(file.input, file.centroids, file.temperature)
    }

    fn mean_color(&self, input: &[f32]) -> [f32; 3] {
        let pixels = (input.len() / 3).max(1);
        let mut sum = [0.0f32; 3];
        match self.input.layout {
            TensorLayout::Nhwc => {
                for px in input.chunks_exact(3) {
                    sum[0] += px[0];
                    sum[1] += px[1];
                    sum[2] += px[2];
                }
            }
            TensorLayout::Nchw => {
                for (channel, plane) in input.chunks_exact(pixels).take(3).enumerate() {
                    sum[channel] = plane.iter().sum();
                }
            }
        }
        sum.map(|s| s / pixels as f32)
    }
}

impl ModelBackend for CentroidBackend {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn input_spec(&self) -> InputSpec {
        self.input
    }

    fn run(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input.len() {
            return Err(anyhow!(
                "expected {} input values, received {}",
                self.input.len(),
                input.len()
            ));
        }
        let mean = self.mean_color(input);
        let logits: Vec<f32> = self
            .centroids
            .iter()
            .map(|c| {
                let d: f32 = (0..3).map(|i| (mean[i] - c[i]).powi(2)).sum();
                -d / self.temperature
            })
            .collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / total).collect())
    }
}
