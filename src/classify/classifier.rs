use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::backend::{InputSpec, ModelBackend};
use super::backends::{load_backend, BackendKind};
use super::labels::load_labels;
use super::preprocess::prepare_input;
use super::result::ClassificationResult;
use crate::error::PipelineError;
use crate::frame::Bitmap;
use crate::geometry::Size;

pub const DEFAULT_MODEL_FILE: &str = "mobilenet_imagenet_model.onnx";
pub const DEFAULT_LABEL_FILE: &str = "labels.txt";

/// Where a classifier's model and labels live.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub backend: BackendKind,
    /// Input geometry for backends whose model file does not carry one.
    pub input: InputSpec,
}

impl ModelAssets {
    pub fn new(model_path: impl Into<PathBuf>, labels_path: impl Into<PathBuf>) -> Self {
        let model_path = model_path.into();
        Self {
            backend: BackendKind::for_model_path(&model_path),
            model_path,
            labels_path: labels_path.into(),
            input: InputSpec::default(),
        }
    }

    /// Default file names under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DEFAULT_MODEL_FILE), dir.join(DEFAULT_LABEL_FILE))
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_input(mut self, input: InputSpec) -> Self {
        self.input = input;
        self
    }
}

/// Classifies bitmaps with one model. `&mut self` keeps use sequential.
pub struct FrameClassifier {
    assets: ModelAssets,
    backend: Option<Box<dyn ModelBackend>>,
    labels: Vec<String>,
}

impl FrameClassifier {
    pub fn new(assets: ModelAssets) -> Self {
        Self {
            assets,
            backend: None,
            labels: Vec::new(),
        }
    }

    /// Load the model and labels named by the assets.
    pub fn init(&mut self) -> Result<()> {
        let backend = load_backend(
            self.assets.backend,
            &self.assets.model_path,
            self.assets.input,
        )
        .with_context(|| {
            format!(
                "failed to load {} model {}",
                self.assets.backend.name(),
                self.assets.model_path.display()
            )
        })?;
        let labels = load_labels(&self.assets.labels_path)?;
        self.init_with(backend, labels)
    }

    /// Install an already constructed backend. Fails unless the model emits
    /// exactly one score per label.
    pub fn init_with(
        &mut self,
        mut backend: Box<dyn ModelBackend>,
        labels: Vec<String>,
    ) -> Result<()> {
        let outputs = backend
            .warm_up()
            .with_context(|| format!("{} warm-up failed", backend.name()))?;
        if outputs != labels.len() {
            backend.close();
            return Err(anyhow!(
                "model produces {} scores but {} labels were loaded",
                outputs,
                labels.len()
            ));
        }
        self.finish();
        let input = backend.input_spec();
        log::info!(
            "classifier ready: {} backend, input {}x{} {:?}, {} labels",
            backend.name(),
            input.width,
            input.height,
            input.layout,
            labels.len()
        );
        self.backend = Some(backend);
        self.labels = labels;
        Ok(())
    }

    /// Classify `bitmap`, which was captured `rotation_degrees` clockwise from
    /// upright. Before `init` this yields an empty result.
    pub fn classify(
        &mut self,
        bitmap: &Bitmap,
        rotation_degrees: i32,
    ) -> Result<ClassificationResult> {
        if !self.is_initialized() {
            log::debug!("classify called before init");
            return Ok(ClassificationResult::empty());
        }
        self.try_classify(bitmap, rotation_degrees)
    }

    /// Like `classify`, but fails with `PipelineError::Uninitialized` before
    /// `init`.
    pub fn try_classify(
        &mut self,
        bitmap: &Bitmap,
        rotation_degrees: i32,
    ) -> Result<ClassificationResult> {
        let backend = self.backend.as_mut().ok_or(PipelineError::Uninitialized)?;
        let input = prepare_input(bitmap, backend.input_spec(), rotation_degrees);
        let scores = backend.run(&input).context("inference failed")?;
        if scores.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            ));
        }
        Ok(ClassificationResult::top(&self.labels, &scores))
    }

    /// Release the model. Safe to call more than once.
    pub fn finish(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
            log::info!("classifier {} released", backend.name());
        }
        self.labels.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    /// Model input size, or 0x0 before `init`.
    pub fn model_input_size(&self) -> Size {
        self.backend
            .as_ref()
            .map(|b| b.input_spec().size())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn assets(&self) -> &ModelAssets {
        &self.assets
    }
}

impl Drop for FrameClassifier {
    fn drop(&mut self) {
        self.finish();
    }
}
