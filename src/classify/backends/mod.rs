pub mod centroid;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};
use std::path::Path;

use super::backend::{InputSpec, ModelBackend};

pub use centroid::CentroidBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Centroid,
    Tract,
}

impl BackendKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "centroid" => Ok(BackendKind::Centroid),
            "tract" | "onnx" => Ok(BackendKind::Tract),
            other => Err(anyhow!(
                "unknown classifier backend {:?} (expected centroid or tract)",
                other
            )),
        }
    }

    /// `.onnx` models run on tract; anything else is a centroid model.
    pub fn for_model_path(path: &Path) -> Self {
        let onnx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
        if onnx {
            BackendKind::Tract
        } else {
            BackendKind::Centroid
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Centroid => "centroid",
            BackendKind::Tract => "tract",
        }
    }
}

/// Instantiate the backend for `kind`. Centroid models carry their own input
/// geometry; `input` applies to tract models.
pub fn load_backend(
    kind: BackendKind,
    model_path: &Path,
    input: InputSpec,
) -> Result<Box<dyn ModelBackend>> {
    match kind {
        BackendKind::Centroid => Ok(Box::new(CentroidBackend::load(model_path)?)),
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(TractBackend::new(model_path, input)?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = input;
                Err(anyhow!(
                    "{} needs the tract backend; rebuild with --features backend-tract",
                    model_path.display()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_model_extension() {
        assert_eq!(
            BackendKind::for_model_path(Path::new("assets/mobilenet_imagenet_model.onnx")),
            BackendKind::Tract
        );
        assert_eq!(
            BackendKind::for_model_path(Path::new("assets/colors.json")),
            BackendKind::Centroid
        );
        assert_eq!(BackendKind::parse(" Tract ").ok(), Some(BackendKind::Tract));
        assert!(BackendKind::parse("tflite").is_err());
    }
}
