//! Frame classification.
//!
//! `FrameClassifier` prepares a bitmap for the model (`preprocess`), runs one
//! forward pass on a `ModelBackend` and maps the scores onto labels.

pub mod backend;
pub mod backends;
mod classifier;
mod labels;
pub mod preprocess;
mod result;

pub use backend::{InputSpec, ModelBackend, TensorLayout};
pub use backends::{load_backend, BackendKind, CentroidBackend};
pub use classifier::{FrameClassifier, ModelAssets, DEFAULT_LABEL_FILE, DEFAULT_MODEL_FILE};
pub use labels::{load_labels, parse_labels};
pub use result::ClassificationResult;

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
