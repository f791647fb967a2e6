//! Model adapters: candle forward passes behind the traits in [`capabilities`].

pub mod bag_of_embeddings;
pub mod capabilities;
pub mod embeddings;
pub mod modernbert;
pub mod sentic_gcn;

pub use bag_of_embeddings::{BagOfEmbeddingsClassifier, BagOfEmbeddingsTagger};
pub use capabilities::{SequenceClassifier, TokenTagger};
pub use modernbert::ModernBertClassifier;
pub use sentic_gcn::{GraphBatch, SenticGcn, SenticGcnDims};

use crate::error::{PipelineError, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use std::path::Path;

/// Memory-map a safetensors artifact.
pub(crate) fn load_safetensors(
    artifact: &str,
    path: &Path,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    // SAFETY: the file is a verified artifact and is not modified while mapped.
    unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }.map_err(|e| {
        PipelineError::corrupt(
            artifact,
            "a safetensors file",
            format!("unreadable file '{}': {e}", path.display()),
        )
    })
}

/// Map a candle error raised while building a layer to a shape/layout mismatch.
pub(crate) fn layout_error(artifact: &str, expected: String) -> impl FnOnce(candle_core::Error) -> PipelineError + '_ {
    move |e| PipelineError::corrupt(artifact, expected, e)
}
