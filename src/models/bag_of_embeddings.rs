//! Word-level embedding bag models.
//!
//! Both models read a safetensors file with `embeddings.weight` `[vocab, dim]`,
//! `classifier.weight` `[labels, dim]` and `classifier.bias` `[labels]`.

use super::capabilities::{SequenceClassifier, TokenTagger};
use super::{layout_error, load_safetensors};
use crate::error::Result;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{embedding, linear, Embedding, Linear, VarBuilder};
use std::path::Path;

/// Shape of an embedding bag checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagDims {
    /// Vocabulary size (embedding rows).
    pub vocab_size: usize,
    /// Embedding width.
    pub embed_dim: usize,
    /// Output classes.
    pub num_labels: usize,
}

struct BagLayers {
    embeddings: Embedding,
    classifier: Linear,
}

impl BagLayers {
    fn load(vb: VarBuilder, dims: BagDims) -> Result<Self> {
        let embeddings = embedding(dims.vocab_size, dims.embed_dim, vb.pp("embeddings")).map_err(
            layout_error(
                "weights",
                format!("embeddings.weight of shape [{}, {}]", dims.vocab_size, dims.embed_dim),
            ),
        )?;
        let classifier = linear(dims.embed_dim, dims.num_labels, vb.pp("classifier")).map_err(
            layout_error(
                "weights",
                format!(
                    "classifier.weight [{}, {}] and classifier.bias [{}]",
                    dims.num_labels, dims.embed_dim, dims.num_labels
                ),
            ),
        )?;
        Ok(Self {
            embeddings,
            classifier,
        })
    }
}

/// Masked mean of token embeddings followed by a linear layer.
pub struct BagOfEmbeddingsClassifier {
    layers: BagLayers,
    num_labels: usize,
    span: tracing::Span,
}

impl BagOfEmbeddingsClassifier {
    /// Load from a safetensors artifact.
    pub fn load(path: &Path, dims: BagDims, device: &Device) -> Result<Self> {
        let vb = load_safetensors("weights", path, device)?;
        Ok(Self {
            layers: BagLayers::load(vb, dims)?,
            num_labels: dims.num_labels,
            span: tracing::span!(tracing::Level::TRACE, "bag-of-embeddings-classifier"),
        })
    }
}

impl SequenceClassifier for BagOfEmbeddingsClassifier {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();
        let embedded = self.layers.embeddings.forward(input_ids)?;
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = embedded.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.maximum(1f32)?;
        let pooled = summed.broadcast_div(&counts)?;
        self.layers.classifier.forward(&pooled)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

/// Per-token linear layer over word embeddings.
pub struct BagOfEmbeddingsTagger {
    layers: BagLayers,
    num_labels: usize,
    span: tracing::Span,
}

impl BagOfEmbeddingsTagger {
    /// Load from a safetensors artifact.
    pub fn load(path: &Path, dims: BagDims, device: &Device) -> Result<Self> {
        let vb = load_safetensors("weights", path, device)?;
        Ok(Self {
            layers: BagLayers::load(vb, dims)?,
            num_labels: dims.num_labels,
            span: tracing::span!(tracing::Level::TRACE, "bag-of-embeddings-tagger"),
        })
    }
}

impl TokenTagger for BagOfEmbeddingsTagger {
    fn forward(&self, input_ids: &Tensor, _attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();
        let embedded = self.layers.embeddings.forward(input_ids)?;
        self.layers.classifier.forward(&embedded)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_weights(name: &str, tensors: Vec<(&str, Tensor)>) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("sgnlp-bag-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.safetensors");
        let map: HashMap<String, Tensor> =
            tensors.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        candle_core::safetensors::save(&map, &path).unwrap();
        path
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        let dev = Device::Cpu;
        write_weights(
            name,
            vec![
                (
                    "embeddings.weight",
                    Tensor::new(&[[0f32, 0.], [0., 0.], [1., 0.], [0., 1.]], &dev).unwrap(),
                ),
                (
                    "classifier.weight",
                    Tensor::new(&[[0f32, 1.], [1., 0.]], &dev).unwrap(),
                ),
                ("classifier.bias", Tensor::new(&[0f32, 0.], &dev).unwrap()),
            ],
        )
    }

    const DIMS: BagDims = BagDims {
        vocab_size: 4,
        embed_dim: 2,
        num_labels: 2,
    };

    #[test]
    fn test_classifier_ignores_padding() {
        let path = fixture("classifier");
        let model = BagOfEmbeddingsClassifier::load(&path, DIMS, &Device::Cpu).unwrap();

        let ids = Tensor::new(&[[2u32, 2, 3], [2, 0, 0]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1], [1, 0, 0]], &Device::Cpu).unwrap();
        let logits = model.forward(&ids, &mask).unwrap().to_vec2::<f32>().unwrap();

        assert!((logits[0][0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((logits[0][1] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(logits[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_tagger_scores_every_token() {
        let path = fixture("tagger");
        let model = BagOfEmbeddingsTagger::load(&path, DIMS, &Device::Cpu).unwrap();

        let ids = Tensor::new(&[[2u32, 3]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1u32, 1]], &Device::Cpu).unwrap();
        let logits = model.forward(&ids, &mask).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(logits[0], vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_wrong_shape_is_corrupt() {
        let path = fixture("shape");
        let dims = BagDims {
            embed_dim: 3,
            ..DIMS
        };
        let err = BagOfEmbeddingsClassifier::load(&path, dims, &Device::Cpu).err().unwrap();
        assert!(matches!(
            err,
            crate::error::PipelineError::ArtifactCorrupt { .. }
        ));
    }
}
