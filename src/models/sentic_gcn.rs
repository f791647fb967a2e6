//! SenticNet-weighted graph convolution for aspect-level sentiment.
//!
//! Token embeddings are projected to the hidden width, passed through two graph
//! convolutions over a sentic-weighted word graph, masked down to the aspect tokens and
//! used to attend over the projected text. The attended vector is classified into
//! polarities.
//!
//! Weights (safetensors): `embeddings.weight` `[vocab, embed]` (unless an embedding
//! matrix is supplied), `text_proj.{weight,bias}`, `gc1.{weight,bias}`,
//! `gc2.{weight,bias}` and `classifier.{weight,bias}`.

use super::{layout_error, load_safetensors};
use crate::error::{PipelineError, Result};
use candle_core::{Device, Module, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::{embedding, linear, linear_no_bias, Embedding, Linear, VarBuilder};
use std::path::Path;

/// Layer widths of a SenticGCN checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenticGcnDims {
    /// Vocabulary size (embedding rows).
    pub vocab_size: usize,
    /// Word embedding width.
    pub embed_dim: usize,
    /// Hidden width of the projection and graph layers.
    pub hidden_dim: usize,
    /// Number of polarities.
    pub num_labels: usize,
}

/// Padded model inputs for a batch of `(text, aspect)` pairs.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// `[batch, seq]` u32 token ids.
    pub input_ids: Tensor,
    /// `[batch, seq]` f32, 1 for tokens and 0 for padding.
    pub attention_mask: Tensor,
    /// `[batch, seq]` f32 context weights, 0 on aspect tokens and padding.
    pub position_weights: Tensor,
    /// `[batch, seq]` f32, 1 on aspect tokens.
    pub aspect_mask: Tensor,
    /// `[batch, seq, seq]` f32 weighted adjacency.
    pub adjacency: Tensor,
}

struct GraphConvolution {
    weight: Linear,
    bias: Tensor,
}

impl GraphConvolution {
    fn load(vb: VarBuilder, dim: usize) -> candle_core::Result<Self> {
        let weight = linear_no_bias(dim, dim, vb.clone())?;
        let bias = vb.get(dim, "bias")?;
        Ok(Self { weight, bias })
    }

    // adj @ (x W) / (rowsum(adj) + 1) + b
    fn forward(&self, xs: &Tensor, adjacency: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.weight.forward(xs)?;
        let denom = adjacency.sum_keepdim(2)?.affine(1.0, 1.0)?;
        adjacency
            .matmul(&hidden)?
            .broadcast_div(&denom)?
            .broadcast_add(&self.bias)
    }
}

/// SenticGCN aspect sentiment classifier.
pub struct SenticGcn {
    embeddings: Embedding,
    text_proj: Linear,
    gc1: GraphConvolution,
    gc2: GraphConvolution,
    classifier: Linear,
    dims: SenticGcnDims,
    span: tracing::Span,
}

impl SenticGcn {
    /// Load from a safetensors artifact.
    ///
    /// `embedding_matrix`, when given, replaces `embeddings.weight` and must be
    /// `[vocab_size, embed_dim]`.
    pub fn load(
        path: &Path,
        embedding_matrix: Option<Tensor>,
        dims: SenticGcnDims,
        device: &Device,
    ) -> Result<Self> {
        let vb = load_safetensors("weights", path, device)?;

        let embeddings = match embedding_matrix {
            Some(matrix) => {
                let shape = matrix.dims().to_vec();
                if shape != [dims.vocab_size, dims.embed_dim] {
                    return Err(PipelineError::corrupt(
                        "word_vectors",
                        format!("embedding matrix [{}, {}]", dims.vocab_size, dims.embed_dim),
                        format!("{shape:?}"),
                    ));
                }
                Embedding::new(matrix, dims.embed_dim)
            }
            None => embedding(dims.vocab_size, dims.embed_dim, vb.pp("embeddings")).map_err(
                layout_error(
                    "weights",
                    format!("embeddings.weight [{}, {}]", dims.vocab_size, dims.embed_dim),
                ),
            )?,
        };

        let text_proj = linear(dims.embed_dim, dims.hidden_dim, vb.pp("text_proj")).map_err(
            layout_error(
                "weights",
                format!("text_proj.weight [{}, {}]", dims.hidden_dim, dims.embed_dim),
            ),
        )?;
        let gc1 = GraphConvolution::load(vb.pp("gc1"), dims.hidden_dim).map_err(layout_error(
            "weights",
            format!("gc1.weight [{0}, {0}] and gc1.bias [{0}]", dims.hidden_dim),
        ))?;
        let gc2 = GraphConvolution::load(vb.pp("gc2"), dims.hidden_dim).map_err(layout_error(
            "weights",
            format!("gc2.weight [{0}, {0}] and gc2.bias [{0}]", dims.hidden_dim),
        ))?;
        let classifier = linear(dims.hidden_dim, dims.num_labels, vb.pp("classifier")).map_err(
            layout_error(
                "weights",
                format!("classifier.weight [{}, {}]", dims.num_labels, dims.hidden_dim),
            ),
        )?;

        Ok(Self {
            embeddings,
            text_proj,
            gc1,
            gc2,
            classifier,
            dims,
            span: tracing::span!(tracing::Level::TRACE, "sentic-gcn"),
        })
    }

    /// Layer widths.
    pub fn dims(&self) -> SenticGcnDims {
        self.dims
    }

    /// Polarity logits, `[batch, num_labels]`.
    pub fn forward(&self, batch: &GraphBatch) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();

        let embedded = self.embeddings.forward(&batch.input_ids)?;
        let text = self.text_proj.forward(&embedded)?;

        let weights = batch.position_weights.unsqueeze(2)?;
        let xs = self
            .gc1
            .forward(&text.broadcast_mul(&weights)?, &batch.adjacency)?
            .relu()?;
        let xs = self
            .gc2
            .forward(&xs.broadcast_mul(&weights)?, &batch.adjacency)?
            .relu()?;
        let xs = xs.broadcast_mul(&batch.aspect_mask.unsqueeze(2)?)?;

        // Aspect-to-text attention; padding gets -1e9 before the softmax.
        let scores = xs
            .matmul(&text.transpose(1, 2)?.contiguous()?)?
            .sum(1)?;
        let penalty = batch.attention_mask.affine(1e9, -1e9)?;
        let alpha = softmax(&(scores + penalty)?, D::Minus1)?;
        let pooled = alpha.unsqueeze(1)?.matmul(&text)?.squeeze(1)?;

        self.classifier.forward(&pooled)
    }
}
