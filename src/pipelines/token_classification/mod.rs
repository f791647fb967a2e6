//! Token classification (span tagging) pipeline.
//!
//! Tags every word with a BIO label (`O`, `B-X`, `I-X`) and groups the tags into
//! [`TaggedSpan`]s with character offsets into the raw input.
//!
//! ## Decision rule
//!
//! Each token takes the argmax of its softmaxed logits (ties to the lowest index). A span
//! opens on `B-X`, or on `I-X` when no `X` span is open; `O` or a different type closes
//! it. The span score is the mean of its token scores; spans scoring below
//! `hyperparameters.min_score` (default 0) are dropped.

mod bio;
mod pipeline;

pub use bio::{BioTag, TagScheme};
pub use pipeline::{TaggedSpan, TaggedSpans, TokenClassificationResources, TokenClassificationTask};

/// Ready-to-use token classification pipeline.
pub type TokenClassificationPipeline = crate::pipelines::pipeline::Pipeline<TokenClassificationTask>;
