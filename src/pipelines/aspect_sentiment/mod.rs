//! Aspect-based sentiment pipeline (SenticGCN).
//!
//! Scores the polarity expressed towards each aspect term of a sentence, e.g. "food" and
//! "service" in "The food was great but the service was slow".
//!
//! ## Inputs
//!
//! An [`AspectInput`] holds the text and its aspect terms. Every aspect must occur in the
//! text (case-insensitive); the first occurrence is scored. [`AspectInput::from_marked`]
//! accepts the `$T$` placeholder form used by ABSA datasets.
//!
//! ## Word graph
//!
//! Tokens within `hyperparameters.window` positions of each other are connected. Each edge
//! weighs 1, plus the SenticNet polarity magnitude of both endpoints (from the optional
//! `sentic_lexicon` artifact), plus 1 when it touches an aspect token.
//!
//! ## Decision rule
//!
//! Per aspect: softmax over the polarity logits, argmax with ties to the lowest index.
//! Labels default to `negative`, `neutral`, `positive`.

mod graph;
mod input;
mod pipeline;

pub use graph::{load_sentic_lexicon, SenticLexicon};
pub use input::AspectInput;
pub use pipeline::{
    AspectEncoding, AspectPolarity, AspectSentimentResources, AspectSentimentTask,
    AspectSentiments,
};

/// Ready-to-use aspect sentiment pipeline.
pub type AspectSentimentPipeline = crate::pipelines::pipeline::Pipeline<AspectSentimentTask>;
