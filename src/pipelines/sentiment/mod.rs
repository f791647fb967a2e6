//! Sentiment analysis pipeline.
//!
//! Classify a whole text into one of the configured labels.
//!
//! ## Families
//!
//! - `bag_of_embeddings`: word-level vocab (`vocab`, JSON `{token: id}`) and a small
//!   safetensors checkpoint (`weights`). Needs `hyperparameters.embed_dim`.
//! - `modernbert`: HF `config.json` (`model_config`), `tokenizer.json` (`tokenizer`) and
//!   safetensors `weights`.
//!
//! ## Decision rule
//!
//! Softmax over the logits; the label is the argmax, ties broken by the lowest class
//! index; the score is the winning probability.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sgnlp::sentiment::SentimentPipeline;
//!
//! # fn main() -> sgnlp::error::Result<()> {
//! let pipeline = SentimentPipeline::from_config("models/sentiment/config.json")?;
//! let sentiment = pipeline.run("I love this movie!")?;
//! println!("{} ({:.2})", sentiment.label, sentiment.score);
//! # Ok(())
//! # }
//! ```

mod pipeline;

pub use pipeline::{Sentiment, SentimentResources, SentimentTask};

/// Ready-to-use sentiment pipeline.
pub type SentimentPipeline = crate::pipelines::pipeline::Pipeline<SentimentTask>;
