//! # sgnlp
//!
//! Config-driven NLP inference pipelines on candle: sentence sentiment, aspect-level
//! sentiment (SenticGCN) and BIO span tagging.
//!
//! Every pipeline is built from one config document (`task`, `family`, `labels`,
//! `artifacts`, `preprocessing`, `hyperparameters`). Artifacts are fetched from disk or the
//! HuggingFace Hub, verified, and shared between pipelines that reference the same set.
//!
//! ```rust,no_run
//! use sgnlp::aspect_sentiment::{AspectInput, AspectSentimentPipeline};
//!
//! # fn main() -> sgnlp::error::Result<()> {
//! let pipeline = AspectSentimentPipeline::from_config("models/senticgcn/config.json")?;
//! let input = AspectInput::new("The food was great but the service was slow.", ["food", "service"]);
//! for polarity in pipeline.run(&input)?.aspects {
//!     println!("{}: {} ({:.2})", polarity.aspect, polarity.label, polarity.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod loaders;
pub mod models;
pub mod pipelines;

pub use config::{ConfigSource, PipelineConfig, PreprocessingConfig};
pub use error::{PipelineError, Result};
pub use loaders::{ArtifactBundle, ArtifactFiles, ArtifactLoader};
pub use pipelines::pipeline::{BatchOutput, Pipeline, PipelineBuilder, PipelineState};
pub use pipelines::registry::{DynPipeline, TaskRegistry};
pub use pipelines::stats::PipelineStats;
pub use pipelines::task::{PreprocessedBatch, Task};
pub use pipelines::utils::DeviceRequest;
pub use pipelines::{aspect_sentiment, sentiment, token_classification};

use once_cell::sync::Lazy;

static BUILTIN: Lazy<TaskRegistry> = Lazy::new(TaskRegistry::builtin);

/// Resolve a config document against whichever built-in task it names.
///
/// Resolution never touches the network or the artifact files themselves.
pub fn resolve(source: impl Into<ConfigSource>) -> Result<PipelineConfig> {
    BUILTIN.resolve(source)
}
