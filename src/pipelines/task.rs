//! The capability set every task implements.
//!
//! A task splits one inference call into three stages that share a loaded
//! [`ArtifactBundle`]:
//!
//! - [`Task::prepare`] turns one raw input into an encoded item (token ids, masks, offsets),
//! - [`Task::predict`] runs one forward pass over a whole [`PreprocessedBatch`],
//! - [`Task::finalize`] decodes one raw output back into a structured result.
//!
//! [`Pipeline`](crate::pipelines::pipeline::Pipeline) drives the stages; the
//! [`TaskRegistry`](crate::pipelines::registry::TaskRegistry) picks a task by name.

use crate::config::{ConfigSchema, PipelineConfig};
use crate::error::Result;
use crate::loaders::{ArtifactBundle, ArtifactFiles};
use candle_core::Device;

/// Encoded items handed to one forward pass.
#[derive(Debug, Clone)]
pub struct PreprocessedBatch<E> {
    /// One encoded item per input, in input order.
    pub items: Vec<E>,
}

impl<E> PreprocessedBatch<E> {
    /// Wrap encoded items.
    pub fn new(items: Vec<E>) -> Self {
        Self { items }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the batch has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One task: its config schema, how to load its resources, and its three stages.
///
/// All stages are associated functions taking the shared bundle by reference, so a
/// ready pipeline can serve concurrent calls without locking.
pub trait Task: Send + Sync + 'static {
    /// Registry key and the value of the config's `task` field.
    const NAME: &'static str;

    /// Raw caller input.
    type Input: ?Sized + Sync;
    /// Loaded tokenizer, model and label tables.
    type Resources: Send + Sync + 'static;
    /// One preprocessed item.
    type Encoded: Send + Sync;
    /// Undecoded model output for one item.
    type RawOutput: Send;
    /// Structured result returned to the caller.
    type Output: Send;

    /// Families, artifacts and hyperparameters this task accepts.
    fn schema() -> ConfigSchema;

    /// Build resources from verified artifact files.
    fn load(config: &PipelineConfig, files: &ArtifactFiles, device: &Device)
        -> Result<Self::Resources>;

    /// Preprocess one input. Must be deterministic.
    fn prepare(
        bundle: &ArtifactBundle<Self::Resources>,
        config: &PipelineConfig,
        input: &Self::Input,
    ) -> Result<Self::Encoded>;

    /// Forward pass over a batch, one raw output per item.
    fn predict(
        bundle: &ArtifactBundle<Self::Resources>,
        batch: &PreprocessedBatch<Self::Encoded>,
    ) -> Result<Vec<Self::RawOutput>>;

    /// Decode one raw output, aligning it to the raw input.
    fn finalize(
        bundle: &ArtifactBundle<Self::Resources>,
        config: &PipelineConfig,
        raw: Self::RawOutput,
        encoded: &Self::Encoded,
        input: &Self::Input,
    ) -> Result<Self::Output>;
}
