//! Model capability traits.
//!
//! Tasks talk to models only through these traits, so a task can run any family that
//! produces the right logits.

use candle_core::Tensor;

/// One row of class logits per sequence.
pub trait SequenceClassifier: Send + Sync {
    /// `input_ids` and `attention_mask` are `[batch, seq]` u32. Returns `[batch, num_labels]`.
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor>;

    /// Number of output classes.
    fn num_labels(&self) -> usize;
}

/// One row of class logits per token.
pub trait TokenTagger: Send + Sync {
    /// `input_ids` and `attention_mask` are `[batch, seq]` u32. Returns `[batch, seq, num_labels]`.
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor>;

    /// Number of tag classes.
    fn num_labels(&self) -> usize;
}
