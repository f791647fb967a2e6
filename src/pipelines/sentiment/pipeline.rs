use crate::config::{ConfigSchema, FamilySchema, FieldKind, LabelRule, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loaders::{ArtifactBundle, ArtifactFiles};
use crate::models::bag_of_embeddings::BagDims;
use crate::models::{BagOfEmbeddingsClassifier, ModernBertClassifier, SequenceClassifier};
use crate::pipelines::task::{PreprocessedBatch, Task};
use crate::pipelines::utils::decode::classify;
use crate::pipelines::utils::text::{
    encode_text, load_tokenizer_file, pad_sequences, pad_token_id, word_level_tokenizer,
    TextEncoding,
};
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

const BAG_OF_EMBEDDINGS: &str = "bag_of_embeddings";
const MODERNBERT: &str = "modernbert";

/// A sentiment prediction with label and confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// The predicted label, one of the configured labels.
    pub label: String,
    /// Probability of the predicted label (0.0 to 1.0).
    pub score: f32,
}

/// Loaded tokenizer and classifier.
pub struct SentimentResources {
    tokenizer: Tokenizer,
    model: Box<dyn SequenceClassifier>,
    pad_id: u32,
    word_level: bool,
}

impl std::fmt::Debug for SentimentResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentResources")
            .field("pad_id", &self.pad_id)
            .field("word_level", &self.word_level)
            .finish_non_exhaustive()
    }
}

impl SentimentResources {
    /// The tokenizer inputs are encoded with.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Number of classes the model outputs.
    pub fn num_labels(&self) -> usize {
        self.model.num_labels()
    }
}

/// Whole-text sentiment classification.
pub struct SentimentTask;

impl Task for SentimentTask {
    const NAME: &'static str = "sentiment";

    type Input = str;
    type Resources = SentimentResources;
    type Encoded = TextEncoding;
    type RawOutput = Vec<f32>;
    type Output = Sentiment;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(Self::NAME, LabelRule::at_least(2))
            .family(
                FamilySchema::new(BAG_OF_EMBEDDINGS)
                    .artifacts(&["weights", "vocab"])
                    .hyperparameter("embed_dim", FieldKind::PositiveInteger),
            )
            .family(FamilySchema::new(MODERNBERT).artifacts(&["weights", "model_config", "tokenizer"]))
    }

    fn load(config: &PipelineConfig, files: &ArtifactFiles, device: &Device) -> Result<SentimentResources> {
        let preprocessing = config.preprocessing();
        match config.family() {
            BAG_OF_EMBEDDINGS => {
                let tokenizer = word_level_tokenizer(files.path("vocab")?, &preprocessing.unknown_token)?;
                let dims = BagDims {
                    vocab_size: tokenizer.get_vocab_size(true),
                    embed_dim: config.usize_param("embed_dim")?,
                    num_labels: config.labels().len(),
                };
                let model = BagOfEmbeddingsClassifier::load(files.path("weights")?, dims, device)?;
                Ok(SentimentResources {
                    pad_id: pad_token_id(&tokenizer, &preprocessing.pad_token),
                    tokenizer,
                    model: Box::new(model),
                    word_level: true,
                })
            }
            MODERNBERT => {
                let tokenizer = load_tokenizer_file("tokenizer", files.path("tokenizer")?)?;
                let model = ModernBertClassifier::load(
                    files.path("model_config")?,
                    files.path("weights")?,
                    config.labels(),
                    device,
                )?;
                Ok(SentimentResources {
                    pad_id: pad_token_id(&tokenizer, &preprocessing.pad_token),
                    tokenizer,
                    model: Box::new(model),
                    word_level: false,
                })
            }
            other => Err(PipelineError::config(
                "family",
                format!("task `{}` has no family `{other}`", Self::NAME),
            )),
        }
    }

    fn prepare(
        bundle: &ArtifactBundle<SentimentResources>,
        config: &PipelineConfig,
        input: &str,
    ) -> Result<TextEncoding> {
        let resources = bundle.resources();
        let preprocessing = config.preprocessing();
        encode_text(
            &resources.tokenizer,
            input,
            preprocessing,
            resources.word_level && preprocessing.lowercase,
            !resources.word_level,
        )
    }

    fn predict(
        bundle: &ArtifactBundle<SentimentResources>,
        batch: &PreprocessedBatch<TextEncoding>,
    ) -> Result<Vec<Vec<f32>>> {
        let resources = bundle.resources();
        let sequences: Vec<&[u32]> = batch.items.iter().map(|e| e.ids.as_slice()).collect();
        let (ids, mask, max_len) = pad_sequences(&sequences, resources.pad_id);

        let device = bundle.device();
        let input_ids = Tensor::from_vec(ids, (sequences.len(), max_len), device)?;
        let attention_mask = Tensor::from_vec(mask, (sequences.len(), max_len), device)?;

        let logits = resources.model.forward(&input_ids, &attention_mask)?;
        let (rows, cols) = logits.dims2()?;
        if rows != sequences.len() || cols != resources.model.num_labels() {
            return Err(PipelineError::Inference(format!(
                "expected logits [{}, {}], got [{rows}, {cols}]",
                sequences.len(),
                resources.model.num_labels()
            )));
        }
        Ok(logits.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }

    fn finalize(
        _bundle: &ArtifactBundle<SentimentResources>,
        config: &PipelineConfig,
        raw: Vec<f32>,
        _encoded: &TextEncoding,
        _input: &str,
    ) -> Result<Sentiment> {
        let (label, score) = classify("sentiment logits", &raw, config.labels())?;
        Ok(Sentiment {
            label: label.to_string(),
            score,
        })
    }
}
