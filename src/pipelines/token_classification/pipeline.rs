use super::bio::{group_spans, TagScheme};
use crate::config::{ConfigSchema, FamilySchema, FieldKind, LabelRule, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loaders::{ArtifactBundle, ArtifactFiles};
use crate::models::bag_of_embeddings::BagDims;
use crate::models::{BagOfEmbeddingsTagger, TokenTagger};
use crate::pipelines::task::{PreprocessedBatch, Task};
use crate::pipelines::utils::decode::{argmax, check_row, softmax};
use crate::pipelines::utils::text::{
    char_slice, encode_text, pad_sequences, pad_token_id, word_level_tokenizer, TextEncoding,
};
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

const BAG_OF_EMBEDDINGS: &str = "bag_of_embeddings";

/// One tagged span of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSpan {
    /// Span type (`LOC` for `B-LOC`/`I-LOC`).
    pub label: String,
    /// Start character offset in the raw input.
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// The raw input between `start` and `end`.
    pub text: String,
    /// Mean probability of the span's token tags.
    pub score: f32,
}

/// Every span found in one input, in text order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSpans {
    /// The spans.
    pub spans: Vec<TaggedSpan>,
}

/// Loaded tokenizer, tagger and tag scheme.
pub struct TokenClassificationResources {
    tokenizer: Tokenizer,
    model: Box<dyn TokenTagger>,
    scheme: TagScheme,
    pad_id: u32,
    min_score: f32,
}

impl TokenClassificationResources {
    /// The tokenizer inputs are encoded with.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Parsed BIO labels.
    pub fn scheme(&self) -> &TagScheme {
        &self.scheme
    }
}

/// BIO span tagging.
pub struct TokenClassificationTask;

impl Task for TokenClassificationTask {
    const NAME: &'static str = "token_classification";

    type Input = str;
    type Resources = TokenClassificationResources;
    type Encoded = TextEncoding;
    type RawOutput = Vec<Vec<f32>>;
    type Output = TaggedSpans;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(Self::NAME, LabelRule::at_least(2)).family(
            FamilySchema::new(BAG_OF_EMBEDDINGS)
                .artifacts(&["weights", "vocab"])
                .hyperparameter("embed_dim", FieldKind::PositiveInteger)
                .optional_hyperparameter("min_score", FieldKind::Number),
        )
    }

    fn load(
        config: &PipelineConfig,
        files: &ArtifactFiles,
        device: &Device,
    ) -> Result<TokenClassificationResources> {
        let scheme = TagScheme::from_labels(config.labels())?;
        let preprocessing = config.preprocessing();
        let tokenizer = word_level_tokenizer(files.path("vocab")?, &preprocessing.unknown_token)?;
        let dims = BagDims {
            vocab_size: tokenizer.get_vocab_size(true),
            embed_dim: config.usize_param("embed_dim")?,
            num_labels: scheme.len(),
        };
        let model = BagOfEmbeddingsTagger::load(files.path("weights")?, dims, device)?;

        Ok(TokenClassificationResources {
            pad_id: pad_token_id(&tokenizer, &preprocessing.pad_token),
            min_score: config.f64_param_or("min_score", 0.0)? as f32,
            tokenizer,
            model: Box::new(model),
            scheme,
        })
    }

    fn prepare(
        bundle: &ArtifactBundle<TokenClassificationResources>,
        config: &PipelineConfig,
        input: &str,
    ) -> Result<TextEncoding> {
        let preprocessing = config.preprocessing();
        encode_text(
            &bundle.resources().tokenizer,
            input,
            preprocessing,
            preprocessing.lowercase,
            false,
        )
    }

    fn predict(
        bundle: &ArtifactBundle<TokenClassificationResources>,
        batch: &PreprocessedBatch<TextEncoding>,
    ) -> Result<Vec<Vec<Vec<f32>>>> {
        let resources = bundle.resources();
        let sequences: Vec<&[u32]> = batch.items.iter().map(|e| e.ids.as_slice()).collect();
        let (ids, mask, max_len) = pad_sequences(&sequences, resources.pad_id);

        let device = bundle.device();
        let input_ids = Tensor::from_vec(ids, (sequences.len(), max_len), device)?;
        let attention_mask = Tensor::from_vec(mask, (sequences.len(), max_len), device)?;

        let logits = resources.model.forward(&input_ids, &attention_mask)?;
        let (rows, len, cols) = logits.dims3()?;
        if rows != sequences.len() || len != max_len || cols != resources.model.num_labels() {
            return Err(PipelineError::Inference(format!(
                "expected logits [{}, {max_len}, {}], got [{rows}, {len}, {cols}]",
                sequences.len(),
                resources.model.num_labels()
            )));
        }

        let logits = logits.to_dtype(DType::F32)?.to_vec3::<f32>()?;
        Ok(logits
            .into_iter()
            .zip(&sequences)
            .map(|(mut rows, seq)| {
                rows.truncate(seq.len());
                rows
            })
            .collect())
    }

    fn finalize(
        bundle: &ArtifactBundle<TokenClassificationResources>,
        _config: &PipelineConfig,
        raw: Vec<Vec<f32>>,
        encoded: &TextEncoding,
        input: &str,
    ) -> Result<TaggedSpans> {
        let resources = bundle.resources();
        if raw.len() != encoded.len() {
            return Err(PipelineError::Postprocess(format!(
                "expected {} token rows, got {}",
                encoded.len(),
                raw.len()
            )));
        }

        let predictions = raw
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let what = format!("token {i}");
                check_row(&what, row, resources.scheme.len())?;
                argmax(&softmax(row)).ok_or_else(|| {
                    PipelineError::Postprocess(format!("{what}: no class scores to decode"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let spans = group_spans(&resources.scheme, &predictions)
            .into_iter()
            .filter(|span| span.score >= resources.min_score)
            .map(|span| {
                let start = encoded.offsets[span.start].0;
                let end = encoded.offsets[span.end - 1].1;
                TaggedSpan {
                    label: span.kind,
                    start,
                    end,
                    text: char_slice(input, start, end),
                    score: span.score,
                }
            })
            .collect();

        Ok(TaggedSpans { spans })
    }
}
