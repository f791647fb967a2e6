use super::graph::{adjacency, aspect_mask, load_sentic_lexicon, position_weights, token_range, SenticLexicon};
use super::input::AspectInput;
use crate::config::{ConfigSchema, FamilySchema, FieldKind, LabelRule, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::loaders::{ArtifactBundle, ArtifactFiles};
use crate::models::embeddings::embedding_tensor;
use crate::models::{GraphBatch, SenticGcn, SenticGcnDims};
use crate::pipelines::task::{PreprocessedBatch, Task};
use crate::pipelines::utils::decode::classify;
use crate::pipelines::utils::text::{
    char_slice, encode_text, pad_token_id, preview, word_level_tokenizer, TextEncoding,
};
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

const SENTIC_GCN: &str = "sentic_gcn";
const DEFAULT_POLARITIES: &[&str] = &["negative", "neutral", "positive"];

/// Polarity towards one aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectPolarity {
    /// The aspect term as given.
    pub aspect: String,
    /// Character span `(start, end)` of the scored occurrence in the raw text.
    pub span: (usize, usize),
    /// Predicted polarity.
    pub label: String,
    /// Probability of the predicted polarity.
    pub score: f32,
}

/// Polarities for every aspect of one input, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectSentiments {
    /// One entry per aspect.
    pub aspects: Vec<AspectPolarity>,
}

/// Model inputs for one `(text, aspect)` pair.
#[derive(Debug, Clone)]
pub struct AspectEncoding {
    /// The aspect term.
    pub aspect: String,
    /// Character span of the aspect in the raw text.
    pub span: (usize, usize),
    /// Token ids of the whole text.
    pub ids: Vec<u32>,
    /// `len x len` adjacency, row-major.
    pub adjacency: Vec<f32>,
    /// Per-token context weights.
    pub position_weights: Vec<f32>,
    /// Per-token aspect indicator.
    pub aspect_mask: Vec<f32>,
}

/// Loaded tokenizer, SenticGCN weights and lexicon.
pub struct AspectSentimentResources {
    tokenizer: Tokenizer,
    model: SenticGcn,
    lexicon: SenticLexicon,
    window: usize,
    pad_id: u32,
}

impl AspectSentimentResources {
    /// The tokenizer inputs are encoded with.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// SenticNet lexicon (empty when no `sentic_lexicon` artifact was given).
    pub fn lexicon(&self) -> &SenticLexicon {
        &self.lexicon
    }
}

/// Aspect-level sentiment classification.
pub struct AspectSentimentTask;

impl Task for AspectSentimentTask {
    const NAME: &'static str = "aspect_sentiment";

    type Input = AspectInput;
    type Resources = AspectSentimentResources;
    type Encoded = Vec<AspectEncoding>;
    type RawOutput = Vec<Vec<f32>>;
    type Output = AspectSentiments;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(Self::NAME, LabelRule::exactly(3, DEFAULT_POLARITIES)).family(
            FamilySchema::new(SENTIC_GCN)
                .artifacts(&["weights", "vocab"])
                .optional_artifacts(&["sentic_lexicon", "word_vectors"])
                .hyperparameter("embed_dim", FieldKind::PositiveInteger)
                .hyperparameter("hidden_dim", FieldKind::PositiveInteger)
                .hyperparameter("window", FieldKind::PositiveInteger),
        )
    }

    fn load(
        config: &PipelineConfig,
        files: &ArtifactFiles,
        device: &Device,
    ) -> Result<AspectSentimentResources> {
        let preprocessing = config.preprocessing();
        let tokenizer = word_level_tokenizer(files.path("vocab")?, &preprocessing.unknown_token)?;

        let dims = SenticGcnDims {
            vocab_size: tokenizer.get_vocab_size(true),
            embed_dim: config.usize_param("embed_dim")?,
            hidden_dim: config.usize_param("hidden_dim")?,
            num_labels: config.labels().len(),
        };

        let embedding_matrix = match files.optional("word_vectors") {
            Some(path) => Some(embedding_tensor(
                path,
                &tokenizer.get_vocab(true),
                dims.embed_dim,
                device,
            )?),
            None => None,
        };
        let model = SenticGcn::load(files.path("weights")?, embedding_matrix, dims, device)?;

        let lexicon = match files.optional("sentic_lexicon") {
            Some(path) => load_sentic_lexicon(path)?,
            None => SenticLexicon::new(),
        };

        Ok(AspectSentimentResources {
            pad_id: pad_token_id(&tokenizer, &preprocessing.pad_token),
            window: config.usize_param("window")?,
            tokenizer,
            model,
            lexicon,
        })
    }

    fn prepare(
        bundle: &ArtifactBundle<AspectSentimentResources>,
        config: &PipelineConfig,
        input: &AspectInput,
    ) -> Result<Vec<AspectEncoding>> {
        if input.aspects.is_empty() {
            return Err(PipelineError::InputValidation(format!(
                "no aspects given for '{}'",
                preview(&input.text)
            )));
        }

        let resources = bundle.resources();
        let preprocessing = config.preprocessing();
        let encoding: TextEncoding = encode_text(
            &resources.tokenizer,
            &input.text,
            preprocessing,
            preprocessing.lowercase,
            false,
        )?;

        let sentic: Vec<f32> = encoding
            .offsets
            .iter()
            .map(|&(start, end)| {
                let word = char_slice(&input.text, start, end).to_lowercase();
                resources.lexicon.get(&word).copied().unwrap_or(0.0)
            })
            .collect();

        input
            .aspects
            .iter()
            .enumerate()
            .map(|(index, aspect)| {
                let span = input.span_of(index).ok_or_else(|| {
                    PipelineError::InputValidation(format!(
                        "aspect `{aspect}` does not occur in '{}'",
                        preview(&input.text)
                    ))
                })?;
                let tokens = token_range(&encoding.offsets, span).ok_or_else(|| {
                    PipelineError::InputValidation(format!(
                        "aspect `{aspect}` lies past max_seq_len {}",
                        preprocessing.max_seq_len
                    ))
                })?;

                let len = encoding.len();
                Ok(AspectEncoding {
                    aspect: aspect.clone(),
                    span,
                    ids: encoding.ids.clone(),
                    adjacency: adjacency(len, resources.window, &sentic, tokens),
                    position_weights: position_weights(len, tokens),
                    aspect_mask: aspect_mask(len, tokens),
                })
            })
            .collect()
    }

    fn predict(
        bundle: &ArtifactBundle<AspectSentimentResources>,
        batch: &PreprocessedBatch<Vec<AspectEncoding>>,
    ) -> Result<Vec<Vec<Vec<f32>>>> {
        let resources = bundle.resources();
        let pairs: Vec<&AspectEncoding> = batch.items.iter().flatten().collect();
        let rows = pairs.len();
        let max_len = pairs.iter().map(|p| p.ids.len()).max().unwrap_or(0);

        let mut ids = vec![resources.pad_id; rows * max_len];
        let mut mask = vec![0f32; rows * max_len];
        let mut weights = vec![0f32; rows * max_len];
        let mut aspect = vec![0f32; rows * max_len];
        let mut adj = vec![0f32; rows * max_len * max_len];

        for (r, pair) in pairs.iter().enumerate() {
            let len = pair.ids.len();
            let base = r * max_len;
            ids[base..base + len].copy_from_slice(&pair.ids);
            mask[base..base + len].fill(1.0);
            weights[base..base + len].copy_from_slice(&pair.position_weights);
            aspect[base..base + len].copy_from_slice(&pair.aspect_mask);
            for i in 0..len {
                let dst = (r * max_len + i) * max_len;
                adj[dst..dst + len].copy_from_slice(&pair.adjacency[i * len..(i + 1) * len]);
            }
        }

        let device = bundle.device();
        let graph = GraphBatch {
            input_ids: Tensor::from_vec(ids, (rows, max_len), device)?,
            attention_mask: Tensor::from_vec(mask, (rows, max_len), device)?,
            position_weights: Tensor::from_vec(weights, (rows, max_len), device)?,
            aspect_mask: Tensor::from_vec(aspect, (rows, max_len), device)?,
            adjacency: Tensor::from_vec(adj, (rows, max_len, max_len), device)?,
        };

        let logits = resources.model.forward(&graph)?;
        let (out_rows, cols) = logits.dims2()?;
        if out_rows != rows || cols != resources.model.dims().num_labels {
            return Err(PipelineError::Inference(format!(
                "expected logits [{rows}, {}], got [{out_rows}, {cols}]",
                resources.model.dims().num_labels
            )));
        }

        let mut logits = logits.to_dtype(DType::F32)?.to_vec2::<f32>()?.into_iter();
        Ok(batch
            .items
            .iter()
            .map(|pairs| logits.by_ref().take(pairs.len()).collect())
            .collect())
    }

    fn finalize(
        _bundle: &ArtifactBundle<AspectSentimentResources>,
        config: &PipelineConfig,
        raw: Vec<Vec<f32>>,
        encoded: &Vec<AspectEncoding>,
        _input: &AspectInput,
    ) -> Result<AspectSentiments> {
        if raw.len() != encoded.len() {
            return Err(PipelineError::Postprocess(format!(
                "expected {} aspect rows, got {}",
                encoded.len(),
                raw.len()
            )));
        }

        let aspects = encoded
            .iter()
            .zip(raw)
            .map(|(pair, row)| {
                let (label, score) =
                    classify(&format!("aspect `{}`", pair.aspect), &row, config.labels())?;
                Ok(AspectPolarity {
                    aspect: pair.aspect.clone(),
                    span: pair.span,
                    label: label.to_string(),
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AspectSentiments { aspects })
    }
}
