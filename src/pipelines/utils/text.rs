//! Tokenization shared by the task preprocessors.

use crate::config::PreprocessingConfig;
use crate::error::{PipelineError, Result};
use std::path::Path;
use tokenizers::decoders::DecoderWrapper;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::models::ModelWrapper;
use tokenizers::normalizers::NormalizerWrapper;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::processors::PostProcessorWrapper;
use tokenizers::{Tokenizer, TokenizerBuilder};

/// Token ids for one text, with character offsets back into the raw input.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEncoding {
    /// Vocabulary ids, at most `max_seq_len` of them.
    pub ids: Vec<u32>,
    /// `(start, end)` character offsets of each token in the raw text.
    pub offsets: Vec<(usize, usize)>,
    /// Whether tokens past `max_seq_len` were dropped.
    pub truncated: bool,
}

impl TextEncoding {
    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Load a `tokenizer.json` file.
pub fn load_tokenizer_file(artifact: &str, path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path).map_err(|e| {
        PipelineError::corrupt(
            artifact,
            "a HuggingFace tokenizer.json",
            format!("unreadable file '{}': {e}", path.display()),
        )
    })
}

/// Build a whitespace/punctuation word-level tokenizer from a `{token: id}` JSON vocab.
///
/// Out-of-vocabulary words are substituted with `unknown_token`, which must be in the vocab.
pub fn word_level_tokenizer(vocab_path: &Path, unknown_token: &str) -> Result<Tokenizer> {
    let path_str = vocab_path.to_str().ok_or_else(|| {
        PipelineError::unavailable(
            "vocab",
            format!("path '{}' is not valid UTF-8", vocab_path.display()),
        )
    })?;

    let model = WordLevel::from_file(path_str, unknown_token.to_string()).map_err(|e| {
        PipelineError::corrupt("vocab", "a JSON object mapping token to id", e)
    })?;

    let built = TokenizerBuilder::<
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    >::new()
    .with_model(model.into())
    .with_pre_tokenizer(Some(Whitespace::default().into()))
    .build()
    .map_err(|e| PipelineError::Unexpected(format!("Failed to assemble tokenizer: {e}")))?;

    let tokenizer = Tokenizer::from(built);
    if tokenizer.token_to_id(unknown_token).is_none() {
        return Err(PipelineError::config(
            "preprocessing.unknown_token",
            format!("`{unknown_token}` is not in the vocab"),
        ));
    }
    Ok(tokenizer)
}

/// Id used to pad batches: the configured pad token, then common fallbacks, then 0.
pub fn pad_token_id(tokenizer: &Tokenizer, pad_token: &str) -> u32 {
    tokenizer
        .token_to_id(pad_token)
        .or_else(|| tokenizer.get_padding().map(|p| p.pad_id))
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(0)
}

/// Tokenize `text` under the preprocessing policy.
///
/// Empty or whitespace-only text is rejected. Encodings longer than `max_seq_len`
/// are truncated when `truncate` is set and rejected otherwise.
pub fn encode_text(
    tokenizer: &Tokenizer,
    text: &str,
    preprocessing: &PreprocessingConfig,
    lowercase: bool,
    add_special_tokens: bool,
) -> Result<TextEncoding> {
    if text.trim().is_empty() {
        return Err(PipelineError::InputValidation(
            "text is empty or whitespace-only".to_string(),
        ));
    }

    let normalized = if lowercase {
        lowercase_preserving_offsets(text)
    } else {
        text.to_string()
    };

    let encoding = tokenizer
        .encode_char_offsets(normalized.as_str(), add_special_tokens)
        .map_err(|e| {
            PipelineError::InputValidation(format!(
                "Tokenization failed on '{}': {}",
                preview(text),
                e
            ))
        })?;

    let mut ids = encoding.get_ids().to_vec();
    let mut offsets = encoding.get_offsets().to_vec();
    if ids.is_empty() {
        return Err(PipelineError::InputValidation(format!(
            "'{}' produced no tokens",
            preview(text)
        )));
    }

    let max = preprocessing.max_seq_len;
    let truncated = ids.len() > max;
    if truncated {
        if !preprocessing.truncate {
            return Err(PipelineError::InputValidation(format!(
                "input has {} tokens, more than max_seq_len {max}",
                ids.len()
            )));
        }
        let last = ids.last().copied().zip(offsets.last().copied());
        ids.truncate(max);
        offsets.truncate(max);
        // Keep the closing special token (e.g. [SEP]) in place.
        if let (true, Some((id, offset))) = (add_special_tokens, last) {
            ids[max - 1] = id;
            offsets[max - 1] = offset;
        }
    }

    Ok(TextEncoding {
        ids,
        offsets,
        truncated,
    })
}

/// Right-pad sequences to a common length.
///
/// Returns flattened ids, flattened attention mask and the padded length.
pub fn pad_sequences(sequences: &[&[u32]], pad_id: u32) -> (Vec<u32>, Vec<u32>, usize) {
    let max_len = sequences.iter().map(|s| s.len()).max().unwrap_or(0);

    let mut all_token_ids: Vec<u32> = Vec::with_capacity(sequences.len() * max_len);
    let mut all_attention_masks: Vec<u32> = Vec::with_capacity(sequences.len() * max_len);

    for seq in sequences {
        let mut token_ids = seq.to_vec();
        let mut attention_mask = vec![1u32; seq.len()];
        token_ids.resize(max_len, pad_id);
        attention_mask.resize(max_len, 0);
        all_token_ids.extend(token_ids);
        all_attention_masks.extend(attention_mask);
    }

    (all_token_ids, all_attention_masks, max_len)
}

/// Lowercase char by char so character offsets stay valid for the raw text.
pub(crate) fn lowercase_preserving_offsets(text: &str) -> String {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Substring of `text` between character offsets.
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

pub(crate) fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
