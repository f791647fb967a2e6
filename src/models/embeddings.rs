//! Pretrained word vectors.
//!
//! Reads GloVe-style text files (`word v1 v2 ... vN` per line) and builds an embedding
//! matrix indexed by vocabulary id.

use crate::error::{PipelineError, Result};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Seed for the unknown-word row.
pub const EMBEDDING_SEED: u64 = 776;

/// Vectors for the words of `vocab` found in a word-vector file.
///
/// Everything but the last `embed_dim` fields of a line is the word, so phrases
/// containing spaces are kept whole. Lines for words outside `vocab` are skipped.
pub fn load_word_vectors(
    path: &Path,
    vocab: &HashMap<String, u32>,
    embed_dim: usize,
) -> Result<HashMap<String, Vec<f32>>> {
    let file = std::fs::File::open(path).map_err(|e| {
        PipelineError::unavailable("word_vectors", format!("cannot open '{}': {e}", path.display()))
    })?;

    let mut vectors = HashMap::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            PipelineError::corrupt("word_vectors", "UTF-8 text", format!("line {}: {e}", line_no + 1))
        })?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() <= embed_dim {
            return Err(PipelineError::corrupt(
                "word_vectors",
                format!("a word followed by {embed_dim} components"),
                format!("{} fields on line {}", fields.len(), line_no + 1),
            ));
        }

        let split = fields.len() - embed_dim;
        let word = fields[..split].join(" ");
        if !vocab.contains_key(&word) {
            continue;
        }
        let vector = fields[split..]
            .iter()
            .map(|v| v.parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| {
                PipelineError::corrupt(
                    "word_vectors",
                    "numeric components",
                    format!("line {}: {e}", line_no + 1),
                )
            })?;
        vectors.insert(word, vector);
    }

    debug!(found = vectors.len(), vocab = vocab.len(), "word vectors loaded");
    Ok(vectors)
}

/// Row-major `[vocab_size, embed_dim]` matrix.
///
/// Row `i` holds the vector of the word with id `i`, or zeros. Row 1 (the unknown word)
/// is drawn uniformly from `±1/sqrt(embed_dim)` with [`EMBEDDING_SEED`] unless a vector
/// overrides it.
pub fn build_embedding_matrix(
    vocab: &HashMap<String, u32>,
    vectors: &HashMap<String, Vec<f32>>,
    embed_dim: usize,
) -> Vec<f32> {
    let vocab_size = vocab.values().map(|&id| id as usize + 1).max().unwrap_or(0);
    let mut matrix = vec![0f32; vocab_size * embed_dim];

    if vocab_size > 1 {
        let bound = 1.0 / (embed_dim as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(EMBEDDING_SEED);
        for v in &mut matrix[embed_dim..2 * embed_dim] {
            *v = rng.random_range(-bound..bound);
        }
    }

    for (word, &id) in vocab {
        if let Some(vector) = vectors.get(word) {
            let start = id as usize * embed_dim;
            matrix[start..start + embed_dim].copy_from_slice(vector);
        }
    }
    matrix
}

/// Embedding tensor built from a word-vector artifact.
pub fn embedding_tensor(
    path: &Path,
    vocab: &HashMap<String, u32>,
    embed_dim: usize,
    device: &Device,
) -> Result<Tensor> {
    let vectors = load_word_vectors(path, vocab, embed_dim)?;
    let matrix = build_embedding_matrix(vocab, &vectors, embed_dim);
    let rows = matrix.len() / embed_dim;
    Ok(Tensor::from_vec(matrix, (rows, embed_dim), device)?)
}
