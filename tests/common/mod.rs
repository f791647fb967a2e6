//! Fixture artifacts written to a scratch directory per test.

#![allow(dead_code)]

use candle_core::{Device, Tensor};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// Scratch directory removed on drop.
pub struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "sgnlp-{label}-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_tensors(&self, name: &str, tensors: &[(&str, &[f32], &[usize])]) -> PathBuf {
        let map: HashMap<String, Tensor> = tensors
            .iter()
            .map(|(key, data, shape)| {
                let tensor = Tensor::from_slice(data, *shape, &Device::Cpu).unwrap();
                (key.to_string(), tensor)
            })
            .collect();
        let path = self.path.join(name);
        candle_core::safetensors::save(&map, &path).unwrap();
        path
    }

    pub fn write_config(&self, config: &Value) -> PathBuf {
        self.write("config.json", &serde_json::to_string_pretty(config).unwrap())
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ln(4): softmax([0, ln 4]) == [0.2, 0.8]
pub const LN4: f32 = 1.386_294_4;

/// Bag-of-embeddings sentiment model: "good" leans positive, "bad" negative.
pub fn sentiment_fixture(dir: &TempDirGuard) -> Value {
    dir.write(
        "vocab.json",
        r#"{"[PAD]": 0, "[UNK]": 1, "good": 2, "bad": 3}"#,
    );
    dir.write_tensors(
        "weights.safetensors",
        &[
            ("embeddings.weight", &[0., 0., 0., 0., 1., 0., 0., 1.], &[4, 2]),
            ("classifier.weight", &[0., LN4, LN4, 0.], &[2, 2]),
            ("classifier.bias", &[0., 0.], &[2]),
        ],
    );
    json!({
        "task": "sentiment",
        "family": "bag_of_embeddings",
        "labels": ["negative", "positive"],
        "artifacts": {
            "weights": { "path": "weights.safetensors" },
            "vocab": { "path": "vocab.json" }
        },
        "hyperparameters": { "embed_dim": 2 }
    })
}

pub const ASPECT_VOCAB: &str = r#"{"[PAD]": 0, "[UNK]": 1, "the": 2, "food": 3, "was": 4,
"great": 5, "but": 6, "service": 7, "slow": 8, ".": 9}"#;

/// SenticGCN with a ten-word vocab and two-wide layers.
pub fn aspect_fixture(dir: &TempDirGuard) -> Value {
    dir.write("vocab.json", ASPECT_VOCAB);
    dir.write_tensors(
        "senticgcn.safetensors",
        &[
            (
                "embeddings.weight",
                &[
                    0., 0., 0., 0., 0.1, 0.1, 0.6, -0.2, 0.1, 0.0, 0.9, 0.4, 0.0, 0.1, -0.3,
                    0.5, -0.7, -0.6, 0.0, 0.0,
                ],
                &[10, 2],
            ),
            ("text_proj.weight", &[1., 0.5, -0.5, 1.], &[2, 2]),
            ("text_proj.bias", &[0.1, -0.1], &[2]),
            ("gc1.weight", &[0.8, 0.2, 0.1, 0.9], &[2, 2]),
            ("gc1.bias", &[0.05, 0.05], &[2]),
            ("gc2.weight", &[0.7, -0.2, 0.3, 0.6], &[2, 2]),
            ("gc2.bias", &[0.0, 0.1], &[2]),
            ("classifier.weight", &[-1., -1., 0.2, 0.3, 1., 1.], &[3, 2]),
            ("classifier.bias", &[0., 0., 0.], &[3]),
        ],
    );
    json!({
        "task": "aspect_sentiment",
        "family": "sentic_gcn",
        "artifacts": {
            "weights": { "path": "senticgcn.safetensors" },
            "vocab": { "path": "vocab.json" }
        },
        "hyperparameters": { "embed_dim": 2, "hidden_dim": 2, "window": 2 }
    })
}

/// Per-token tagger over a tiny vocab; "new" and "york" tag as a LOC span.
pub fn tagger_fixture(dir: &TempDirGuard) -> Value {
    dir.write(
        "vocab.json",
        r#"{"[PAD]": 0, "[UNK]": 1, "i": 2, "love": 3, "new": 4, "york": 5}"#,
    );
    // One-hot embeddings into 3 dims: O, B-LOC, I-LOC.
    dir.write_tensors(
        "tagger.safetensors",
        &[
            (
                "embeddings.weight",
                &[
                    0., 0., 0., 1., 0., 0., 1., 0., 0., 1., 0., 0., 0., 1., 0., 0., 0., 1.,
                ],
                &[6, 3],
            ),
            (
                "classifier.weight",
                &[4., 0., 0., 0., 4., 0., 0., 0., 4.],
                &[3, 3],
            ),
            ("classifier.bias", &[0., 0., 0.], &[3]),
        ],
    );
    json!({
        "task": "token_classification",
        "family": "bag_of_embeddings",
        "labels": ["O", "B-LOC", "I-LOC"],
        "artifacts": {
            "weights": { "path": "tagger.safetensors" },
            "vocab": { "path": "vocab.json" }
        },
        "hyperparameters": { "embed_dim": 3 }
    })
}
