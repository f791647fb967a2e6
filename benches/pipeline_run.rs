use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use sgnlp::aspect_sentiment::{AspectInput, AspectSentimentPipeline};
use sgnlp::sentiment::SentimentPipeline;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const WORDS: &[&str] = &["the", "food", "was", "great", "but", "service", "slow", "good", "bad"];
const DIM: usize = 16;

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sgnlp-bench-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_vocab(dir: &Path) {
    let mut vocab: HashMap<&str, usize> = HashMap::from([("[PAD]", 0), ("[UNK]", 1)]);
    for (i, word) in WORDS.iter().enumerate() {
        vocab.insert(word, i + 2);
    }
    std::fs::write(dir.join("vocab.json"), serde_json::to_string(&vocab).unwrap()).unwrap();
}

// Deterministic small weights; values only need to be finite.
fn tensor(rows: usize, cols: usize, salt: usize) -> Tensor {
    let data: Vec<f32> = (0..rows * cols)
        .map(|i| (((i * 31 + salt * 17) % 23) as f32 - 11.0) / 23.0)
        .collect();
    if cols == 1 {
        Tensor::from_vec(data, rows, &Device::Cpu).unwrap()
    } else {
        Tensor::from_vec(data, (rows, cols), &Device::Cpu).unwrap()
    }
}

fn write_weights(path: &Path, tensors: Vec<(&str, Tensor)>) {
    let map: HashMap<String, Tensor> = tensors.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    candle_core::safetensors::save(&map, path).unwrap();
}

fn sentiment_pipeline(dir: &Path) -> SentimentPipeline {
    let vocab_size = WORDS.len() + 2;
    write_weights(
        &dir.join("bag.safetensors"),
        vec![
            ("embeddings.weight", tensor(vocab_size, DIM, 1)),
            ("classifier.weight", tensor(2, DIM, 2)),
            ("classifier.bias", tensor(2, 1, 3)),
        ],
    );
    SentimentPipeline::from_config(json!({
        "task": "sentiment",
        "family": "bag_of_embeddings",
        "labels": ["negative", "positive"],
        "artifacts": {
            "weights": { "path": dir.join("bag.safetensors") },
            "vocab": { "path": dir.join("vocab.json") }
        },
        "hyperparameters": { "embed_dim": DIM }
    }))
    .unwrap()
}

fn aspect_pipeline(dir: &Path) -> AspectSentimentPipeline {
    let vocab_size = WORDS.len() + 2;
    write_weights(
        &dir.join("gcn.safetensors"),
        vec![
            ("embeddings.weight", tensor(vocab_size, DIM, 4)),
            ("text_proj.weight", tensor(DIM, DIM, 5)),
            ("text_proj.bias", tensor(DIM, 1, 6)),
            ("gc1.weight", tensor(DIM, DIM, 7)),
            ("gc1.bias", tensor(DIM, 1, 8)),
            ("gc2.weight", tensor(DIM, DIM, 9)),
            ("gc2.bias", tensor(DIM, 1, 10)),
            ("classifier.weight", tensor(3, DIM, 11)),
            ("classifier.bias", tensor(3, 1, 12)),
        ],
    );
    AspectSentimentPipeline::from_config(json!({
        "task": "aspect_sentiment",
        "family": "sentic_gcn",
        "artifacts": {
            "weights": { "path": dir.join("gcn.safetensors") },
            "vocab": { "path": dir.join("vocab.json") }
        },
        "hyperparameters": { "embed_dim": DIM, "hidden_dim": DIM, "window": 3 }
    }))
    .unwrap()
}

fn bench_sentiment_run(c: &mut Criterion) {
    let dir = scratch_dir();
    write_vocab(&dir);
    let pipeline = sentiment_pipeline(&dir);

    c.bench_function("sentiment_run", |b| {
        b.iter(|| pipeline.run(black_box("the food was good but the service was bad")))
    });
}

fn bench_sentiment_batch(c: &mut Criterion) {
    let dir = scratch_dir();
    write_vocab(&dir);
    let pipeline = sentiment_pipeline(&dir);
    let mut group = c.benchmark_group("sentiment_batch");

    for size in [1, 8, 32, 128] {
        let inputs: Vec<&str> = (0..size)
            .map(|i| if i % 2 == 0 { "good food" } else { "the service was slow and bad" })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &inputs, |b, inputs| {
            b.iter(|| pipeline.run_batch(black_box(inputs)))
        });
    }
    group.finish();
}

fn bench_aspect_run(c: &mut Criterion) {
    let dir = scratch_dir();
    write_vocab(&dir);
    let pipeline = aspect_pipeline(&dir);
    let input = AspectInput::new("The food was great but the service was slow.", ["food", "service"]);

    c.bench_function("aspect_sentiment_run", |b| {
        b.iter(|| pipeline.run(black_box(&input)))
    });
}

criterion_group!(benches, bench_sentiment_run, bench_sentiment_batch, bench_aspect_run);
criterion_main!(benches);
