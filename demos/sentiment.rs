use serde_json::json;
use sgnlp::error::Result;
use sgnlp::sentiment::SentimentPipeline;

const REPO: &str = "clapAI/modernBERT-base-multilingual-sentiment";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Building pipeline...");

    let pipeline = SentimentPipeline::builder().cpu().from_config(json!({
        "task": "sentiment",
        "family": "modernbert",
        "labels": ["negative", "neutral", "positive"],
        "artifacts": {
            "weights": { "repo": REPO, "filename": "model.safetensors" },
            "model_config": { "repo": REPO, "filename": "config.json" },
            "tokenizer": { "repo": REPO, "filename": "tokenizer.json" }
        },
        "preprocessing": { "lowercase": false, "max_seq_len": 512 }
    }))?;

    println!("Pipeline built successfully.");

    let text = "I love my new car.";
    let sentiment = pipeline.run(text)?;

    println!("\n=== Sentiment ===");
    println!("Text: \"{}\"", text);
    println!("Sentiment: {} (confidence: {:.4})", sentiment.label, sentiment.score);

    println!("\n=== Batch Inference ===");
    let texts = [
        "The service was excellent.",
        "",
        "I waited an hour and the food was cold.",
    ];
    let output = pipeline.run_batch(&texts)?;

    for (text, result) in texts.iter().zip(output.results) {
        match result {
            Ok(s) => println!("\"{}\" -> {} ({:.4})", text, s.label, s.score),
            Err(e) => println!("\"{}\" -> error: {}", text, e),
        }
    }
    println!(
        "Completed in {:.2}ms ({:.1} items/s)",
        output.stats.total_time.as_secs_f64() * 1000.0,
        output.stats.items_per_second()
    );

    Ok(())
}
