use sgnlp::aspect_sentiment::{AspectInput, AspectSentimentPipeline};
use sgnlp::error::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "models/senticgcn/config.json".to_string());

    println!("Building pipeline from {config}...");
    let pipeline = AspectSentimentPipeline::from_config(config.as_str())?;

    let inputs = [
        AspectInput::new(
            "The food was great but the service was painfully slow.",
            ["food", "service"],
        ),
        AspectInput::from_marked("Soup is tasty but $T$ is a bit pricey.", "soup")?,
    ];

    for input in &inputs {
        println!("\n{}", input.text);
        match pipeline.run(input) {
            Ok(result) => {
                for p in result.aspects {
                    println!(
                        "  {:<10} {:<8} ({:.4}) chars {}..{}",
                        p.aspect, p.label, p.score, p.span.0, p.span.1
                    );
                }
            }
            Err(e) => println!("  error: {e}"),
        }
    }

    Ok(())
}
