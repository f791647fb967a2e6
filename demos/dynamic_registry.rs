use serde_json::Value;
use sgnlp::error::Result;
use sgnlp::TaskRegistry;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config), Some(input)) = (args.next(), args.next()) else {
        eprintln!("usage: dynamic_registry <config.json> <input json>");
        eprintln!(r#"  e.g. dynamic_registry models/absa.json '{{"text": "Nice view.", "aspects": ["view"]}}'"#);
        std::process::exit(2);
    };

    let registry = TaskRegistry::builtin();
    println!("Registered tasks: {}", registry.tasks().join(", "));

    let pipeline = registry.pipeline_from_config(config.as_str())?;
    println!("Built `{}` pipeline ({})", pipeline.task(), pipeline.state());

    let input: Value = serde_json::from_str(&input)?;
    let output = pipeline.run_json(input)?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
