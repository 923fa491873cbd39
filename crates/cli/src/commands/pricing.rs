//! `personachat pricing`: the model pricing table.

use std::path::Path;

use personachat_pipeline::pricing_from_config;

use crate::bootstrap::{self, CliResult};

pub fn run(
    config_path: Option<&Path>,
    model: Option<String>,
    prompt_tokens: u64,
    completion_tokens: u64,
) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;
    let table = pricing_from_config(&config);

    if let Some(model) = model {
        let Some((matched, price)) = table.resolve(&model) else {
            println!("No pricing for '{model}'; turns on it are recorded at $0.");
            return Ok(());
        };
        println!("{model} → priced as {matched}");
        println!("  Input:   ${:.3} / 1M tokens", price.input_per_m);
        println!("  Output:  ${:.3} / 1M tokens", price.output_per_m);
        if prompt_tokens + completion_tokens > 0 {
            let cost = table.compute_cost(&model, prompt_tokens, completion_tokens);
            println!("  {prompt_tokens} in + {completion_tokens} out = ${cost:.6}");
        }
        return Ok(());
    }

    let entries = table.entries();

    println!("Model Pricing (per 1M tokens)");
    println!("─────────────────────────────────────────────────────");
    println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
    for (name, p) in &entries {
        println!("{:<40} ${:>8.3} ${:>8.3}", name, p.input_per_m, p.output_per_m);
    }
    println!();
    println!("  {} models with pricing data", entries.len());
    Ok(())
}
