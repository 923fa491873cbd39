//! `personachat estimate`: pre-flight cost of a message.

use std::path::Path;

use personachat_pipeline::TurnRequest;

use crate::bootstrap::{self, CliResult};
use crate::Speaker;

pub async fn run(config_path: Option<&Path>, speaker: Speaker, message: String) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;
    let character = bootstrap::character(&config, speaker.character)?;
    let pipeline = bootstrap::build_pipeline(&config).await?;

    let estimate = pipeline
        .estimate(&TurnRequest::new(character, &speaker.user, message))
        .await?;

    println!("Token estimate ({})", config.estimator.encoding);
    println!("─────────────────────────────────────");
    println!("  Raw prompt:        {}", estimate.raw_prompt_tokens);
    println!(
        "  Corrected (x{}):  {}",
        config.estimator.correction_factor, estimate.corrected_prompt_tokens
    );
    println!("  Reply allowance:   {}", estimate.completion_estimate);
    println!("  Total:             {}", estimate.total);
    Ok(())
}
