//! `personachat chat` and `personachat ask`.

use std::io::Write;
use std::path::Path;

use personachat_pipeline::{ChatPipeline, TurnOutcome, TurnRequest};
use personachat_core::Character;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::bootstrap::{self, CliResult};
use crate::Speaker;

pub async fn ask(
    config_path: Option<&Path>,
    speaker: Speaker,
    message: String,
    unmetered: bool,
    json: bool,
) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;
    bootstrap::require_api_key(&config)?;
    let character = bootstrap::character(&config, speaker.character)?;
    let pipeline = bootstrap::build_pipeline(&config).await?;

    let outcome = pipeline
        .chat(request(character, &speaker.user, message, unmetered))
        .await?;

    if json {
        let body = serde_json::json!({
            "answer": outcome.answer,
            "session_id": outcome.session.as_str(),
            "usage": outcome.usage,
            "estimate": outcome.estimate,
            "response_time_ms": outcome.response_time_ms,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", outcome.answer);
    }
    Ok(())
}

pub async fn interactive(config_path: Option<&Path>, speaker: Speaker, unmetered: bool) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;
    bootstrap::require_api_key(&config)?;
    let character = bootstrap::character(&config, speaker.character)?;
    let pipeline = bootstrap::build_pipeline(&config).await?;

    println!();
    println!("  personachat: talking to {} (#{})", character.name, character.id);
    println!();
    println!("  Model:     {}", pipeline.model());
    println!("  Memory:    {}", pipeline.memory_backend());
    println!("  User:      {}", speaker.user);
    println!("  Metered:   {}", if unmetered { "no" } else { "yes" });
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_marker()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if !input.is_empty() {
            turn(&pipeline, &character, &speaker.user, input, unmetered).await;
        }
        prompt_marker()?;
    }

    println!();
    Ok(())
}

async fn turn(pipeline: &ChatPipeline, character: &Character, user: &str, input: &str, unmetered: bool) {
    eprint!("  ...");
    let result = pipeline
        .chat(request(character.clone(), user, input.to_string(), unmetered))
        .await;
    eprint!("\r     \r");

    match result {
        Ok(outcome) => print_reply(&character.name, &outcome),
        Err(e) => {
            eprintln!("  [{}] {e}", e.kind());
            println!();
        }
    }
}

fn request(character: Character, user: &str, input: String, unmetered: bool) -> TurnRequest {
    let request = TurnRequest::new(character, user, input);
    if unmetered { request.unmetered() } else { request }
}

fn print_reply(name: &str, outcome: &TurnOutcome) {
    println!();
    for line in outcome.answer.lines() {
        println!("  {name} > {line}");
    }
    println!(
        "  ({} tokens, ${:.6}{})",
        outcome.usage.total_tokens,
        outcome.usage.total_cost,
        if outcome.memory_summarized { ", history summarized" } else { "" }
    );
    println!();
}

fn prompt_marker() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
