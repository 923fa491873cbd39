//! `personachat characters`: configured personas.

use std::path::Path;

use personachat_config::AppConfig;

use crate::bootstrap::{self, CliResult};

pub fn run(config_path: Option<&Path>) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;

    if config.characters.is_empty() {
        println!("No characters configured.");
        println!();
        println!("Add one in {}:", AppConfig::config_dir().join("config.toml").display());
        println!();
        println!("  [[characters]]");
        println!("  id = 1");
        println!("  name = \"Hong\"");
        return Ok(());
    }

    println!("{:<6} {:<24} {:>9}  Description", "Id", "Name", "Exemplars");
    for c in &config.characters {
        println!(
            "{:<6} {:<24} {:>9}  {}",
            c.id,
            c.name,
            c.style_exemplars.len(),
            c.description
        );
    }
    Ok(())
}
