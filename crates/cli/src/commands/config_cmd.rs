//! `personachat config`: initialize, show or locate configuration.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use personachat_config::AppConfig;

use crate::bootstrap::{self, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration (API keys redacted)
    Show,
    /// Print the config file location
    Path,
}

pub fn run(config_path: Option<&Path>, action: ConfigAction) -> CliResult<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_path);

    match action {
        ConfigAction::Init { force } => init(&path, force),
        ConfigAction::Show => {
            let mut config = bootstrap::load_config(config_path)?;
            redact(&mut config);
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn default_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

fn init(path: &Path, force: bool) -> CliResult<()> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;

    println!("Wrote {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set PERSONACHAT_API_KEY (or add api_key to the file)");
    println!("  2. Edit the [[characters]] section");
    println!("  3. personachat chat -C 1");
    Ok(())
}

fn redact(config: &mut AppConfig) {
    const MASK: &str = "***";
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
}
