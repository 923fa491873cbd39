//! `personachat history`: the session's audit log.

use std::path::Path;

use clap::Subcommand;
use personachat_core::SessionKey;

use crate::bootstrap::{self, CliResult};
use crate::Speaker;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List exchanges, newest first
    List {
        #[command(flatten)]
        speaker: Speaker,

        /// Continue after this history id
        #[arg(long)]
        cursor: Option<i64>,

        /// Page size
        #[arg(long, default_value_t = 20)]
        size: usize,
    },

    /// Forget the session: memory and audit entries
    Clear {
        #[command(flatten)]
        speaker: Speaker,
    },
}

pub async fn run(config_path: Option<&Path>, action: HistoryAction) -> CliResult<()> {
    let config = bootstrap::load_config(config_path)?;

    match action {
        HistoryAction::List { speaker, cursor, size } => {
            let session = SessionKey::derive(speaker.character, &speaker.user);
            let history = bootstrap::open_history(&config).await?;
            let page = history.find_page(session.as_str(), cursor, size.max(1)).await?;

            if page.items.is_empty() {
                println!("No history for {session}.");
                return Ok(());
            }
            for record in &page.items {
                println!("#{} {}", record.id, record.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("  > {}", record.input_text);
                println!("  < {}", record.output_text);
            }
            if let Some(next) = page.next_cursor.filter(|_| page.has_next) {
                println!();
                println!("More: --cursor {next}");
            }
        }
        HistoryAction::Clear { speaker } => {
            let session = SessionKey::derive(speaker.character, &speaker.user);
            let pipeline = bootstrap::build_pipeline(&config).await?;
            let cleared = pipeline.clear_history(&session).await?;
            println!(
                "Cleared {session}: {} audit entries removed{}",
                cleared.audit_records_deleted,
                if cleared.memory_cleared { ", session memory dropped" } else { "" }
            );
        }
    }
    Ok(())
}
