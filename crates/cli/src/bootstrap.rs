//! Wiring configured collaborators into a pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use personachat_config::{AppConfig, EventSinkKind, HistoryKind, MemoryBackendKind};
use personachat_core::{Character, EventPublisher, HistoryRepository, KnowledgeSource, MemoryStore};
use personachat_memory::{InMemoryHistoryRepository, InMemorySessionStore, KeywordKnowledgeBase, SqliteHistoryRepository};
use personachat_pipeline::{pricing_from_config, ChatPipeline, Collaborators};
use personachat_telemetry::{BroadcastPublisher, LogPublisher};
use tracing::{info, warn};

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Providers that run locally and need no API key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm"];

pub fn load_config(path: Option<&Path>) -> CliResult<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::load_with_overrides(p),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

pub fn character(config: &AppConfig, id: i64) -> CliResult<Character> {
    config.character(id).cloned().ok_or_else(|| {
        format!("No character with id {id}. Run `personachat characters` to list them.").into()
    })
}

/// Fail early, with setup instructions, when the chat provider needs a key.
pub fn require_api_key(config: &AppConfig) -> CliResult<()> {
    let provider_key = config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.api_key.as_ref());
    if config.has_api_key() || provider_key.is_some() || KEYLESS_PROVIDERS.contains(&config.default_provider.as_str()) {
        return Ok(());
    }

    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    PERSONACHAT_API_KEY = 'sk-...'   (generic)");
    eprintln!("    OPENAI_API_KEY      = 'sk-...'   (for OpenAI direct)");
    eprintln!("    ANTHROPIC_API_KEY   = 'sk-ant-...'");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

pub async fn open_store(config: &AppConfig) -> CliResult<Arc<dyn MemoryStore>> {
    let ttl = Duration::from_secs(config.memory.ttl_secs);
    match config.memory.backend {
        MemoryBackendKind::InMemory => Ok(Arc::new(InMemorySessionStore::new(ttl))),
        MemoryBackendKind::Redis => open_redis_store(config, ttl).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis_store(config: &AppConfig, ttl: Duration) -> CliResult<Arc<dyn MemoryStore>> {
    let url = config
        .memory
        .redis_url
        .as_deref()
        .ok_or("memory.redis_url is required for the redis backend")?;
    Ok(Arc::new(personachat_memory::RedisSessionStore::connect(url, ttl).await?))
}

#[cfg(not(feature = "redis"))]
async fn open_redis_store(_config: &AppConfig, _ttl: Duration) -> CliResult<Arc<dyn MemoryStore>> {
    Err("memory.backend = \"redis\" needs a build with the `redis` feature".into())
}

pub async fn open_history(config: &AppConfig) -> CliResult<Arc<dyn HistoryRepository>> {
    match config.history.kind {
        HistoryKind::InMemory => Ok(Arc::new(InMemoryHistoryRepository::new())),
        HistoryKind::Sqlite => {
            let path = config.history_db_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let repo = SqliteHistoryRepository::new(&path.to_string_lossy()).await?;
            Ok(Arc::new(repo))
        }
    }
}

pub async fn open_knowledge(config: &AppConfig) -> CliResult<Arc<dyn KnowledgeSource>> {
    let kb = KeywordKnowledgeBase::new(config.retrieval.fetch_k, config.retrieval.mmr_lambda);
    if let Some(dir) = &config.retrieval.knowledge_dir {
        match kb.load_dir(dir).await {
            Ok(passages) => info!(passages, dir = %dir.display(), "Knowledge base loaded"),
            Err(e) => warn!(error = %e, dir = %dir.display(), "Knowledge directory unreadable, continuing without it"),
        }
    }
    Ok(Arc::new(kb))
}

pub async fn open_publisher(config: &AppConfig) -> CliResult<Arc<dyn EventPublisher>> {
    match config.events.sink {
        EventSinkKind::Log => Ok(Arc::new(LogPublisher)),
        EventSinkKind::Broadcast => Ok(Arc::new(BroadcastPublisher::default())),
        EventSinkKind::Redis => open_redis_publisher(config).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis_publisher(config: &AppConfig) -> CliResult<Arc<dyn EventPublisher>> {
    let url = config
        .events
        .redis_url
        .as_deref()
        .ok_or("events.redis_url is required for the redis sink")?;
    Ok(Arc::new(personachat_telemetry::RedisStreamPublisher::connect(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn open_redis_publisher(_config: &AppConfig) -> CliResult<Arc<dyn EventPublisher>> {
    Err("events.sink = \"redis\" needs a build with the `redis` feature".into())
}

pub async fn build_pipeline(config: &AppConfig) -> CliResult<ChatPipeline> {
    let router = personachat_providers::build_from_config(config);
    let (chat_provider, chat_model) = router
        .resolve(&config.default_model)
        .ok_or("No default provider configured")?;
    let (summary_provider, summary_model) = router
        .resolve(&config.memory.summary_model)
        .ok_or("No provider for the summary model")?;

    let account = personachat_account::build_from_config(&config.account)?;

    let collaborators = Collaborators {
        knowledge: open_knowledge(config).await?,
        store: open_store(config).await?,
        history: open_history(config).await?,
        account,
        publisher: open_publisher(config).await?,
        chat_provider,
        chat_model,
        summary_provider,
        summary_model,
        pricing: Arc::new(pricing_from_config(config)),
    };

    Ok(ChatPipeline::from_config(config, collaborators)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_publisher_is_log() {
        let publisher = open_publisher(&AppConfig::default()).await.unwrap();
        assert_eq!(publisher.name(), "log");
    }

    #[tokio::test]
    async fn in_memory_backends() {
        let mut config = AppConfig::default();
        config.history.kind = HistoryKind::InMemory;
        assert_eq!(open_history(&config).await.unwrap().name(), "in_memory");
        assert_eq!(open_store(&config).await.unwrap().name(), "in_memory");
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn redis_backend_needs_feature() {
        let mut config = AppConfig::default();
        config.memory.backend = MemoryBackendKind::Redis;
        assert!(open_store(&config).await.is_err());
    }

    #[test]
    fn keyless_provider_needs_no_key() {
        let mut config = AppConfig::default();
        config.api_key = None;
        config.default_provider = "ollama".into();
        assert!(require_api_key(&config).is_ok());
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(character(&AppConfig::default(), 42).is_err());
    }
}
