//! Assembling a pipeline from configuration.

use std::sync::Arc;
use std::time::Duration;

use personachat_config::{AppConfig, MemoryKind};
use personachat_core::error::Result;
use personachat_core::message::Role;
use personachat_core::{
    AccountService, EventPublisher, HistoryRepository, KnowledgeSource, MemoryStore, Provider,
};
use personachat_telemetry::{ModelPricing, PricingTable};

use crate::budget::TokenEstimator;
use crate::context::{ExchangeLabels, PromptAssembler, RetrievalMerger, TiktokenCounter};
use crate::invoker::ModelInvoker;
use crate::memory::{BufferMemory, ConversationMemory, LlmSummarizer, SummaryBufferMemory};
use crate::turn::{ChatPipeline, PipelineParts};

/// External services the pipeline talks to, already constructed.
pub struct Collaborators {
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub store: Arc<dyn MemoryStore>,
    pub history: Arc<dyn HistoryRepository>,
    pub account: Arc<dyn AccountService>,
    pub publisher: Arc<dyn EventPublisher>,
    pub chat_provider: Arc<dyn Provider>,
    pub chat_model: String,
    pub summary_provider: Arc<dyn Provider>,
    pub summary_model: String,
    pub pricing: Arc<PricingTable>,
}

/// Built-in prices with `[pricing.<model>]` overrides applied.
pub fn pricing_from_config(config: &AppConfig) -> PricingTable {
    PricingTable::with_overrides(
        config
            .pricing
            .iter()
            .map(|(model, p)| (model.clone(), ModelPricing::new(p.input_per_m, p.output_per_m))),
    )
}

/// History labels: configured overrides, else the locale's defaults.
pub fn labels_from_config(config: &AppConfig) -> ExchangeLabels {
    let locale = config.locale;
    ExchangeLabels::new(
        config
            .memory
            .user_label
            .clone()
            .unwrap_or_else(|| locale.role_label(&Role::User).to_string()),
        config
            .memory
            .assistant_label
            .clone()
            .unwrap_or_else(|| locale.role_label(&Role::Assistant).to_string()),
    )
}

impl ChatPipeline {
    pub fn from_config(config: &AppConfig, c: Collaborators) -> Result<Self> {
        let locale = config.locale;
        let labels = labels_from_config(config);

        let memory: Arc<dyn ConversationMemory> = match config.memory.kind {
            MemoryKind::Buffer => Arc::new(BufferMemory::new(c.store)),
            MemoryKind::SummaryBuffer => {
                let summarizer = LlmSummarizer::new(c.summary_provider, c.summary_model, locale)
                    .with_labels(labels.clone());
                Arc::new(
                    SummaryBufferMemory::new(c.store, Arc::new(summarizer), config.memory.max_token_limit)
                        .with_recent_k(config.memory.recent_k)
                        .with_summary_timeout(Duration::from_secs(config.memory.summary_timeout_secs))
                        .with_locale(locale),
                )
            }
        };

        let estimator = TokenEstimator::new(
            Arc::new(TiktokenCounter::new(&config.estimator.encoding)?),
            config.estimator.correction_factor,
            config.estimator.completion_allowance,
        );

        let invoker = ModelInvoker::new(c.chat_provider, c.chat_model, c.pricing)
            .with_temperature(config.default_temperature)
            .with_timeout(Duration::from_secs(config.pipeline.model_timeout_secs));

        let merger = RetrievalMerger::new(
            config.retrieval.top_k,
            config.retrieval.chunk_char_cap,
            Duration::from_secs(config.retrieval.timeout_secs),
        );

        Ok(ChatPipeline::new(PipelineParts {
            knowledge: c.knowledge,
            memory,
            history: c.history,
            account: c.account,
            publisher: c.publisher,
            invoker,
            estimator,
            merger,
            assembler: PromptAssembler::new(locale).with_labels(labels),
            event_topic: config.events.topic.clone(),
            serialize_sessions: config.pipeline.serialize_sessions,
        }))
    }
}
