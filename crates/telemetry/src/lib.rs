//! Usage accounting, pricing, and turn-event publishing for personachat.
//!
//! Provides the per-turn usage collector with its ordered provider-usage
//! extraction strategies, an approximate model pricing table, and the
//! best-effort event publishers the pipeline reports each turn to.

pub mod pricing;
pub mod publisher;
pub mod usage;

pub use pricing::{ModelPricing, PricingTable};
pub use publisher::{BroadcastPublisher, LogPublisher, PublishedEvent};
#[cfg(feature = "redis")]
pub use publisher::RedisStreamPublisher;
pub use usage::{extract_usage, UsageCollector, UsageHook, UsageShape};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("event sink connection failed: {0}")]
    Connection(String),
}
