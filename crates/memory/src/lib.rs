//! Storage implementations for personachat: session stores, audit
//! history repositories, and the local knowledge base.

pub mod history;
pub mod in_memory;
pub mod knowledge;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use history::InMemoryHistoryRepository;
pub use in_memory::InMemorySessionStore;
pub use knowledge::KeywordKnowledgeBase;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHistoryRepository;

#[cfg(feature = "redis")]
pub use redis_store::RedisSessionStore;
