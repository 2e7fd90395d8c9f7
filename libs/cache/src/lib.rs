pub mod config;
pub mod lru;
pub mod persisted_query_cache;

pub use config::PersistedQueriesConfig;
pub use lru::LruCache;
pub use persisted_query_cache::PersistedQueryCache;
