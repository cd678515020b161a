//! Response caching for the index read queries.
//!
//! `build_cache` picks a backend from `CacheSettings`; `CachedQueries` puts
//! that backend in front of the performance, composition and change readers.

pub mod backend;
pub mod error;
pub mod queries;

pub use backend::{build_cache, InMemoryCache, NoopCache, RedisCache, ResponseCache};
pub use error::CacheError;
pub use queries::{changes_key, composition_key, performance_key, CachedQueries};
