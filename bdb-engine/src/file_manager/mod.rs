//! Per-reader state: page caching and shared access

pub mod page_cache;
pub mod shared;

pub use page_cache::{CacheStats, PageCache};
pub use shared::SharedReader;
