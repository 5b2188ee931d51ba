//! Page cache for decoded page headers and entry-offset tables
//!
//! Each reader owns its own cache. The file is assumed immutable while it is
//! open, so cached pages are never invalidated. The default cache is
//! unbounded and every page is fetched at most once per reader; a bounded
//! cache evicts least recently used pages and may fetch them again.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BdbError, BdbResult};
use crate::storage::page::Page;

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Per-reader LRU page cache keyed by page number
pub struct PageCache {
    pages: LruCache<u32, Arc<Page>>,
    last_pgno: u32,
    stats: CacheStats,
}

impl PageCache {
    /// Create a cache for a file whose last page is `last_pgno`.
    /// `capacity` of `None` (or zero) keeps every page ever fetched.
    pub fn new(last_pgno: u32, capacity: Option<usize>) -> Self {
        let pages = match capacity.and_then(NonZeroUsize::new) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        PageCache {
            pages,
            last_pgno,
            stats: CacheStats::default(),
        }
    }

    /// Get page `pgno`, calling `load` only on a cache miss.
    /// Page numbers beyond the last page fail before any I/O.
    pub fn get<F>(&mut self, pgno: u32, load: F) -> BdbResult<Arc<Page>>
    where
        F: FnOnce(u32) -> BdbResult<Page>,
    {
        if pgno > self.last_pgno {
            return Err(BdbError::OutOfRange {
                page: pgno,
                last: self.last_pgno,
            });
        }

        if let Some(page) = self.pages.get(&pgno) {
            self.stats.hits += 1;
            return Ok(Arc::clone(page));
        }

        self.stats.misses += 1;
        let page = Arc::new(load(pgno)?);
        debug!(pgno, page_type = %page.page_type(), entries = page.len(), "page cached");

        if let Some((evicted, _)) = self.pages.push(pgno, Arc::clone(&page)) {
            if evicted != pgno {
                self.stats.evictions += 1;
            }
        }
        Ok(page)
    }

    /// Check if a page is resident, without touching recency
    pub fn contains(&self, pgno: u32) -> bool {
        self.pages.contains(&pgno)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
