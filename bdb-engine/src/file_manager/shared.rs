//! Shared reader handle for multi-threaded callers
//!
//! A reader mutates its stream position and page cache on every lookup, so
//! it is not safe to call from several threads at once. `SharedReader`
//! serializes access through a single mutex; each call holds the lock for
//! the whole lookup.

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::error::BdbResult;
use crate::file_manager::page_cache::CacheStats;
use crate::reader::Reader;
use crate::storage::meta::Metadata;

/// Cloneable, mutex-guarded handle to one open reader
pub struct SharedReader<R> {
    inner: Arc<Mutex<Reader<R>>>,
}

impl<R> Clone for SharedReader<R> {
    fn clone(&self) -> Self {
        SharedReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Read + Seek> SharedReader<R> {
    pub fn new(reader: Reader<R>) -> Self {
        SharedReader {
            inner: Arc::new(Mutex::new(reader)),
        }
    }

    pub fn get(&self, key: &[u8]) -> BdbResult<Bytes> {
        self.inner.lock().get(key)
    }

    pub fn has_key(&self, key: &[u8]) -> BdbResult<bool> {
        self.inner.lock().has_key(key)
    }

    pub fn keys(&self) -> BdbResult<Vec<Bytes>> {
        self.inner.lock().keys()
    }

    pub fn metadata(&self) -> Metadata {
        self.inner.lock().metadata().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock().cache_stats()
    }

    /// Hold the lock across several calls
    pub fn lock(&self) -> MutexGuard<'_, Reader<R>> {
        self.inner.lock()
    }
}
