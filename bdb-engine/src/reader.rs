//! Opening databases: format detection and the access-method façade
//!
//! The metadata magic at byte 12 identifies the access method. Only btree
//! databases can be read; every other method is reported as unsupported.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BdbError, BdbResult};
use crate::file_manager::page_cache::CacheStats;
use crate::storage::btree::{BTreeReader, Entry};
use crate::storage::meta::{AccessMethod, Metadata};
use crate::storage::page::Page;

/// Size of the prefix inspected by [`detect`]
const SNIFF_LEN: usize = 16;

/// Reader tuning, loadable from a config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderOptions {
    /// Maximum number of cached pages; unbounded when absent
    pub cache_pages: Option<usize>,
}

/// Identify the access method of a database stream.
///
/// Reads the first 16 bytes and rewinds to the start before returning.
/// Magic numbers that match no access method, in either byte order, fail
/// with [`BdbError::UnsupportedFormat`].
pub fn detect<R: Read + Seek>(r: &mut R) -> BdbResult<AccessMethod> {
    r.seek(SeekFrom::Start(0))?;
    let mut prefix = [0u8; SNIFF_LEN];
    r.read_exact(&mut prefix)?;
    r.seek(SeekFrom::Start(0))?;

    let magic = LittleEndian::read_u32(&prefix[12..16]);
    AccessMethod::from_magic(magic).ok_or_else(|| {
        let swapped = AccessMethod::from_magic(magic.swap_bytes());
        BdbError::UnsupportedFormat {
            magic,
            method: swapped,
            byte_swapped: swapped.is_some(),
        }
    })
}

/// Open a database with default options
pub fn open<R: Read + Seek>(stream: R) -> BdbResult<Reader<R>> {
    open_with_options(stream, &ReaderOptions::default())
}

/// Open a database, dispatching on its access method
pub fn open_with_options<R: Read + Seek>(mut stream: R, options: &ReaderOptions) -> BdbResult<Reader<R>> {
    let method = detect(&mut stream)?;
    debug!(%method, "detected access method");
    match method {
        AccessMethod::BTree => Ok(Reader::BTree(BTreeReader::open(stream, options)?)),
        other => Err(BdbError::UnsupportedFormat {
            magic: other.magic(),
            method: Some(other),
            byte_swapped: false,
        }),
    }
}

/// Open a database file from disk
pub fn open_path(path: impl AsRef<Path>, options: &ReaderOptions) -> BdbResult<Reader<File>> {
    let path = path.as_ref();
    debug!(path = %path.display(), "opening database file");
    open_with_options(File::open(path)?, options)
}

/// An open database, one variant per readable access method
pub enum Reader<R> {
    BTree(BTreeReader<R>),
}

impl<R: Read + Seek> Reader<R> {
    /// Get the value stored under `key`; `NotFound` if absent
    pub fn get(&mut self, key: &[u8]) -> BdbResult<Bytes> {
        match self {
            Reader::BTree(t) => t.get(key),
        }
    }

    /// Check if `key` is present
    pub fn has_key(&mut self, key: &[u8]) -> BdbResult<bool> {
        match self {
            Reader::BTree(t) => t.has_key(key),
        }
    }

    /// Always fails with [`BdbError::Unsupported`]
    pub fn keys(&mut self) -> BdbResult<Vec<Bytes>> {
        match self {
            Reader::BTree(t) => t.keys(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Reader::BTree(t) => t.metadata(),
        }
    }

    pub fn access_method(&self) -> AccessMethod {
        match self {
            Reader::BTree(_) => AccessMethod::BTree,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        match self {
            Reader::BTree(t) => t.cache_stats(),
        }
    }

    /// Decoded header of page `pgno`
    pub fn page(&mut self, pgno: u32) -> BdbResult<Arc<Page>> {
        match self {
            Reader::BTree(t) => t.page(pgno),
        }
    }

    /// Decoded entries of page `pgno`
    pub fn entries(&mut self, pgno: u32) -> BdbResult<Vec<Entry>> {
        match self {
            Reader::BTree(t) => t.entries(pgno),
        }
    }
}
