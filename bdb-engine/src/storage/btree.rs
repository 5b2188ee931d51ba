//! B+ tree traversal for btree database files
//!
//! Internal pages map separator keys to child pages; entry 0 is keyless and
//! catches everything below the first separator. Leaf pages hold key/data
//! pairs in entry order. Lookups descend from the root by picking the
//! greatest separator `<=` the search key, then scan the leaf for an exact
//! match.

use bytes::Bytes;
use std::collections::HashSet;
use std::io::{Read, Seek};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{BdbError, BdbResult};
use crate::file_manager::page_cache::{CacheStats, PageCache};
use crate::reader::ReaderOptions;
use super::entry::{InternalEntry, LeafItem, Payload};
use super::meta::{AccessMethod, Metadata};
use super::page::{Page, PageHeader, PageIO, PageType};

/// PGNO_INVALID terminates overflow chains
const PGNO_INVALID: u32 = 0;

/// A decoded entry of a btree page
#[derive(Debug, Clone)]
pub enum Entry {
    Internal(InternalEntry),
    Leaf(LeafItem),
}

/// Read-only reader for a btree database
pub struct BTreeReader<R> {
    meta: Metadata,
    io: PageIO<R>,
    cache: PageCache,
}

impl<R: Read + Seek> BTreeReader<R> {
    /// Read and validate the metadata of a btree database
    pub fn open(mut inner: R, options: &ReaderOptions) -> BdbResult<Self> {
        let meta = Metadata::read(&mut inner)?;

        if meta.is_recno() {
            return Err(BdbError::UnsupportedFormat {
                magic: meta.magic,
                method: Some(AccessMethod::Recno),
                byte_swapped: false,
            });
        }

        debug!(
            version = meta.version,
            page_size = meta.page_size,
            last_pgno = meta.last_pgno,
            root = meta.root,
            "opened btree database"
        );

        Ok(BTreeReader {
            io: PageIO::new(inner, meta.page_size),
            cache: PageCache::new(meta.last_pgno, options.cache_pages),
            meta,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Get the decoded header and offset table of page `pgno`
    pub fn page(&mut self, pgno: u32) -> BdbResult<Arc<Page>> {
        let io = &mut self.io;
        self.cache.get(pgno, |n| io.read_page(n))
    }

    /// Decode every entry of an internal or leaf btree page
    pub fn entries(&mut self, pgno: u32) -> BdbResult<Vec<Entry>> {
        let page = self.page(pgno)?;
        let mut entries = Vec::with_capacity(page.len());

        match page.page_type() {
            PageType::InternalBTree => {
                for (i, &offset) in page.entry_offsets.iter().enumerate() {
                    entries.push(Entry::Internal(self.io.read_internal(pgno, i, offset)?));
                }
            }
            PageType::LeafBTree => {
                for (i, &offset) in page.entry_offsets.iter().enumerate() {
                    entries.push(Entry::Leaf(self.io.read_leaf_item(pgno, i, offset)?));
                }
            }
            page_type => {
                return Err(BdbError::UnexpectedPageType {
                    page: pgno,
                    page_type,
                })
            }
        }

        Ok(entries)
    }

    /// Find the leaf page and entry index of `key`
    pub fn search(&mut self, key: &[u8]) -> BdbResult<(u32, usize)> {
        let mut pgno = self.meta.root;
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(pgno) {
                return Err(BdbError::CycleDetected { page: pgno });
            }

            let page = self.page(pgno)?;
            match page.page_type() {
                PageType::InternalBTree => {
                    pgno = self.choose_child(pgno, &page, key)?;
                }
                PageType::LeafBTree => return self.scan_leaf(pgno, &page, key),
                page_type => {
                    return Err(BdbError::UnexpectedPageType {
                        page: pgno,
                        page_type,
                    })
                }
            }
        }
    }

    /// Child of the greatest separator `<=` key. Entry 0 is the default.
    fn choose_child(&mut self, pgno: u32, page: &Page, key: &[u8]) -> BdbResult<u32> {
        let first = page.entry_offset(pgno, 0)?;
        let mut chosen = self.io.read_internal(pgno, 0, first)?.child;

        for (i, &offset) in page.entry_offsets.iter().enumerate().skip(1) {
            let entry = self.io.read_internal(pgno, i, offset)?;
            let separator = self.resolve(&entry.key)?;
            if key < separator.as_ref() {
                break;
            }
            chosen = entry.child;
        }

        trace!(pgno, child = chosen, "descending");
        Ok(chosen)
    }

    fn scan_leaf(&mut self, pgno: u32, page: &Page, key: &[u8]) -> BdbResult<(u32, usize)> {
        for (i, &offset) in page.entry_offsets.iter().enumerate().step_by(2) {
            let item = self.io.read_leaf_item(pgno, i, offset)?;
            if item.item_type.deleted {
                continue;
            }
            if let Payload::Overflow { total_len, .. } = item.payload {
                if total_len as usize != key.len() {
                    continue;
                }
            }
            if self.resolve(&item.payload)?.as_ref() == key {
                trace!(pgno, index = i, "key found");
                return Ok((pgno, i));
            }
        }
        Err(BdbError::NotFound)
    }

    /// Get the value stored under `key`
    pub fn get(&mut self, key: &[u8]) -> BdbResult<Bytes> {
        let (pgno, index) = self.search(key)?;
        let page = self.page(pgno)?;
        let offset = page.entry_offset(pgno, index + 1)?;
        let item = self.io.read_leaf_item(pgno, index + 1, offset)?;
        self.resolve(&item.payload)
    }

    /// Check if `key` is present. Only `NotFound` maps to `false`.
    pub fn has_key(&mut self, key: &[u8]) -> BdbResult<bool> {
        match self.search(key) {
            Ok(_) => Ok(true),
            Err(BdbError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Key enumeration is not implemented. This never reports an empty
    /// database; it always fails with [`BdbError::Unsupported`].
    pub fn keys(&mut self) -> BdbResult<Vec<Bytes>> {
        Err(BdbError::Unsupported("key enumeration"))
    }

    /// Materialize an item's bytes, following overflow chains
    pub fn resolve(&mut self, payload: &Payload) -> BdbResult<Bytes> {
        match payload {
            Payload::Inline(bytes) => Ok(bytes.clone()),
            Payload::Overflow { pgno, total_len } => self.read_overflow(*pgno, *total_len),
            Payload::Duplicate { .. } => Err(BdbError::Unsupported("off-page duplicates")),
        }
    }

    fn read_overflow(&mut self, first: u32, total_len: u32) -> BdbResult<Bytes> {
        let total_len = total_len as usize;
        let page_size = self.meta.page_size as usize;
        let mut out = Vec::with_capacity(total_len.min(page_size * 64));
        let mut visited = HashSet::new();
        let mut pgno = first;

        while pgno != PGNO_INVALID {
            if !visited.insert(pgno) {
                return Err(BdbError::CycleDetected { page: pgno });
            }

            let page = self.page(pgno)?;
            if page.page_type() != PageType::Overflow {
                return Err(BdbError::UnexpectedPageType {
                    page: pgno,
                    page_type: page.page_type(),
                });
            }

            let len = usize::from(page.header.hf_offset);
            if PageHeader::SIZE + len > page_size || out.len() + len > total_len {
                return Err(BdbError::InvalidFormat(format!(
                    "Overflow page {} holds {} bytes, chain expected {} in total",
                    pgno, len, total_len
                )));
            }

            let start = out.len();
            out.resize(start + len, 0);
            self.io
                .read_at(pgno, PageHeader::SIZE as u32, &mut out[start..])
                .map_err(|e| BdbError::page_io(pgno, None, e))?;

            pgno = page.header.next_pgno;
        }

        if out.len() != total_len {
            return Err(BdbError::InvalidFormat(format!(
                "Overflow chain from page {} holds {} of {} bytes",
                first,
                out.len(),
                total_len
            )));
        }

        Ok(Bytes::from(out))
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.io.into_inner()
    }
}
