//! Synthetic database images for tests

use std::collections::BTreeMap;

use super::meta::{BTREE_MAGIC, META_SIZE};
use super::page::PageHeader;

const KEYDATA: u8 = 1;
const DUPLICATE: u8 = 2;
const OVERFLOW: u8 = 3;
const DELETED: u8 = 0x80;

/// Builds the metadata page
#[derive(Debug, Clone)]
pub struct MetaBuilder {
    page_size: u32,
    last_pgno: u32,
    root: u32,
    magic: u32,
    flags: u32,
    encrypt_alg: u8,
}

impl MetaBuilder {
    pub fn new(page_size: u32, last_pgno: u32, root: u32) -> Self {
        MetaBuilder {
            page_size,
            last_pgno,
            root,
            magic: BTREE_MAGIC,
            flags: 0,
            encrypt_alg: 0,
        }
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn encrypt_alg(mut self, alg: u8) -> Self {
        self.encrypt_alg = alg;
        self
    }

    /// Full metadata page, `page_size` bytes long
    pub fn bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; (self.page_size as usize).max(META_SIZE)];
        buf[12..16].copy_from_slice(&self.magic.to_le_bytes());
        buf[16..20].copy_from_slice(&9u32.to_le_bytes());
        buf[20..24].copy_from_slice(&self.page_size.to_le_bytes());
        buf[24] = self.encrypt_alg;
        buf[25] = 9;
        buf[32..36].copy_from_slice(&self.last_pgno.to_le_bytes());
        buf[48..52].copy_from_slice(&self.flags.to_le_bytes());
        buf[88..92].copy_from_slice(&self.root.to_le_bytes());
        buf
    }
}

/// Builds a single page. Items are packed downward from the page end in
/// the order they are added.
#[derive(Debug, Clone)]
pub struct PageBuilder {
    pgno: u32,
    page_size: u32,
    page_type: u8,
    level: u8,
    prev: u32,
    next: u32,
    items: Vec<Vec<u8>>,
    body: Option<Vec<u8>>,
}

impl PageBuilder {
    fn new(pgno: u32, page_size: u32, page_type: u8, level: u8) -> Self {
        PageBuilder {
            pgno,
            page_size,
            page_type,
            level,
            prev: 0,
            next: 0,
            items: Vec::new(),
            body: None,
        }
    }

    pub fn leaf(pgno: u32, page_size: u32) -> Self {
        Self::new(pgno, page_size, 5, 1)
    }

    pub fn internal(pgno: u32, page_size: u32) -> Self {
        Self::new(pgno, page_size, 3, 2)
    }

    /// One link of an overflow chain
    pub fn overflow(pgno: u32, page_size: u32, chunk: &[u8], next: u32) -> Self {
        let mut page = Self::new(pgno, page_size, 7, 0);
        page.next = next;
        page.body = Some(chunk.to_vec());
        page
    }

    pub fn with_type(mut self, page_type: u8) -> Self {
        self.page_type = page_type;
        self
    }

    pub fn siblings(mut self, prev: u32, next: u32) -> Self {
        self.prev = prev;
        self.next = next;
        self
    }

    /// On-page key or data item
    pub fn item(self, data: &[u8]) -> Self {
        self.raw_item(KEYDATA, data)
    }

    /// On-page item carrying the deleted flag
    pub fn deleted_item(self, data: &[u8]) -> Self {
        self.raw_item(KEYDATA | DELETED, data)
    }

    fn raw_item(mut self, item_type: u8, data: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(3 + data.len());
        raw.extend_from_slice(&(data.len() as u16).to_le_bytes());
        raw.push(item_type);
        raw.extend_from_slice(data);
        self.items.push(raw);
        self
    }

    /// Leaf item stored on an overflow chain
    pub fn overflow_item(mut self, first_pgno: u32, total_len: u32) -> Self {
        self.items.push(off_page_ref(OVERFLOW, first_pgno, total_len));
        self
    }

    /// Leaf item pointing at an off-page duplicate tree
    pub fn duplicate_item(mut self, root_pgno: u32) -> Self {
        self.items.push(off_page_ref(DUPLICATE, root_pgno, 0));
        self
    }

    /// Internal entry referencing `child`, keyed by `key`
    pub fn child(mut self, child: u32, key: &[u8]) -> Self {
        self.items.push(internal_entry(KEYDATA, child, key));
        self
    }

    /// Internal entry whose key lives on an overflow chain
    pub fn overflow_child(mut self, child: u32, first_pgno: u32, total_len: u32) -> Self {
        let key = off_page_ref(OVERFLOW, first_pgno, total_len);
        self.items.push(internal_entry(OVERFLOW, child, &key));
        self
    }

    pub fn pgno(&self) -> u32 {
        self.pgno
    }

    pub fn finish(&self) -> Vec<u8> {
        let size = self.page_size as usize;
        let mut buf = vec![0u8; size];

        let mut offsets = Vec::with_capacity(self.items.len());
        let mut low = size;
        for item in &self.items {
            low -= item.len();
            buf[low..low + item.len()].copy_from_slice(item);
            offsets.push(low as u16);
        }

        let (entries, hf_offset) = match &self.body {
            Some(chunk) => {
                buf[PageHeader::SIZE..PageHeader::SIZE + chunk.len()].copy_from_slice(chunk);
                (1u16, chunk.len() as u16)
            }
            None => (offsets.len() as u16, low as u16),
        };

        buf[8..12].copy_from_slice(&self.pgno.to_le_bytes());
        buf[12..16].copy_from_slice(&self.prev.to_le_bytes());
        buf[16..20].copy_from_slice(&self.next.to_le_bytes());
        buf[20..22].copy_from_slice(&entries.to_le_bytes());
        buf[22..24].copy_from_slice(&hf_offset.to_le_bytes());
        buf[24] = self.level;
        buf[25] = self.page_type;

        for (i, offset) in offsets.iter().enumerate() {
            let at = PageHeader::SIZE + 2 * i;
            buf[at..at + 2].copy_from_slice(&offset.to_le_bytes());
        }

        buf
    }
}

fn off_page_ref(item_type: u8, pgno: u32, total_len: u32) -> Vec<u8> {
    let mut raw = vec![0u8, 0, item_type, 0];
    raw.extend_from_slice(&pgno.to_le_bytes());
    raw.extend_from_slice(&total_len.to_le_bytes());
    raw
}

fn internal_entry(item_type: u8, child: u32, key: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(12 + key.len());
    raw.extend_from_slice(&(key.len() as u16).to_le_bytes());
    raw.push(item_type);
    raw.push(0);
    raw.extend_from_slice(&child.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(key);
    raw
}

/// Assembles whole files. Pages not pushed are left zeroed.
#[derive(Debug, Default)]
pub struct DbBuilder {
    page_size: u32,
    pages: BTreeMap<u32, Vec<u8>>,
}

impl DbBuilder {
    pub fn new(page_size: u32) -> Self {
        DbBuilder {
            page_size,
            pages: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, page: PageBuilder) -> &mut Self {
        self.pages.insert(page.pgno(), page.finish());
        self
    }

    pub fn last_pgno(&self) -> u32 {
        self.pages.keys().next_back().copied().unwrap_or(0)
    }

    /// Finish with default metadata rooted at `root`
    pub fn finish(&self, root: u32) -> Vec<u8> {
        self.finish_with(MetaBuilder::new(self.page_size, self.last_pgno(), root))
    }

    pub fn finish_with(&self, meta: MetaBuilder) -> Vec<u8> {
        let size = self.page_size as usize;
        let mut file = meta.bytes();
        file.resize(size, 0);
        for pgno in 1..=self.last_pgno() {
            match self.pages.get(&pgno) {
                Some(page) => file.extend_from_slice(page),
                None => file.extend(std::iter::repeat(0u8).take(size)),
            }
        }
        file
    }
}

/// One leaf page (page 1) holding the given key/data pairs in order
pub fn single_leaf(pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut page = PageBuilder::leaf(1, 512);
    for (key, data) in pairs {
        page = page.item(key).item(data);
    }
    let mut db = DbBuilder::new(512);
    db.push(page);
    db.finish(1)
}
