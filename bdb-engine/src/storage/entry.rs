//! Item decoding for btree pages
//!
//! Leaf pages hold alternating key and data items, each a 3-byte header
//! (length, type) followed by the payload. Internal pages hold 12-byte
//! headers that add a child page number and subtree record count before
//! the separator key. Items too large for a page are replaced by a 12-byte
//! reference to a chain of overflow pages.

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{self, Cursor, Read, Seek};

use crate::error::{BdbError, BdbResult};
use super::page::PageIO;

/// Item type flag marking a deleted item awaiting compaction
pub const ITEM_DELETED: u8 = 0x80;

/// Kind of a key/data item (low seven bits of the type byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Payload stored on the page
    KeyData,
    /// Reference to an off-page duplicate tree
    Duplicate,
    /// Reference to an overflow chain
    Overflow,
    Unknown(u8),
}

/// Decoded item type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemType {
    pub kind: ItemKind,
    pub deleted: bool,
}

impl From<u8> for ItemType {
    fn from(value: u8) -> Self {
        let kind = match value & !ITEM_DELETED {
            1 => ItemKind::KeyData,
            2 => ItemKind::Duplicate,
            3 => ItemKind::Overflow,
            other => ItemKind::Unknown(other),
        };
        ItemType {
            kind,
            deleted: value & ITEM_DELETED != 0,
        }
    }
}

/// Where an item's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Inline(Bytes),
    /// Overflow chain starting at `pgno`, `total_len` bytes long
    Overflow { pgno: u32, total_len: u32 },
    /// Off-page duplicate tree rooted at `pgno`
    Duplicate { pgno: u32 },
}

impl Payload {
    /// Inline bytes, if the payload lives on the page
    pub fn inline(&self) -> Option<&Bytes> {
        match self {
            Payload::Inline(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Entry on an internal btree page
#[derive(Debug, Clone)]
pub struct InternalEntry {
    pub len: u16,
    pub item_type: ItemType,
    /// Page number of the referenced child
    pub child: u32,
    /// Record count of the child subtree
    pub nrecs: u32,
    /// Separator key (empty or meaningless on entry 0)
    pub key: Payload,
}

impl InternalEntry {
    /// Size of the fixed header
    pub const HEADER_SIZE: usize = 12;
}

/// Key or data item on a leaf btree page
#[derive(Debug, Clone)]
pub struct LeafItem {
    pub len: u16,
    pub item_type: ItemType,
    pub payload: Payload,
}

impl LeafItem {
    /// Size of the fixed header
    pub const HEADER_SIZE: usize = 3;
    /// Size of an overflow or duplicate reference
    pub const OFF_PAGE_SIZE: usize = 12;
}

/// Decode the tail of an off-page reference (after its 3-byte header)
fn read_off_page<R: Read>(r: &mut R, item_type: ItemType) -> io::Result<Payload> {
    let _unused = r.read_u8()?;
    let pgno = r.read_u32::<LittleEndian>()?;
    let total_len = r.read_u32::<LittleEndian>()?;
    Ok(match item_type.kind {
        ItemKind::Duplicate => Payload::Duplicate { pgno },
        _ => Payload::Overflow { pgno, total_len },
    })
}

fn read_bytes<R: Read>(r: &mut R, len: usize) -> io::Result<Bytes> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(Bytes::from(buf))
}

fn check_item_bounds(page_size: u32, pgno: u32, index: usize, offset: u16, size: usize) -> BdbResult<()> {
    if usize::from(offset) + size > page_size as usize {
        return Err(BdbError::InvalidFormat(format!(
            "Entry {} on page {} at offset {} overruns the page",
            index, pgno, offset
        )));
    }
    Ok(())
}

impl<R: Read + Seek> PageIO<R> {
    /// Decode internal entry `index` of page `pgno`, located at `offset`
    pub fn read_internal(&mut self, pgno: u32, index: usize, offset: u16) -> BdbResult<InternalEntry> {
        let page_size = self.page_size();
        check_item_bounds(page_size, pgno, index, offset, InternalEntry::HEADER_SIZE)?;
        let annotate = |e| BdbError::page_io(pgno, Some(index), e);

        let r = self.seek_to(pgno, u32::from(offset)).map_err(annotate)?;
        let mut header = [0u8; InternalEntry::HEADER_SIZE];
        r.read_exact(&mut header).map_err(annotate)?;

        let mut cursor = Cursor::new(&header[..]);
        let len = cursor.read_u16::<LittleEndian>().map_err(annotate)?;
        let item_type = ItemType::from(cursor.read_u8().map_err(annotate)?);
        let _unused = cursor.read_u8().map_err(annotate)?;
        let child = cursor.read_u32::<LittleEndian>().map_err(annotate)?;
        let nrecs = cursor.read_u32::<LittleEndian>().map_err(annotate)?;

        check_item_bounds(page_size, pgno, index, offset, InternalEntry::HEADER_SIZE + usize::from(len))?;
        let data = read_bytes(r, usize::from(len)).map_err(annotate)?;

        let key = match item_type.kind {
            ItemKind::Overflow => {
                if data.len() < LeafItem::OFF_PAGE_SIZE {
                    return Err(BdbError::InvalidFormat(format!(
                        "Overflow key of entry {} on page {} is {} bytes",
                        index,
                        pgno,
                        data.len()
                    )));
                }
                let mut cursor = Cursor::new(&data[LeafItem::HEADER_SIZE..]);
                read_off_page(&mut cursor, item_type).map_err(annotate)?
            }
            _ => Payload::Inline(data),
        };

        Ok(InternalEntry {
            len,
            item_type,
            child,
            nrecs,
            key,
        })
    }

    /// Decode leaf item `index` of page `pgno`, located at `offset`
    pub fn read_leaf_item(&mut self, pgno: u32, index: usize, offset: u16) -> BdbResult<LeafItem> {
        let page_size = self.page_size();
        check_item_bounds(page_size, pgno, index, offset, LeafItem::HEADER_SIZE)?;
        let annotate = |e| BdbError::page_io(pgno, Some(index), e);

        let r = self.seek_to(pgno, u32::from(offset)).map_err(annotate)?;
        let len = r.read_u16::<LittleEndian>().map_err(annotate)?;
        let item_type = ItemType::from(r.read_u8().map_err(annotate)?);

        let payload = match item_type.kind {
            ItemKind::Overflow | ItemKind::Duplicate => {
                check_item_bounds(page_size, pgno, index, offset, LeafItem::OFF_PAGE_SIZE)?;
                let r = self.seek_to(pgno, u32::from(offset) + LeafItem::HEADER_SIZE as u32)
                    .map_err(annotate)?;
                read_off_page(r, item_type).map_err(annotate)?
            }
            _ => {
                check_item_bounds(page_size, pgno, index, offset, LeafItem::HEADER_SIZE + usize::from(len))?;
                let r = self.seek_to(pgno, u32::from(offset) + LeafItem::HEADER_SIZE as u32)
                    .map_err(annotate)?;
                Payload::Inline(read_bytes(r, usize::from(len)).map_err(annotate)?)
            }
        };

        Ok(LeafItem {
            len,
            item_type,
            payload,
        })
    }
}
