//! Page I/O and page structure definitions
//!
//! Database files are organized into fixed-size pages. The page size is
//! set at file creation and stored in the metadata (page 0). Every page
//! starts with a 26-byte header; pages that hold items follow it with a
//! table of two-byte entry offsets.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use tracing::trace;

use crate::error::{BdbError, BdbResult};
use super::meta::Lsn;

/// Page type identifiers (byte 25 of the page header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    Invalid,
    /// Duplicate page (deprecated)
    Duplicate,
    /// Unsorted hash page (deprecated)
    HashUnsorted,
    /// Btree internal
    InternalBTree,
    /// Recno internal
    InternalRecno,
    /// Btree leaf
    LeafBTree,
    /// Recno leaf
    LeafRecno,
    /// Overflow chain page
    Overflow,
    HashMeta,
    BTreeMeta,
    QueueMeta,
    QueueData,
    /// Off-page duplicate leaf
    LeafDuplicate,
    /// Sorted hash page
    Hash,
    HeapMeta,
    Heap,
    /// Heap internal
    InternalHeap,
    /// Any value outside the known range
    Unknown(u8),
}

impl From<u8> for PageType {
    fn from(value: u8) -> Self {
        match value {
            0 => PageType::Invalid,
            1 => PageType::Duplicate,
            2 => PageType::HashUnsorted,
            3 => PageType::InternalBTree,
            4 => PageType::InternalRecno,
            5 => PageType::LeafBTree,
            6 => PageType::LeafRecno,
            7 => PageType::Overflow,
            8 => PageType::HashMeta,
            9 => PageType::BTreeMeta,
            10 => PageType::QueueMeta,
            11 => PageType::QueueData,
            12 => PageType::LeafDuplicate,
            13 => PageType::Hash,
            14 => PageType::HeapMeta,
            15 => PageType::Heap,
            16 => PageType::InternalHeap,
            other => PageType::Unknown(other),
        }
    }
}

impl PageType {
    /// Check if this is a leaf page type
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            PageType::LeafBTree | PageType::LeafRecno | PageType::LeafDuplicate
        )
    }

    /// Check if pages of this type carry an entry-offset table.
    /// Overflow pages reuse the entry count as a reference count.
    pub fn has_entry_table(&self) -> bool {
        matches!(
            self,
            PageType::Duplicate
                | PageType::HashUnsorted
                | PageType::InternalBTree
                | PageType::InternalRecno
                | PageType::LeafBTree
                | PageType::LeafRecno
                | PageType::LeafDuplicate
                | PageType::Hash
        )
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageType::Invalid => f.write_str("Invalid"),
            PageType::Duplicate => f.write_str("Duplicate"),
            PageType::HashUnsorted => f.write_str("HashUnsorted"),
            PageType::InternalBTree => f.write_str("IBTree"),
            PageType::InternalRecno => f.write_str("IRecNo"),
            PageType::LeafBTree => f.write_str("LBTree"),
            PageType::LeafRecno => f.write_str("LRecNo"),
            PageType::Overflow => f.write_str("Overflow"),
            PageType::HashMeta => f.write_str("HashMeta"),
            PageType::BTreeMeta => f.write_str("BTreeMeta"),
            PageType::QueueMeta => f.write_str("QAMMeta"),
            PageType::QueueData => f.write_str("QAMData"),
            PageType::LeafDuplicate => f.write_str("LDup"),
            PageType::Hash => f.write_str("Hash"),
            PageType::HeapMeta => f.write_str("HeapMeta"),
            PageType::Heap => f.write_str("Heap"),
            PageType::InternalHeap => f.write_str("IHeap"),
            PageType::Unknown(n) => write!(f, "pageType({})", n),
        }
    }
}

/// Common page header (first 26 bytes of each page)
#[derive(Debug, Clone)]
pub struct PageHeader {
    pub lsn: Lsn,
    /// Page number as recorded on the page
    pub pgno: u32,
    pub prev_pgno: u32,
    pub next_pgno: u32,
    /// Number of items (reference count on overflow pages)
    pub entries: u16,
    /// High free byte offset (data length on overflow pages)
    pub hf_offset: u16,
    /// Btree level, 1 for leaves
    pub level: u8,
    pub page_type: PageType,
}

impl PageHeader {
    /// Size of the page header in bytes
    pub const SIZE: usize = 26;

    /// Read a page header from bytes
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < Self::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Page header too short",
            ));
        }

        let mut cursor = Cursor::new(data);
        let lsn = Lsn::read_from(&mut cursor)?;
        let pgno = cursor.read_u32::<LittleEndian>()?;
        let prev_pgno = cursor.read_u32::<LittleEndian>()?;
        let next_pgno = cursor.read_u32::<LittleEndian>()?;
        let entries = cursor.read_u16::<LittleEndian>()?;
        let hf_offset = cursor.read_u16::<LittleEndian>()?;
        let level = cursor.read_u8()?;
        let page_type = PageType::from(cursor.read_u8()?);

        Ok(PageHeader {
            lsn,
            pgno,
            prev_pgno,
            next_pgno,
            entries,
            hf_offset,
            level,
            page_type,
        })
    }
}

/// A decoded page: header plus entry-offset table
#[derive(Debug, Clone)]
pub struct Page {
    pub header: PageHeader,
    /// Byte offset of each entry, relative to the page start
    pub entry_offsets: Vec<u16>,
}

impl Page {
    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    /// Number of entries in the offset table
    pub fn len(&self) -> usize {
        self.entry_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_offsets.is_empty()
    }

    /// Check if this is a leaf page
    pub fn is_leaf(&self) -> bool {
        self.header.page_type.is_leaf()
    }

    /// Byte offset of entry `index`, checked against the table length
    pub fn entry_offset(&self, pgno: u32, index: usize) -> BdbResult<u16> {
        self.entry_offsets.get(index).copied().ok_or_else(|| {
            BdbError::InvalidFormat(format!(
                "Entry {} beyond {} entries on page {}",
                index,
                self.entry_offsets.len(),
                pgno
            ))
        })
    }
}

/// Positioned page reads on a seekable stream
pub struct PageIO<R> {
    inner: R,
    page_size: u32,
}

impl<R: Read + Seek> PageIO<R> {
    /// Create a new PageIO wrapper
    pub fn new(inner: R, page_size: u32) -> Self {
        PageIO { inner, page_size }
    }

    /// Get the page size
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Seek to `offset` bytes into page `pgno` and hand out the stream
    pub fn seek_to(&mut self, pgno: u32, offset: u32) -> io::Result<&mut R> {
        let pos = u64::from(pgno) * u64::from(self.page_size) + u64::from(offset);
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(&mut self.inner)
    }

    /// Read the header and entry-offset table of a page
    pub fn read_page(&mut self, pgno: u32) -> BdbResult<Page> {
        trace!(pgno, "reading page header");
        let annotate = |e| BdbError::page_io(pgno, None, e);

        let r = self.seek_to(pgno, 0).map_err(annotate)?;
        let mut buf = [0u8; PageHeader::SIZE];
        r.read_exact(&mut buf).map_err(annotate)?;
        let header = PageHeader::from_bytes(&buf).map_err(annotate)?;

        if !header.page_type.has_entry_table() {
            return Ok(Page {
                header,
                entry_offsets: Vec::new(),
            });
        }

        let table_end = PageHeader::SIZE + 2 * usize::from(header.entries);
        if table_end > self.page_size as usize {
            return Err(BdbError::InvalidFormat(format!(
                "Page {} claims {} entries, offset table overruns the {}-byte page",
                pgno, header.entries, self.page_size
            )));
        }

        let mut table = vec![0u8; 2 * usize::from(header.entries)];
        self.inner.read_exact(&mut table).map_err(annotate)?;
        let entry_offsets = table
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Page {
            header,
            entry_offsets,
        })
    }

    /// Read `buf.len()` bytes starting `offset` bytes into page `pgno`
    pub fn read_at(&mut self, pgno: u32, offset: u32, buf: &mut [u8]) -> io::Result<()> {
        self.seek_to(pgno, offset)?.read_exact(buf)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}
