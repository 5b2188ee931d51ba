//! Metadata page (page 0) - database-wide header
//!
//! Every access method shares the first 72 bytes of the metadata page. The
//! btree-specific block follows at offset 72, and the crypto trailer closes
//! the 512-byte region:
//! - Offset 0x0C: magic (u32)
//! - Offset 0x14: page_size (u32)
//! - Offset 0x20: last_pgno (u32)
//! - Offset 0x58: root (u32)
//! - Offset 0x1CC: crypto magic, IV and checksum

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::error::{BdbError, BdbResult};

/// Size of the metadata region at the start of the file
pub const META_SIZE: usize = 512;

/// Magic number of the btree access method (also used by recno)
pub const BTREE_MAGIC: u32 = 0x053162;
/// Magic number of the hash access method
pub const HASH_MAGIC: u32 = 0x061561;
/// Magic number of the queue access method
pub const QUEUE_MAGIC: u32 = 0x042253;
/// Magic number of the heap access method
pub const HEAP_MAGIC: u32 = 0x074582;

/// Smallest legal page size
pub const MIN_PAGE_SIZE: u32 = 512;
/// Largest legal page size
pub const MAX_PAGE_SIZE: u32 = 65536;

const FILE_ID_LEN: usize = 20;
const IV_LEN: usize = 16;
const CHECKSUM_LEN: usize = 20;

/// Database access methods identified by their metadata magic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMethod {
    BTree,
    Hash,
    Recno,
    Queue,
    Heap,
}

impl AccessMethod {
    /// Identify the access method behind a little-endian magic number.
    /// Recno shares the btree magic and is told apart by the metadata flags.
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            BTREE_MAGIC => Some(AccessMethod::BTree),
            HASH_MAGIC => Some(AccessMethod::Hash),
            QUEUE_MAGIC => Some(AccessMethod::Queue),
            HEAP_MAGIC => Some(AccessMethod::Heap),
            _ => None,
        }
    }

    /// Magic number stored in the metadata of this access method
    pub fn magic(&self) -> u32 {
        match self {
            AccessMethod::BTree | AccessMethod::Recno => BTREE_MAGIC,
            AccessMethod::Hash => HASH_MAGIC,
            AccessMethod::Queue => QUEUE_MAGIC,
            AccessMethod::Heap => HEAP_MAGIC,
        }
    }
}

impl std::fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AccessMethod::BTree => "btree",
            AccessMethod::Hash => "hash",
            AccessMethod::Recno => "recno",
            AccessMethod::Queue => "queue",
            AccessMethod::Heap => "heap",
        })
    }
}

bitflags::bitflags! {
    /// Meta-only flags (byte 26)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MetaFlags: u8 {
        /// Pages carry checksums
        const CHECKSUM = 0x01;
        /// Partitioned by key range
        const PART_RANGE = 0x02;
        /// Partitioned by callback
        const PART_CALLBACK = 0x04;
    }
}

bitflags::bitflags! {
    /// Access-method flags (bytes 48-51) as used by btree and recno
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BtreeFlags: u32 {
        const DUP = 0x001;
        const RECNO = 0x002;
        const RECNUM = 0x004;
        const FIXEDLEN = 0x008;
        const RENUMBER = 0x010;
        const SUBDB = 0x020;
        const DUPSORT = 0x040;
        const COMPRESS = 0x080;
    }
}

/// Log sequence number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lsn {
    pub file: u32,
    pub offset: u32,
}

impl Lsn {
    pub(crate) fn read_from(cursor: &mut Cursor<&[u8]>) -> io::Result<Self> {
        Ok(Lsn {
            file: cursor.read_u32::<LittleEndian>()?,
            offset: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Btree metadata - header of a btree database file
#[derive(Debug, Clone)]
pub struct Metadata {
    pub lsn: Lsn,
    /// Page number of the metadata page itself
    pub pgno: u32,
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    /// Encryption algorithm id (0 = none)
    pub encrypt_alg: u8,
    pub page_type: u8,
    pub meta_flags: MetaFlags,
    /// First page on the free list
    pub free: u32,
    /// Page number of the last page in the file
    pub last_pgno: u32,
    pub nparts: u32,
    /// Cached key count (may be stale)
    pub key_count: u32,
    /// Cached record count (may be stale)
    pub record_count: u32,
    pub flags: BtreeFlags,
    pub uid: [u8; FILE_ID_LEN],
    pub min_key: u32,
    /// Recno fixed-length record length
    pub re_len: u32,
    /// Recno fixed-length record pad
    pub re_pad: u32,
    /// Root page of the tree
    pub root: u32,
    pub crypto_magic: u32,
    pub iv: [u8; IV_LEN],
    pub checksum: [u8; CHECKSUM_LEN],
}

impl Metadata {
    /// Decode the metadata region. The slice must hold at least [`META_SIZE`]
    /// bytes. No magic or range validation happens here.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        if data.len() < META_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Metadata region too short",
            ));
        }

        let mut cursor = Cursor::new(data);

        let lsn = Lsn::read_from(&mut cursor)?;
        let pgno = cursor.read_u32::<LittleEndian>()?;
        let magic = cursor.read_u32::<LittleEndian>()?;
        let version = cursor.read_u32::<LittleEndian>()?;
        let page_size = cursor.read_u32::<LittleEndian>()?;
        let encrypt_alg = cursor.read_u8()?;
        let page_type = cursor.read_u8()?;
        let meta_flags = MetaFlags::from_bits_retain(cursor.read_u8()?);
        let _unused = cursor.read_u8()?;
        let free = cursor.read_u32::<LittleEndian>()?;
        let last_pgno = cursor.read_u32::<LittleEndian>()?;
        let nparts = cursor.read_u32::<LittleEndian>()?;
        let key_count = cursor.read_u32::<LittleEndian>()?;
        let record_count = cursor.read_u32::<LittleEndian>()?;
        let flags = BtreeFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let mut uid = [0u8; FILE_ID_LEN];
        cursor.read_exact(&mut uid)?;

        // Btree block at 72
        let _unused = cursor.read_u32::<LittleEndian>()?;
        let min_key = cursor.read_u32::<LittleEndian>()?;
        let re_len = cursor.read_u32::<LittleEndian>()?;
        let re_pad = cursor.read_u32::<LittleEndian>()?;
        let root = cursor.read_u32::<LittleEndian>()?;

        // Trailer at 460
        cursor.set_position(460);
        let crypto_magic = cursor.read_u32::<LittleEndian>()?;
        cursor.set_position(476);
        let mut iv = [0u8; IV_LEN];
        cursor.read_exact(&mut iv)?;
        let mut checksum = [0u8; CHECKSUM_LEN];
        cursor.read_exact(&mut checksum)?;

        Ok(Metadata {
            lsn,
            pgno,
            magic,
            version,
            page_size,
            encrypt_alg,
            page_type,
            meta_flags,
            free,
            last_pgno,
            nparts,
            key_count,
            record_count,
            flags,
            uid,
            min_key,
            re_len,
            re_pad,
            root,
            crypto_magic,
            iv,
            checksum,
        })
    }

    /// Seek to the start of the stream and read validated btree metadata
    pub fn read<R: Read + Seek>(r: &mut R) -> BdbResult<Self> {
        r.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; META_SIZE];
        r.read_exact(&mut buf)?;

        let meta = Metadata::from_bytes(&buf)?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> BdbResult<()> {
        if self.magic != BTREE_MAGIC {
            return Err(BdbError::BadMagic {
                expected: BTREE_MAGIC,
                found: self.magic,
            });
        }

        if !self.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
        {
            return Err(BdbError::InvalidFormat(format!(
                "Invalid page size: {}",
                self.page_size
            )));
        }

        if self.is_encrypted() {
            warn!(
                encrypt_alg = self.encrypt_alg,
                crypto_magic = self.crypto_magic,
                "database appears encrypted, pages are read without decryption"
            );
        }
        if self.meta_flags.contains(MetaFlags::CHECKSUM) {
            debug!("page checksums present but not verified");
        }

        Ok(())
    }

    /// Check if the header advertises encryption
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_alg != 0 || self.crypto_magic != 0
    }

    /// Check if this is actually a recno database sharing the btree magic
    pub fn is_recno(&self) -> bool {
        self.flags.contains(BtreeFlags::RECNO)
    }

    /// Absolute byte offset of a page
    pub fn page_offset(&self, pgno: u32) -> u64 {
        u64::from(pgno) * u64::from(self.page_size)
    }
}
