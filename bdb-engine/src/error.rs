//! Error handling for the reader
//!
//! Every failure surfaces to the immediate caller. Nothing is retried and no
//! partial results are returned.

use std::io;

use thiserror::Error;

use crate::storage::meta::AccessMethod;
use crate::storage::page::PageType;

/// Flat classification of a [`BdbError`], suitable for exit codes and matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Header magic does not match the btree constant
    BadMagic,
    /// Access method is recognised but not implemented, or not recognised at all
    UnsupportedFormat,
    /// Page number outside `0..=last_pgno`
    OutOfRange,
    /// Traversal reached a page the search cannot handle
    UnexpectedPageType,
    /// Key is absent
    NotFound,
    /// Operation is not supported by this reader
    Unsupported,
    /// Descent revisited a page
    CycleDetected,
    /// Structurally invalid file
    InvalidFormat,
    /// Underlying stream failed or ended early
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::BadMagic => "bad magic",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::OutOfRange => "page out of range",
            ErrorKind::UnexpectedPageType => "unexpected page type",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unsupported => "unsupported operation",
            ErrorKind::CycleDetected => "cycle detected",
            ErrorKind::InvalidFormat => "invalid format",
            ErrorKind::Io => "I/O error",
        })
    }
}

/// Main error type for the reader
#[derive(Error, Debug)]
pub enum BdbError {
    #[error("wanted magic 0x{expected:06x}, got 0x{found:06x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported format (magic 0x{magic:08x}{})", describe_format(.method, .byte_swapped))]
    UnsupportedFormat {
        magic: u32,
        method: Option<AccessMethod>,
        byte_swapped: bool,
    },

    #[error("page {page} out of range (last page is {last})")]
    OutOfRange { page: u32, last: u32 },

    #[error("unexpected page type {page_type} on page {page}")]
    UnexpectedPageType { page: u32, page_type: PageType },

    #[error("key not found")]
    NotFound,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("page {page} visited twice")]
    CycleDetected { page: u32 },

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("I/O error on page {page}{}: {source}", describe_entry(.entry))]
    PageIo {
        page: u32,
        entry: Option<usize>,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe_format(method: &Option<AccessMethod>, byte_swapped: &bool) -> String {
    let mut out = String::new();
    if let Some(method) = method {
        out.push_str(&format!(", {} access method", method));
    }
    if *byte_swapped {
        out.push_str(", big-endian");
    }
    out
}

fn describe_entry(entry: &Option<usize>) -> String {
    entry.map(|i| format!(" entry {}", i)).unwrap_or_default()
}

impl BdbError {
    /// Annotate an I/O error with the page (and entry, if known) being decoded
    pub fn page_io(page: u32, entry: Option<usize>, source: io::Error) -> Self {
        BdbError::PageIo { page, entry, source }
    }

    /// Get the flat kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BdbError::BadMagic { .. } => ErrorKind::BadMagic,
            BdbError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            BdbError::OutOfRange { .. } => ErrorKind::OutOfRange,
            BdbError::UnexpectedPageType { .. } => ErrorKind::UnexpectedPageType,
            BdbError::NotFound => ErrorKind::NotFound,
            BdbError::Unsupported(_) => ErrorKind::Unsupported,
            BdbError::CycleDetected { .. } => ErrorKind::CycleDetected,
            BdbError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            BdbError::PageIo { .. } | BdbError::Io(_) => ErrorKind::Io,
        }
    }

    /// Check if the key was simply absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, BdbError::NotFound)
    }
}

/// Result type for reader operations
pub type BdbResult<T> = Result<T, BdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(BdbError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            BdbError::OutOfRange { page: 9, last: 3 }.kind(),
            ErrorKind::OutOfRange
        );
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        assert_eq!(BdbError::page_io(2, Some(4), io).kind(), ErrorKind::Io);
        assert_eq!(BdbError::Unsupported("keys").kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_not_found_check() {
        assert!(BdbError::NotFound.is_not_found());
        assert!(!BdbError::Unsupported("key enumeration").is_not_found());
    }

    #[test]
    fn test_messages() {
        let err = BdbError::BadMagic {
            expected: 0x053162,
            found: 0x061561,
        };
        assert_eq!(err.to_string(), "wanted magic 0x053162, got 0x061561");

        let err = BdbError::UnsupportedFormat {
            magic: 0x061561,
            method: Some(AccessMethod::Hash),
            byte_swapped: false,
        };
        assert_eq!(
            err.to_string(),
            "unsupported format (magic 0x00061561, hash access method)"
        );

        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        let err = BdbError::page_io(3, Some(5), io);
        assert_eq!(err.to_string(), "I/O error on page 3 entry 5: short");
    }
}
