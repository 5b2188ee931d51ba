//! BDB Engine - read-only Berkeley DB btree reader
//!
//! This crate decodes btree database files page by page and answers
//! exact-match key lookups without linking the original database library.

pub mod error;
pub mod storage;
pub mod file_manager;
pub mod reader;

pub use error::{BdbError, BdbResult, ErrorKind};
pub use file_manager::{CacheStats, SharedReader};
pub use reader::{detect, open, open_path, open_with_options, Reader, ReaderOptions};
pub use storage::{AccessMethod, Metadata};
