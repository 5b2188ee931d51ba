//! Storage layer for the btree file format
//!
//! This module handles the low-level binary format of database files:
//! - Metadata (page 0) parsing
//! - Page headers and entry-offset tables
//! - Internal and leaf item decoding
//! - B+ tree search

pub mod meta;
pub mod page;
pub mod entry;
pub mod btree;

#[cfg(test)]
pub(crate) mod fixture;

pub use meta::{AccessMethod, Metadata};
pub use page::{Page, PageHeader, PageType};
pub use entry::{InternalEntry, ItemKind, LeafItem, Payload};
pub use btree::{BTreeReader, Entry};
