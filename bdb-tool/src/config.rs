//! Configuration file for bdbtool
//!
//! ```toml
//! log_level = "debug"
//!
//! [reader]
//! cache_pages = 4096
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use bdb_engine::ReaderOptions;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Options passed to the reader
    pub reader: ReaderOptions,
}

impl Config {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
