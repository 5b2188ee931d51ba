//! bdbtool - inspect and query Berkeley DB btree files
//!
//! Exit status is 0 on success, 1 when `get` finds no such key and 2 on
//! any other error.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use bdb_engine::storage::{Entry, Payload};
use bdb_engine::{open_path, BdbError, Reader, ReaderOptions};

mod config;

use config::Config;

/// Read-only inspection of Berkeley DB btree files
#[derive(Parser, Debug)]
#[command(name = "bdbtool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Page cache size (number of pages); unbounded by default
    #[arg(long)]
    cache_pages: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the database metadata
    Info { file: PathBuf },
    /// Print the value stored under a key
    Get {
        file: PathBuf,
        key: String,
        /// Key is given as hex
        #[arg(long)]
        hex_key: bool,
        /// Print the value as hex
        #[arg(long)]
        hex: bool,
    },
    /// Print whether a key is present
    Has {
        file: PathBuf,
        key: String,
        /// Key is given as hex
        #[arg(long)]
        hex_key: bool,
    },
    /// Dump a page header and its decoded entries
    Page { file: PathBuf, pgno: u32 },
}

/// Settings after merging the config file with command-line flags
#[derive(Debug)]
struct Settings {
    log_level: Level,
    reader: ReaderOptions,
}

impl Settings {
    fn resolve(args: &Args) -> Result<Self> {
        let config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        let level = args
            .log_level
            .as_deref()
            .or(config.log_level.as_deref())
            .unwrap_or("warn");

        let mut reader = config.reader;
        if args.cache_pages.is_some() {
            reader.cache_pages = args.cache_pages;
        }

        Ok(Settings {
            log_level: parse_level(level),
            reader,
        })
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let text = text.trim_start_matches("0x");
    if !text.is_ascii() {
        bail!("hex key contains non-hex characters");
    }
    if text.len() % 2 != 0 {
        bail!("hex key has an odd number of digits");
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .with_context(|| format!("invalid hex digits {:?}", &text[i..i + 2]))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn key_bytes(key: &str, hex: bool) -> Result<Vec<u8>> {
    if hex {
        parse_hex(key)
    } else {
        Ok(key.as_bytes().to_vec())
    }
}

fn open_db(file: &Path, options: &ReaderOptions) -> Result<Reader<std::fs::File>> {
    open_path(file, options).with_context(|| format!("opening {}", file.display()))
}

fn describe_payload(payload: &Payload) -> String {
    match payload {
        Payload::Inline(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        Payload::Overflow { pgno, total_len } => {
            format!("<overflow: {} bytes from page {}>", total_len, pgno)
        }
        Payload::Duplicate { pgno } => format!("<duplicates on page {}>", pgno),
    }
}

fn print_info(out: &mut impl Write, reader: &Reader<std::fs::File>) -> io::Result<()> {
    let meta = reader.metadata();
    writeln!(out, "Access method: {}", reader.access_method())?;
    writeln!(out, "Magic: 0x{:06x}", meta.magic)?;
    writeln!(out, "Version: {}", meta.version)?;
    writeln!(out, "Page size: {} bytes", meta.page_size)?;
    writeln!(out, "Last page: {}", meta.last_pgno)?;
    writeln!(out, "Root page: {}", meta.root)?;
    writeln!(out, "Free list page: {}", meta.free)?;
    writeln!(out, "Keys (cached): {}", meta.key_count)?;
    writeln!(out, "Records (cached): {}", meta.record_count)?;
    writeln!(out, "Min key: {}", meta.min_key)?;
    writeln!(out, "Flags: {:?}", meta.flags)?;
    writeln!(out, "Meta flags: {:?}", meta.meta_flags)?;
    writeln!(out, "Encrypted: {}", meta.is_encrypted())?;
    writeln!(out, "File id: {}", to_hex(&meta.uid))?;
    Ok(())
}

fn print_page(out: &mut impl Write, reader: &mut Reader<std::fs::File>, pgno: u32) -> Result<()> {
    let page = reader.page(pgno)?;
    let h = &page.header;
    writeln!(out, "=== Page {} ===", pgno)?;
    writeln!(out, "  Type: {}", h.page_type)?;
    writeln!(out, "  Level: {}", h.level)?;
    writeln!(out, "  Prev/next: {} / {}", h.prev_pgno, h.next_pgno)?;
    writeln!(out, "  Entries: {}", h.entries)?;
    writeln!(out, "  High free offset: {}", h.hf_offset)?;

    let entries = match reader.entries(pgno) {
        Ok(entries) => entries,
        Err(BdbError::UnexpectedPageType { .. }) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    for (i, entry) in entries.iter().enumerate() {
        let offset = page.entry_offsets[i];
        match entry {
            Entry::Internal(e) => writeln!(
                out,
                "  [{:3}] @{:<5} child={} nrecs={} key={}",
                i,
                offset,
                e.child,
                e.nrecs,
                describe_payload(&e.key)
            )?,
            Entry::Leaf(item) => writeln!(
                out,
                "  [{:3}] @{:<5} {}{}={}",
                i,
                offset,
                if i % 2 == 0 { "key " } else { "data" },
                if item.item_type.deleted { " (deleted)" } else { "" },
                describe_payload(&item.payload)
            )?,
        }
    }
    Ok(())
}

fn run(args: Args, settings: &Settings, out: &mut impl Write) -> Result<ExitCode> {
    match args.command {
        Command::Info { file } => {
            let reader = open_db(&file, &settings.reader)?;
            print_info(out, &reader)?;
        }
        Command::Get { file, key, hex_key, hex } => {
            let key = key_bytes(&key, hex_key)?;
            let mut reader = open_db(&file, &settings.reader)?;
            match reader.get(&key) {
                Ok(value) if hex => writeln!(out, "{}", to_hex(&value))?,
                Ok(value) => writeln!(out, "{}", String::from_utf8_lossy(&value))?,
                Err(BdbError::NotFound) => {
                    debug!("key not found");
                    return Ok(ExitCode::from(1));
                }
                Err(e) => return Err(e.into()),
            }
            debug!(stats = ?reader.cache_stats(), "lookup complete");
        }
        Command::Has { file, key, hex_key } => {
            let key = key_bytes(&key, hex_key)?;
            let mut reader = open_db(&file, &settings.reader)?;
            writeln!(out, "{}", reader.has_key(&key)?)?;
        }
        Command::Page { file, pgno } => {
            let mut reader = open_db(&file, &settings.reader)?;
            print_page(out, &mut reader, pgno)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::resolve(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("bdbtool: {:#}", e);
            return ExitCode::from(2);
        }
    };

    // Set up logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("bdbtool: failed to install logger: {}", e);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(args, &settings, &mut out) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("bdbtool: {:#}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    /// Metadata page plus one leaf page holding the given pairs
    fn single_leaf_file(pairs: &[(&[u8], &[u8])]) -> tempfile::NamedTempFile {
        let mut image = vec![0u8; 1024];
        image[12..16].copy_from_slice(&0x053162u32.to_le_bytes());
        image[20..24].copy_from_slice(&512u32.to_le_bytes());
        image[25] = 9;
        image[32..36].copy_from_slice(&1u32.to_le_bytes());
        image[88..92].copy_from_slice(&1u32.to_le_bytes());

        let page = &mut image[512..];
        let mut low = 512;
        let mut offsets = Vec::new();
        for item in pairs.iter().flat_map(|(k, v)| [*k, *v]) {
            low -= 3 + item.len();
            page[low..low + 2].copy_from_slice(&(item.len() as u16).to_le_bytes());
            page[low + 2] = 1;
            page[low + 3..low + 3 + item.len()].copy_from_slice(item);
            offsets.push(low as u16);
        }
        page[8..12].copy_from_slice(&1u32.to_le_bytes());
        page[20..22].copy_from_slice(&(offsets.len() as u16).to_le_bytes());
        page[22..24].copy_from_slice(&(low as u16).to_le_bytes());
        page[24] = 1;
        page[25] = 5;
        for (i, offset) in offsets.iter().enumerate() {
            page[26 + 2 * i..28 + 2 * i].copy_from_slice(&offset.to_le_bytes());
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();
        file.flush().unwrap();
        file
    }

    fn run_args(argv: &[&str]) -> (Result<ExitCode>, String) {
        let args = Args::try_parse_from(argv).unwrap();
        let settings = Settings::resolve(&args).unwrap();
        let mut out = Vec::new();
        let result = run(args, &settings, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(parse_hex("0x6b01").unwrap(), vec![0x6b, 0x01]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
        assert_eq!(to_hex(&[0x00, 0xff, 0x10]), "00ff10");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::WARN);
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = tempfile::NamedTempFile::new().unwrap();
        writeln!(config, "log_level = \"info\"\n[reader]\ncache_pages = 4").unwrap();
        let path = config.path().to_str().unwrap();

        let args = Args::try_parse_from(["bdbtool", "-c", path, "info", "x.db"]).unwrap();
        let settings = Settings::resolve(&args).unwrap();
        assert_eq!(settings.log_level, Level::INFO);
        assert_eq!(settings.reader.cache_pages, Some(4));

        let args = Args::try_parse_from([
            "bdbtool", "-c", path, "--log-level", "trace", "--cache-pages", "9", "info", "x.db",
        ])
        .unwrap();
        let settings = Settings::resolve(&args).unwrap();
        assert_eq!(settings.log_level, Level::TRACE);
        assert_eq!(settings.reader.cache_pages, Some(9));
    }

    #[test]
    fn test_get_and_has() {
        let db = single_leaf_file(&[(b"alpha", b"1"), (b"beta", b"2")]);
        let path = db.path().to_str().unwrap();

        let (code, out) = run_args(&["bdbtool", "get", path, "beta"]);
        assert_eq!(code.unwrap(), ExitCode::SUCCESS);
        assert_eq!(out, "2\n");

        let (code, out) = run_args(&["bdbtool", "get", path, "616c706861", "--hex-key", "--hex"]);
        assert_eq!(code.unwrap(), ExitCode::SUCCESS);
        assert_eq!(out, "31\n");

        let (code, out) = run_args(&["bdbtool", "get", path, "gamma"]);
        assert_eq!(code.unwrap(), ExitCode::from(1));
        assert!(out.is_empty());

        let (_, out) = run_args(&["bdbtool", "has", path, "alpha"]);
        assert_eq!(out, "true\n");
        let (_, out) = run_args(&["bdbtool", "has", path, "gamma"]);
        assert_eq!(out, "false\n");
    }

    #[test]
    fn test_info_and_page() {
        let db = single_leaf_file(&[(b"alpha", b"1")]);
        let path = db.path().to_str().unwrap();

        let (code, out) = run_args(&["bdbtool", "info", path]);
        assert!(code.is_ok());
        assert!(out.contains("Magic: 0x053162"));
        assert!(out.contains("Root page: 1"));

        let (code, out) = run_args(&["bdbtool", "page", path, "1"]);
        assert!(code.is_ok());
        assert!(out.contains("Type: LBTree"));
        assert!(out.contains("key =\"alpha\""));
        assert!(out.contains("data=\"1\""));

        let (code, _) = run_args(&["bdbtool", "page", path, "7"]);
        assert!(code.is_err());
    }
}
