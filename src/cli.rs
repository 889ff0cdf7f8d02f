//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use songsync_core::{DEFAULT_MAX_RETRIES, ManifestFormat};

/// Default destination directory when neither flag nor config names one.
pub const DEFAULT_DEST_DIR: &str = "downloads";

/// Default pause between queries in milliseconds.
pub const DEFAULT_PAUSE_MS: u64 = 2000;

/// Download the songs listed in a manifest and keep a folder in sync with it.
///
/// Songs already on disk are not downloaded again, and files in the
/// destination folder that the manifest no longer lists are removed.
#[derive(Parser, Debug, Clone)]
#[command(name = "songsync")]
#[command(author, version, about)]
pub struct Args {
    /// Manifest file: one query per line, or a Markdown table of artist | title rows
    pub manifest: PathBuf,

    /// Destination directory [default: downloads]
    #[arg(short = 'd', long)]
    pub dest: Option<PathBuf>,

    /// Manifest shape
    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    pub format: FormatArg,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Pause between consecutive songs in milliseconds (0-60000)
    #[arg(long, default_value_t = DEFAULT_PAUSE_MS, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pause_ms: u64,

    /// Catalog API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Privileged location API URL (enables the credentialed fallback)
    #[arg(long)]
    pub privileged_url: Option<String>,

    /// Config file path (overrides $SONGSYNC_CONFIG and the default location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Extension used when the catalog reports no format
    #[arg(long = "fallback-ext")]
    pub fallback_ext: Option<String>,

    /// Keep files that the manifest no longer lists
    #[arg(long)]
    pub no_prune: bool,

    /// Re-download existing files whose size differs from the server's
    #[arg(long)]
    pub verify_existing: bool,

    /// Print the parsed queries and exit without touching the network or disk
    #[arg(long)]
    pub dry_run: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Manifest shape accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Detect from content
    Auto,
    /// One query per line
    Plain,
    /// Markdown table rows
    Table,
}

impl From<FormatArg> for ManifestFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Auto => Self::Auto,
            FormatArg::Plain => Self::Plain,
            FormatArg::Table => Self::Table,
        }
    }
}
