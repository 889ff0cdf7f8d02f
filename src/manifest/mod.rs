//! Manifest parsing: the ordered list of songs a run should leave on disk.
//!
//! Two shapes are accepted:
//!
//! - **Plain**: one query per line; blank lines and `#` comments are ignored.
//! - **Table**: pipe-delimited Markdown tables. Rows after a separator row
//!   (`|---|---|`) are read as `| artist | title | ... |` and become the
//!   query `"artist title"`. Any non-pipe line ends the current table.
//!
//! Malformed or short rows are skipped silently.

mod error;

pub use error::ManifestError;

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

static SEPARATOR_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:?-{3,}:?$").unwrap_or_else(|e| panic!("invalid static regex: {e}"))
});

/// Manifest shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestFormat {
    /// Table when the text contains a separator row, plain otherwise.
    #[default]
    Auto,
    /// One query per line.
    Plain,
    /// Markdown table rows.
    Table,
}

impl FromStr for ManifestFormat {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "plain" | "list" => Ok(Self::Plain),
            "table" | "markdown" | "md" => Ok(Self::Table),
            _ => Err(ManifestError::UnknownFormat {
                name: s.to_string(),
            }),
        }
    }
}

/// Reads and parses the manifest at `path`.
///
/// # Errors
///
/// Returns [`ManifestError::Read`] when the file is missing or unreadable.
#[instrument(fields(path = %path.display()))]
pub fn load_manifest(path: &Path, format: ManifestFormat) -> Result<Vec<String>, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|e| ManifestError::read(path, e))?;
    Ok(parse_manifest(&text, format))
}

/// Parses manifest text into queries, preserving order.
#[must_use]
pub fn parse_manifest(text: &str, format: ManifestFormat) -> Vec<String> {
    let resolved = match format {
        ManifestFormat::Auto => detect_format(text),
        other => other,
    };
    let queries = match resolved {
        ManifestFormat::Table => parse_table(text),
        ManifestFormat::Plain | ManifestFormat::Auto => parse_plain(text),
    };
    debug!(format = ?resolved, queries = queries.len(), "manifest parsed");
    queries
}

/// Picks [`ManifestFormat::Table`] when any line is a table separator row.
#[must_use]
pub fn detect_format(text: &str) -> ManifestFormat {
    let has_separator = text
        .lines()
        .filter_map(table_cells)
        .any(|cells| is_separator_row(&cells));
    if has_separator {
        ManifestFormat::Table
    } else {
        ManifestFormat::Plain
    }
}

/// One query per non-empty, non-comment line.
#[must_use]
pub fn parse_plain(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `"{artist} {title}"` for every data row of every table.
#[must_use]
pub fn parse_table(text: &str) -> Vec<String> {
    let mut queries = Vec::new();
    let mut in_rows = false;

    for line in text.lines() {
        let Some(cells) = table_cells(line) else {
            in_rows = false;
            continue;
        };
        if is_separator_row(&cells) {
            in_rows = true;
            continue;
        }
        if !in_rows {
            continue;
        }
        if let [artist, title, ..] = cells.as_slice()
            && !artist.is_empty()
            && !title.is_empty()
        {
            queries.push(format!("{artist} {title}"));
        }
    }
    queries
}

/// Inner cells of a pipe row, or `None` for a non-table line.
fn table_cells(line: &str) -> Option<Vec<&str>> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|')?;
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    Some(inner.split('|').map(str::trim).collect())
}

fn is_separator_row(cells: &[&str]) -> bool {
    !cells.is_empty() && cells.iter().all(|cell| SEPARATOR_CELL_RE.is_match(cell))
}
