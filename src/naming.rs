//! Deterministic local names for downloaded artifacts.
//!
//! Names are derived from catalog metadata only, so two runs over the same
//! manifest always produce the same paths. Distinct songs whose sanitized
//! names coincide collide; that is accepted and reported by the sync loop.

use std::path::{Path, PathBuf};

use url::Url;

/// Maximum length of a sanitized name, in UTF-8 bytes.
///
/// File systems cap a name at 255 bytes; the longest suffix added to a stem
/// is `.trans.txt.part` (15 bytes).
pub const MAX_NAME_BYTES: usize = 240;

/// Longest extension accepted from metadata or URLs.
const MAX_EXTENSION_CHARS: usize = 8;

/// Suffix of the primary lyric file.
pub const LYRIC_SUFFIX: &str = "lrc";

/// Suffix of the translated lyric file.
pub const TRANSLATION_SUFFIX: &str = "trans.txt";

/// Makes `value` safe to use as (part of) a file name.
///
/// Replaces `\ / : * ? " < > |` with `_`, turns control characters into
/// spaces, collapses whitespace runs, trims, and bounds the result to
/// [`MAX_NAME_BYTES`] bytes, cutting on a character boundary. Trailing dots
/// are dropped. The function is idempotent.
///
/// ```
/// use songsync_core::naming::sanitize;
///
/// assert_eq!(sanitize("AC/DC:  Back\tin Black?"), "AC_DC_ Back in Black_");
/// assert_eq!(sanitize(&sanitize("a  b")), sanitize("a  b"));
/// ```
#[must_use]
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for ch in value.chars() {
        let mapped = match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => ' ',
            c => c,
        };
        if mapped == ' ' {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(mapped);
    }

    truncate_to_bytes(&out, MAX_NAME_BYTES)
        .trim_end_matches([' ', '.'])
        .to_string()
}

/// Longest prefix of `value` that fits in `max` bytes and ends on a char boundary.
fn truncate_to_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Normalizes a format hint into a bare lowercase extension.
///
/// Returns `None` for empty or implausible values.
#[must_use]
pub fn sanitize_extension(hint: &str) -> Option<String> {
    let ext = hint.trim().trim_start_matches('.').to_ascii_lowercase();
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_CHARS
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then_some(ext)
}

/// Extension of the last path segment of `url`, if it has a plausible one.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last_segment).ok()?;
    let (_, ext) = decoded.rsplit_once('.')?;
    sanitize_extension(ext)
}

/// Canonical base name shared by a song's payload and lyric files.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    stem: String,
}

impl ArtifactName {
    /// Builds `"{title} - {author}"` from sanitized parts.
    ///
    /// An empty author yields just the title. Returns `None` when nothing
    /// usable remains after sanitization.
    #[must_use]
    pub fn new(title: &str, author: &str) -> Option<Self> {
        let title = sanitize(title);
        let author = sanitize(author);
        let joined = match (title.is_empty(), author.is_empty()) {
            (true, true) => return None,
            (false, true) => title,
            (true, false) => author,
            (false, false) => format!("{title} - {author}"),
        };
        let stem = sanitize(&joined);
        (!stem.is_empty()).then_some(Self { stem })
    }

    /// The sanitized base name without extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// `dir/{stem}.{ext}`
    #[must_use]
    pub fn payload_path(&self, dir: &Path, ext: &str) -> PathBuf {
        dir.join(format!("{}.{ext}", self.stem))
    }

    /// `dir/{stem}.lrc`
    #[must_use]
    pub fn lyric_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{LYRIC_SUFFIX}", self.stem))
    }

    /// `dir/{stem}.trans.txt`
    #[must_use]
    pub fn translation_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{TRANSLATION_SUFFIX}", self.stem))
    }
}

impl std::fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stem)
    }
}
