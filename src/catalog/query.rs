//! Search query normalization.

/// Characters commonly used to join artist and title that the search API
/// handles better as plain spaces.
///
/// `/` and `,` are split too, so a name that contains them ("AC/DC") is
/// searched as separate words. The search is fuzzy and still matches.
const SEPARATORS: [char; 8] = ['-', '–', '—', '_', '/', '|', '·', ','];

/// Turns separator punctuation into spaces, collapses whitespace and trims.
///
/// ```
/// use songsync_core::catalog::normalize_query;
///
/// assert_eq!(normalize_query("周杰伦 - 晴天"), "周杰伦 晴天");
/// assert_eq!(normalize_query("  Song-A   Artist-A "), "Song A Artist A");
/// assert_eq!(normalize_query(" -- "), "");
/// ```
#[must_use]
pub fn normalize_query(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
