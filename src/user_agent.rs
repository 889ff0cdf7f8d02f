//! Shared User-Agent string for catalog and payload HTTP traffic.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/songsync";

/// Default User-Agent for every request (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("songsync/{version} (music-library-sync; +{PROJECT_UA_URL})")
}
