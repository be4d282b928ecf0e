//! Shared User-Agent string for page fetches and crawls.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/sitewatch";

/// Default User-Agent for all outbound requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("sitewatch/{version} (change-monitor; +{PROJECT_UA_URL})")
}
