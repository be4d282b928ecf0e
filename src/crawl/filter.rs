//! Which discovered links a crawl follows.

use url::Url;

/// Path suffixes never followed (images, audio, video, PDF). Compared case-insensitively.
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".pdf", ".png", ".gif", ".mp4", ".mp3", ".avi", ".mov", ".wmv",
];

/// Same-domain link filter.
///
/// A link passes iff its authority (host, plus `:port` when not the scheme
/// default) ends with the base domain, it has no query and no fragment, and
/// its path does not end with an excluded extension.
///
/// The domain test is a plain suffix match, so `ex.com` also admits
/// `sub.ex.com` and `notex.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFilter {
    domain: String,
}

impl LinkFilter {
    /// Creates a filter for `domain` (compared lowercase).
    #[must_use]
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.trim().to_ascii_lowercase(),
        }
    }

    /// Base domain links must end with.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether the crawl should follow `url`.
    #[must_use]
    pub fn accepts(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(authority) = authority(url) else {
            return false;
        };
        if !authority.ends_with(&self.domain) {
            return false;
        }
        if url.query().is_some_and(|q| !q.is_empty())
            || url.fragment().is_some_and(|f| !f.is_empty())
        {
            return false;
        }
        let path = url.path().to_ascii_lowercase();
        !EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

/// `host[:port]` of `url`, lowercase; `None` without a host.
#[must_use]
pub fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}
