//! Outbound HTTP safety controls (domain allowlist, redirects, limits, redaction).
//!
//! This module is policy-only. Each server kind picks a policy:
//! - fetch: restricted to an allowlist of domains (subdomains included)
//! - declarative proxies: pinned to the descriptor's base URL origin

use crate::runtime::HttpToolsError;
use std::collections::BTreeSet;
use url::Url;

/// Maximum redirect hops followed when redirects are checked.
const MAX_REDIRECTS: usize = 10;

/// A set of allowlisted domains.
///
/// A host is allowed when it equals an entry or is a subdomain of one (`host` ends with
/// `"." + entry`). Matching is case-insensitive and never a plain substring test, so
/// `evil-example.com` does not match `example.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist {
    domains: BTreeSet<String>,
}

impl DomainAllowlist {
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    /// Parse a comma-separated list (`"a.com, b.org"`).
    #[must_use]
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    #[must_use]
    pub fn allows_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// `true` if `url` is http(s) and its host is allowlisted.
    #[must_use]
    pub fn allows_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|h| self.allows_host(h))
    }
}

#[derive(Debug, Clone)]
pub enum RedirectPolicy {
    /// Do not follow redirects.
    None,
    /// Follow redirects, but re-check the destination URL on each hop.
    Checked,
}

#[derive(Debug, Clone)]
pub struct OutboundHttpSafety {
    /// If set, only hosts matching this allowlist are reachable.
    pub allowed_domains: Option<DomainAllowlist>,
    /// Maximum response body size (bytes). `None` = unlimited.
    pub max_response_bytes: Option<usize>,
    /// Redirect behavior.
    pub redirects: RedirectPolicy,
}

impl OutboundHttpSafety {
    /// Policy for the generic fetch server: allowlist enforced on every hop.
    #[must_use]
    pub fn allowlisted(allowlist: DomainAllowlist, max_response_bytes: usize) -> Self {
        Self {
            allowed_domains: Some(allowlist),
            max_response_bytes: Some(max_response_bytes),
            redirects: RedirectPolicy::Checked,
        }
    }

    /// Policy for declarative proxies: the target is pinned by configuration, redirects are
    /// not followed.
    #[must_use]
    pub fn pinned(max_response_bytes: Option<usize>) -> Self {
        Self {
            allowed_domains: None,
            max_response_bytes,
            redirects: RedirectPolicy::None,
        }
    }

    /// Validate a URL before making an outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Blocked`] for non-`http(s)` schemes, URLs without a host, and
    /// hosts outside the allowlist.
    pub fn check_url(&self, url: &Url) -> Result<(), HttpToolsError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(HttpToolsError::Blocked(format!(
                "unsupported URL scheme '{scheme}'"
            )));
        }

        let Some(host) = url.host_str() else {
            return Err(HttpToolsError::Blocked("missing URL host".to_string()));
        };

        if let Some(allowed) = &self.allowed_domains
            && !allowed.allows_host(host)
        {
            return Err(HttpToolsError::Blocked("domain not allowed".to_string()));
        }

        Ok(())
    }

    /// Build a `reqwest` client honoring the redirect policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(&self) -> Result<reqwest::Client, HttpToolsError> {
        let redirect = match (&self.redirects, &self.allowed_domains) {
            (RedirectPolicy::None, _) => reqwest::redirect::Policy::none(),
            (RedirectPolicy::Checked, None) => reqwest::redirect::Policy::limited(MAX_REDIRECTS),
            (RedirectPolicy::Checked, Some(allowlist)) => {
                let allowlist = allowlist.clone();
                reqwest::redirect::Policy::custom(move |attempt| {
                    if attempt.previous().len() >= MAX_REDIRECTS {
                        attempt.error("too many redirects")
                    } else if allowlist.allows_url(attempt.url()) {
                        attempt.follow()
                    } else {
                        attempt.stop()
                    }
                })
            }
        };
        reqwest::Client::builder()
            .redirect(redirect)
            .build()
            .map_err(HttpToolsError::from)
    }
}

/// Read a response body, failing once it exceeds `max_bytes`.
///
/// # Errors
///
/// Returns [`HttpToolsError::Blocked`] when the body is larger than the limit and
/// [`HttpToolsError::Transport`] on read failures.
pub async fn read_body_limited(
    mut response: reqwest::Response,
    max_bytes: Option<usize>,
) -> Result<Vec<u8>, HttpToolsError> {
    let Some(max) = max_bytes else {
        let bytes = response.bytes().await.map_err(HttpToolsError::from)?;
        return Ok(bytes.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(HttpToolsError::Blocked(format!(
            "response too large: {len} bytes (limit {max})"
        )));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(HttpToolsError::from)? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(HttpToolsError::Blocked(format!(
                "response too large: exceeded {max} bytes"
            )));
        }
        out.extend_from_slice(&chunk);
    }

    Ok(out)
}

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
