//! Session identifier resolution
//!
//! Recording URLs look like `https://connect.example.edu/p1a2b3c4d5e/?launcher=false`.
//! The session token is the last path segment made of the marker `p` followed
//! by ASCII alphanumerics. Resolution never touches the network.

use crate::error::{Error, Result};
use crate::types::{ResolvedSession, SessionId};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Marker every session token starts with
pub const SESSION_MARKER: char = 'p';

fn session_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^[pP][A-Za-z0-9]+$").expect("session grammar is a valid regex")
    })
}

/// Whether a single path segment is a session token
pub fn is_session_token(segment: &str) -> bool {
    session_grammar().is_match(segment)
}

/// Extract the session identifier and origin from a recording URL
///
/// Query strings, fragments and trailing slashes are ignored, and
/// percent-encoded segments are decoded before matching. When several
/// segments match, the last one wins.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] when the input is not an absolute http(s) URL
/// or no path segment matches the session grammar.
///
/// # Examples
///
/// ```
/// use connect_dl::resolver::resolve;
///
/// let session = resolve("https://connect.example.edu/p1a2b3c4d5e/?launcher=false").unwrap();
/// assert_eq!(session.id.as_str(), "p1a2b3c4d5e");
/// assert_eq!(session.origin, "https://connect.example.edu");
/// ```
pub fn resolve(input: &str) -> Result<ResolvedSession> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: input.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(input.trim()).map_err(|e| invalid(&format!("not a URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }

    let host = url.host_str().ok_or_else(|| invalid("URL has no host"))?;
    let origin = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };

    let segments = url
        .path_segments()
        .ok_or_else(|| invalid("URL has no path"))?;

    let token = segments
        .filter(|s| !s.is_empty())
        .filter_map(|s| urlencoding::decode(s).ok().map(|d| d.trim().to_string()))
        .filter(|s| is_session_token(s))
        .last()
        .ok_or_else(|| invalid("no session identifier in path"))?;

    tracing::debug!(url = %input, session = %token, %origin, "resolved session identifier");

    Ok(ResolvedSession {
        id: SessionId::new_unchecked(normalize_marker(token)),
        origin,
    })
}

// Hosts treat the marker case-insensitively but always emit lowercase
fn normalize_marker(token: String) -> String {
    if token.starts_with(SESSION_MARKER) {
        token
    } else {
        format!("{}{}", SESSION_MARKER, &token[1..])
    }
}
