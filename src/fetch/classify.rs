//! Payload classification: archive bytes vs. HTML error pages
//!
//! Recording hosts answer an unauthenticated archive request with HTTP 200
//! and their login page. Trusting the status code would hand that HTML to
//! the ZIP parser, so every archive response is sniffed first.

/// Bytes inspected before a response is classified
pub const SNIFF_LEN: usize = 512;

/// Maximum characters kept from an error page for diagnostics
const SNIPPET_CHARS: usize = 160;

const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

const HTML_MARKERS: [&str; 8] = [
    "<!doctype",
    "<html",
    "<head",
    "<body",
    "<meta",
    "<title",
    "<script",
    "<!--",
];

/// Classification of a payload that was expected to be an archive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadClass {
    /// Binary payload; handed to the extractor
    Archive,
    /// Login or error page
    ErrorPage,
}

/// Classify a response from its declared content type and leading bytes
///
/// ZIP magic always wins. Otherwise HTML markers at the start of the body,
/// or an HTML content type, mean [`PayloadClass::ErrorPage`]. Anything else is
/// treated as an archive and left to the extractor to validate.
pub fn classify(content_type: Option<&str>, head: &[u8]) -> PayloadClass {
    if ZIP_MAGICS.iter().any(|magic| head.starts_with(magic)) {
        return PayloadClass::Archive;
    }

    if looks_like_html(head) || content_type.is_some_and(is_html_content_type) {
        return PayloadClass::ErrorPage;
    }

    PayloadClass::Archive
}

fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

/// Whether a body starts like an HTML document
pub fn looks_like_html(head: &[u8]) -> bool {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let window = &head[start..head.len().min(start + SNIFF_LEN)];
    let text = String::from_utf8_lossy(window).to_ascii_lowercase();

    if text.starts_with("<?xml") {
        return text.contains("<html") || text.contains("xhtml");
    }

    HTML_MARKERS.iter().any(|marker| text.starts_with(marker))
}

/// Short, single-line excerpt of an error page for logs and error messages
pub fn snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}
