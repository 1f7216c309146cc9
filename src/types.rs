//! Core types for connect-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

/// Session identifier taken from a recording URL path segment
///
/// Always non-empty and marker-prefixed (`p` followed by alphanumerics);
/// only [`resolve`](crate::resolver::resolve) constructs it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub(crate) fn new_unchecked(token: String) -> Self {
        Self(token)
    }

    /// The full token, marker included (e.g. `p1a2b3c4d5e`)
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session identifier together with the host that serves it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSession {
    /// Session token
    pub id: SessionId,
    /// `scheme://host[:port]` of the input URL, without trailing slash
    pub origin: String,
}

impl ResolvedSession {
    /// Absolute URL for a server-relative path (leading slash expected)
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// URL of the recording's landing page
    pub fn page_url(&self) -> String {
        self.url_for(&format!("/{}/", self.id))
    }
}

/// Session cookies supplied by the caller for one job
///
/// Sent as a single `Cookie` header on every request of the job. Values are
/// never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    cookies: Vec<(String, String)>,
}

impl Credential {
    /// Parse a `name=value; name2=value2` cookie string
    ///
    /// Fragments without `=` or with an empty name are ignored. Returns `None`
    /// if nothing usable remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let cookies: Vec<(String, String)> = raw
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();

        if cookies.is_empty() {
            None
        } else {
            Some(Self { cookies })
        }
    }

    /// Read a cookie string from a file (surrounding whitespace is ignored)
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read cookie file '{}': {}", path.display(), e),
            ))
        })?;
        Ok(Self::parse(content.trim()))
    }

    /// Interpret caller input as a cookie file path if it exists, else as a cookie string
    pub fn load(input: &str) -> Result<Option<Self>> {
        let path = Path::new(input.trim());
        if !input.contains('=') && path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::parse(input))
        }
    }

    /// Value for the `Cookie` request header
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Cookie names, in input order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|(name, _)| name.as_str())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("cookies", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// One downloadable entry listed in a [`Manifest`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// File name the server will deliver (e.g. `p1a2b3.zip`)
    pub name: String,
    /// Server-relative path including query string
    pub path: String,
    /// Size in bytes when advertised
    pub size: Option<u64>,
}

/// Candidate assets for one session, in the order they should be tried
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Session the manifest belongs to
    pub session: SessionId,
    /// Numeric content id scraped from the recording page
    pub sco_id: Option<String>,
    /// Account id scraped from the recording page
    pub account_id: Option<String>,
    /// Archive candidates, highest priority first
    pub entries: Vec<AssetEntry>,
}

/// Downloaded payload after classification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawAsset {
    /// Binary payload written to disk
    Archive {
        /// Location of the downloaded bytes
        path: PathBuf,
        /// Bytes written
        size: u64,
    },
    /// HTML (login/error) page served where an archive was expected
    ErrorPage {
        /// Status the server declared
        status: u16,
        /// Leading text of the page, for diagnostics
        snippet: String,
    },
}

impl RawAsset {
    /// Downloaded archive location and size, or [`Error::AuthRequired`] for an error page
    pub fn into_archive(self, url: &str) -> Result<(PathBuf, u64)> {
        match self {
            RawAsset::Archive { path, size } => Ok((path, size)),
            RawAsset::ErrorPage { status, .. } => Err(Error::AuthRequired {
                url: url.to_string(),
                status,
            }),
        }
    }
}

/// Elementary stream kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Audio-only stream
    Audio,
    /// Video-only stream
    Video,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Audio => f.write_str("audio"),
            StreamKind::Video => f.write_str("video"),
        }
    }
}

/// An extracted elementary stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFile {
    /// Audio or video
    pub kind: StreamKind,
    /// Segment files in playback order (at least one)
    pub segments: Vec<PathBuf>,
    /// Start delay relative to the session's nominal zero
    pub start_offset: Duration,
}

/// One unit of work: a recording URL plus optional cookies and output name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobSpec {
    /// Recording URL as supplied by the caller
    pub url: String,
    /// Session cookies
    pub credential: Option<Credential>,
    /// Desired output file name (`.mp4` appended if missing)
    pub output_name: Option<String>,
}

impl JobSpec {
    /// Create a job for a URL with no credential and a derived output name
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build a job from a caller row of `(url, cookie?, output name?)`
    ///
    /// Blank cookie strings and names are treated as absent.
    pub fn from_row(url: &str, cookie: Option<&str>, output_name: Option<&str>) -> Self {
        Self {
            url: url.trim().to_string(),
            credential: cookie.and_then(Credential::parse),
            output_name: output_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }

    /// Attach session cookies
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the desired output name
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

/// Outcome of one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// The URL the job was started with
    pub url: String,
    /// Whether a playable output exists at `output_path`
    pub success: bool,
    /// Final output file on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Classification of the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Human-readable failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the job finished
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// Successful outcome
    pub fn succeeded(url: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            url: url.into(),
            success: true,
            output_path: Some(output_path),
            error: None,
            message: None,
            finished_at: Utc::now(),
        }
    }

    /// Failed outcome carrying the error's kind and message
    pub fn failed(url: impl Into<String>, error: &Error) -> Self {
        Self {
            url: url.into(),
            success: false,
            output_path: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }
}

/// Ordered per-job outcomes of a batch, one per input row
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchResult {
    /// Results in input order
    pub results: Vec<JobResult>,
}

impl BatchResult {
    /// Number of jobs
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True for an empty batch
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of successful jobs
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed jobs
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Iterate results in input order
    pub fn iter(&self) -> std::slice::Iter<'_, JobResult> {
        self.results.iter()
    }
}

impl IntoIterator for BatchResult {
    type Item = JobResult;
    type IntoIter = std::vec::IntoIter<JobResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Event emitted while jobs run
///
/// `job` is the zero-based position of the job in its batch (0 for single
/// acquisitions).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job left the queue
    JobStarted {
        /// Job index
        job: usize,
        /// Input URL
        url: String,
    },

    /// Session identifier resolved
    Resolved {
        /// Job index
        job: usize,
        /// Session token
        session: SessionId,
    },

    /// Archive download started for a manifest candidate
    Downloading {
        /// Job index
        job: usize,
        /// Absolute asset URL
        url: String,
    },

    /// Streams extracted from the archive
    Extracted {
        /// Job index
        job: usize,
        /// Audio start offset in milliseconds
        audio_offset_ms: u64,
        /// Video start offset in milliseconds
        video_offset_ms: u64,
    },

    /// Encoding started
    Encoding {
        /// Job index
        job: usize,
        /// Strategy name (e.g. "nvenc", "software")
        encoder: String,
    },

    /// Hardware encode failed; retrying with software
    EncoderFallback {
        /// Job index
        job: usize,
        /// Strategy that failed
        from: String,
        /// Failure description
        error: String,
    },

    /// Job finished with an output file
    JobComplete {
        /// Job index
        job: usize,
        /// Final output path
        path: PathBuf,
    },

    /// Job failed
    JobFailed {
        /// Job index
        job: usize,
        /// Failure classification
        kind: ErrorKind,
        /// Error message
        error: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_parses_cookie_string() {
        let cred = Credential::parse("BREEZESESSION=abc123; other = x=y ;junk; =nameless").unwrap();
        assert_eq!(cred.names().collect::<Vec<_>>(), vec!["BREEZESESSION", "other"]);
        assert_eq!(cred.header_value(), "BREEZESESSION=abc123; other=x=y");
    }

    #[test]
    fn credential_without_pairs_is_none() {
        assert!(Credential::parse("").is_none());
        assert!(Credential::parse("   ;  ; novalue").is_none());
    }

    #[test]
    fn credential_debug_hides_values() {
        let cred = Credential::parse("BREEZESESSION=secret-token").unwrap();
        let debug = format!("{:?}", cred);
        assert!(debug.contains("BREEZESESSION"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn credential_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "BREEZESESSION=fromfile\n").unwrap();

        let cred = Credential::load(path.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(cred.header_value(), "BREEZESESSION=fromfile");

        let inline = Credential::load("BREEZESESSION=inline").unwrap().unwrap();
        assert_eq!(inline.header_value(), "BREEZESESSION=inline");
    }

    #[test]
    fn job_spec_from_row_drops_blanks() {
        let job = JobSpec::from_row(" https://host/p1/ ", Some("  "), Some(""));
        assert_eq!(job.url, "https://host/p1/");
        assert!(job.credential.is_none());
        assert!(job.output_name.is_none());

        let job = JobSpec::from_row("https://host/p1/", Some("a=b"), Some(" Lecture 1 "));
        assert!(job.credential.is_some());
        assert_eq!(job.output_name.as_deref(), Some("Lecture 1"));
    }

    #[test]
    fn job_result_failed_carries_kind() {
        let err = Error::AuthRequired {
            url: "https://host/p1/output/p1.zip".into(),
            status: 200,
        };
        let result = JobResult::failed("https://host/p1/", &err);
        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorKind::AuthRequired));
        assert!(result.output_path.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"], "auth_required");
        assert!(json.get("output_path").is_none());
    }

    #[test]
    fn error_page_becomes_auth_required() {
        let page = RawAsset::ErrorPage {
            status: 200,
            snippet: "<html>".into(),
        };
        match page.into_archive("https://host/p1/output/p1.zip") {
            Err(Error::AuthRequired { status, url }) => {
                assert_eq!(status, 200);
                assert_eq!(url, "https://host/p1/output/p1.zip");
            }
            other => panic!("expected AuthRequired, got {other:?}"),
        }

        let archive = RawAsset::Archive {
            path: PathBuf::from("/tmp/a.zip"),
            size: 42,
        };
        assert_eq!(
            archive.into_archive("u").unwrap(),
            (PathBuf::from("/tmp/a.zip"), 42)
        );
    }

    #[test]
    fn batch_result_counts() {
        let ok = JobResult::succeeded("a", PathBuf::from("/out/a.mp4"));
        let bad = JobResult::failed("b", &Error::Cancelled);
        let batch = BatchResult {
            results: vec![ok, bad.clone(), bad],
        };
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 2);
    }

    #[test]
    fn session_urls() {
        let session = ResolvedSession {
            id: SessionId::new_unchecked("p1a2b3".into()),
            origin: "https://connect.example.edu".into(),
        };
        assert_eq!(session.page_url(), "https://connect.example.edu/p1a2b3/");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Encoding {
            job: 2,
            encoder: "nvenc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "encoding");
        assert_eq!(json["job"], 2);
    }
}
