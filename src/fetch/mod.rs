//! HTTP acquisition of recording pages and archives
//!
//! [`HttpFetcher`] wraps one `reqwest::Client` shared by every job of a
//! pipeline. Each request carries the job's cookies and runs under
//! [`with_retry`], so timeouts, resets and 5xx answers are retried while
//! error pages and missing resources fail on the first attempt.
//!
//! `request_timeout` bounds connecting and every wait for the next piece of
//! an archive body, not the whole transfer. The landing page is small and is
//! bounded as a whole.
//!
//! Status handling for archive requests:
//!
//! | Response                          | Result                                  |
//! |-----------------------------------|-----------------------------------------|
//! | 401, 403                          | [`Error::AuthRequired`]                 |
//! | 404, 410                          | [`Error::Fetch`] (not found, next candidate) |
//! | 408, 429, 5xx                     | [`Error::Fetch`] (retried)              |
//! | HTML body or content type         | [`RawAsset::ErrorPage`]                 |
//! | anything else, 2xx                | [`RawAsset::Archive`] streamed to disk  |

mod classify;
mod manifest;

pub use classify::{PayloadClass, SNIFF_LEN, classify, looks_like_html, snippet};
pub use manifest::{build_manifest, scrape_account_id, scrape_sco_id};

use crate::config::{FetchConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{AssetEntry, Credential, Manifest, RawAsset, ResolvedSession};
use crate::utils::ensure_space;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// HTTP client for recording pages and archive downloads
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    retry: RetryConfig,
}

impl HttpFetcher {
    /// Build a fetcher with the configured connect timeout and user agent
    pub fn new(config: &FetchConfig, retry: &RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: Some("fetch".to_string()),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
            retry: retry.clone(),
        })
    }

    fn get(&self, url: &str, credential: Option<&Credential>) -> RequestBuilder {
        let request = self.client.get(url);
        match credential {
            Some(credential) => request.header(COOKIE, credential.header_value()),
            None => request,
        }
    }

    /// Load the recording page and list archive candidates
    ///
    /// The page is scraped for the content and account ids. A page that
    /// cannot be read (other than an auth failure) still yields the
    /// candidates derived from the session token alone.
    ///
    /// # Errors
    ///
    /// [`Error::AuthRequired`] on 401/403.
    pub async fn fetch_manifest(
        &self,
        session: &ResolvedSession,
        credential: Option<&Credential>,
    ) -> Result<Manifest> {
        let url = session.page_url();
        let page = match with_retry(&self.retry, || self.fetch_page(&url, credential)).await {
            Ok(page) => page,
            Err(e @ Error::AuthRequired { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "recording page unreadable, using session token only");
                None
            }
        };

        let (sco_id, account_id) = match page.as_deref() {
            Some(body) => (scrape_sco_id(body), scrape_account_id(body)),
            None => (None, None),
        };

        tracing::debug!(
            session = %session.id,
            sco_id = ?sco_id,
            account_id = ?account_id,
            "recording page scraped"
        );

        Ok(build_manifest(&session.id, sco_id, account_id))
    }

    async fn fetch_page(&self, url: &str, credential: Option<&Credential>) -> Result<Option<String>> {
        let response = self
            .get(url, credential)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let status = response.status();

        if let Some(error) = status_error(url, status) {
            if error.is_not_found() {
                tracing::warn!(url, status = status.as_u16(), "recording page not found");
                return Ok(None);
            }
            return Err(error);
        }

        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "recording page unavailable");
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }

    /// Download one manifest entry to `dest`
    ///
    /// The first bytes are sniffed before anything is written: an HTML
    /// payload is returned as [`RawAsset::ErrorPage`] and `dest` is left
    /// untouched. A partially written file from a failed attempt is
    /// truncated by the next one.
    ///
    /// # Errors
    ///
    /// See the module table. Also [`Error::InsufficientSpace`] when the
    /// advertised size (doubled for extraction) does not fit next to `dest`.
    pub async fn fetch_asset(
        &self,
        session: &ResolvedSession,
        entry: &AssetEntry,
        credential: Option<&Credential>,
        dest: &Path,
    ) -> Result<RawAsset> {
        let url = session.url_for(&entry.path);
        with_retry(&self.retry, || self.download_once(&url, credential, dest)).await
    }

    async fn download_once(
        &self,
        url: &str,
        credential: Option<&Credential>,
        dest: &Path,
    ) -> Result<RawAsset> {
        let timeout = self.config.request_timeout;
        let mut response = within(timeout, url, self.get(url, credential).send()).await?;
        let status = response.status();

        if let Some(error) = status_error(url, status) {
            return Err(error);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();

        let head = sniff(&mut response, url, timeout).await?;

        match classify(content_type.as_deref(), &head) {
            PayloadClass::ErrorPage => {
                let snippet = snippet(&head);
                tracing::warn!(url, status = status.as_u16(), %snippet, "error page instead of archive");
                return Ok(RawAsset::ErrorPage {
                    status: status.as_u16(),
                    snippet,
                });
            }
            PayloadClass::Archive if !status.is_success() => {
                return Err(Error::Fetch {
                    url: url.to_string(),
                    status: Some(status.as_u16()),
                    reason: describe(status),
                });
            }
            PayloadClass::Archive => {}
        }

        if self.config.check_disk_space
            && let Some(length) = content_length
            && let Some(dir) = dest.parent()
        {
            ensure_space(dir, length.saturating_mul(2))?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&head).await?;
        let mut size = head.len() as u64;

        while let Some(chunk) = within(timeout, url, response.chunk()).await? {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        if size == 0 {
            return Err(Error::Fetch {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: "empty response body".to_string(),
            });
        }

        tracing::info!(url, size, path = ?dest, "archive downloaded");

        Ok(RawAsset::Archive {
            path: dest.to_path_buf(),
            size,
        })
    }
}

// Read at least SNIFF_LEN bytes (or the whole body if shorter)
async fn sniff(response: &mut Response, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    while head.len() < SNIFF_LEN {
        match within(timeout, url, response.chunk()).await? {
            Some(chunk) => head.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(head)
}

/// Await one step of a transfer, failing with `TimedOut` if the server stays silent
async fn within<T>(
    timeout: Duration,
    url: &str,
    step: impl Future<Output = reqwest::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, step).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no data from {} for {:?}", url, timeout),
        ))),
    }
}

/// Error for statuses decided without looking at the body
fn status_error(url: &str, status: StatusCode) -> Option<Error> {
    let code = status.as_u16();
    match code {
        401 | 403 => Some(Error::AuthRequired {
            url: url.to_string(),
            status: code,
        }),
        404 | 408 | 410 | 429 | 500..=599 => Some(Error::Fetch {
            url: url.to_string(),
            status: Some(code),
            reason: describe(status),
        }),
        _ => None,
    }
}

fn describe(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}
