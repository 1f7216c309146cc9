//! Manifest construction from a recording's landing page
//!
//! The landing page is scraped for the numeric content id and the account
//! id, which decide where the host keeps the downloadable archive. Candidate
//! paths are listed most likely first.

use crate::types::{AssetEntry, Manifest, SessionId};
use regex::Regex;
use std::sync::OnceLock;

/// Query string that asks the host for the archive instead of the player
const DOWNLOAD_QUERY: &str = "?download=zip";

fn sco_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)"sco-id"\s*:\s*"(\d+)""#,
            r"(?i)sco-id=(\d+)",
            r"(?i)recording-id=(\d+)",
            r"(?i)scoid:(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn account_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"account_id\s*=\s*(\d+)").ok())
        .as_ref()
}

/// Numeric content id embedded in a landing page, if any
pub fn scrape_sco_id(page: &str) -> Option<String> {
    sco_id_patterns()
        .iter()
        .find_map(|re| re.captures(page))
        .map(|caps| caps[1].to_string())
}

/// Account id embedded in a landing page, if any
pub fn scrape_account_id(page: &str) -> Option<String> {
    account_id_pattern()?
        .captures(page)
        .map(|caps| caps[1].to_string())
}

/// Build the ordered, de-duplicated archive candidate list for a session
pub fn build_manifest(
    session: &SessionId,
    sco_id: Option<String>,
    account_id: Option<String>,
) -> Manifest {
    let mut entries: Vec<AssetEntry> = Vec::new();
    let mut push = |dir: String, file: String| {
        let path = format!("/{}/output/{}{}", dir, file, DOWNLOAD_QUERY);
        if !entries.iter().any(|e| e.path == path) {
            entries.push(AssetEntry {
                name: file,
                path,
                size: None,
            });
        }
    };

    let token = session.as_str();
    push(token.to_string(), format!("{}.zip", token));
    push(token.to_string(), "output.zip".to_string());

    if let Some(sco) = &sco_id {
        push(sco.clone(), format!("{}.zip", sco));
        push(sco.clone(), "output.zip".to_string());
        push(format!("p{}", sco), format!("{}.zip", sco));
        push(format!("p{}", sco), "output.zip".to_string());

        if let Some(account) = &account_id {
            let content_dir = format!("content/{}/{}-1", account, sco);
            push(content_dir.clone(), format!("{}-1.zip", sco));
            push(content_dir, "output.zip".to_string());
        }
    }

    Manifest {
        session: session.clone(),
        sco_id,
        account_id,
        entries,
    }
}
