//! Directory-listing scanner for the public reporting site.
//!
//! Each report family lives under its own directory of the form
//! `<base>/<family dir>/` serving a plain HTML index of
//! `PUBLIC_<FAMILY>_<YYYYMMDDHHMM>_<SEQ>.zip` links. The index is served by
//! infrastructure that occasionally truncates responses mid-page, so the
//! scan tolerates partial bodies and retries.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use super::ReportFamily;

const DESKTOP_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const TRUNCATION_RETRIES: usize = 3;

pub struct DirectoryScanner {
    client: Client,
    base_url: String,
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]+\.[zZ][iI][pP])""#).unwrap())
}

fn public_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"PUBLIC_[A-Z0-9_]+_\d{12}_[0-9A-Z]+\.zip").unwrap())
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_(\d{12})_").unwrap())
}

impl DirectoryScanner {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch the family's index page and return every candidate archive
    /// filename, deduped and filtered to the family. An index with no
    /// matching files is an empty result, not an error.
    pub async fn scan(&self, family: ReportFamily) -> Result<Vec<String>> {
        let url = format!("{}/{}/", self.base_url.trim_end_matches('/'), family.dir());
        let body = self.fetch_index(&url).await?;
        Ok(extract_filenames(&body, family))
    }

    async fn fetch_index(&self, url: &str) -> Result<String> {
        let mut last_body = String::new();

        for attempt in 1..=TRUNCATION_RETRIES {
            let resp = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, DESKTOP_UA)
                .send()
                .await
                .with_context(|| format!("GET {url} failed"))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("GET {url} {status}: {text}");
            }

            let body = resp.text().await.with_context(|| format!("read {url}"))?;
            if !looks_truncated(&body) {
                return Ok(body);
            }

            warn!(
                url,
                attempt,
                bytes = body.len(),
                "directory index looks truncated, retrying"
            );
            last_body = body;
        }

        // A truncated page still carries usable links at the top; scan what
        // we have rather than dropping the whole tick.
        debug!(url, "using truncated index after retries");
        Ok(last_body)
    }

    /// Latest archive by the embedded `YYYYMMDDHHMM` token.
    pub fn latest(files: &[String], family: ReportFamily) -> Option<String> {
        files
            .iter()
            .filter(|f| f.contains(family.token()))
            .max_by_key(|f| embedded_timestamp(f).unwrap_or(0))
            .cloned()
    }
}

/// Heuristics for a partially delivered index page.
fn looks_truncated(body: &str) -> bool {
    let trimmed = body.trim_end();
    trimmed.len() < 500
        || !trimmed.to_ascii_lowercase().contains("</html>")
        || trimmed.ends_with("...")
        || trimmed.contains("[truncated]")
}

/// Union of three extraction strategies: quoted hrefs, the generic
/// PUBLIC_ filename pattern, and the family's own fallback pattern.
fn extract_filenames(body: &str, family: ReportFamily) -> Vec<String> {
    let mut found: BTreeSet<String> = BTreeSet::new();

    for cap in href_re().captures_iter(body) {
        let href = &cap[1];
        // Links may be absolute paths; keep the filename only.
        if let Some(name) = href.rsplit('/').next() {
            found.insert(name.to_string());
        }
    }

    for m in public_file_re().find_iter(body) {
        found.insert(m.as_str().to_string());
    }

    if let Some(fallback) = family.fallback_pattern() {
        for m in fallback.find_iter(body) {
            found.insert(m.as_str().to_string());
        }
    }

    found
        .into_iter()
        .filter(|name| name.contains(family.token()))
        .collect()
}

/// Pull the 12-digit `YYYYMMDDHHMM` token out of an archive filename.
pub fn embedded_timestamp(filename: &str) -> Option<u64> {
    timestamp_re()
        .captures(filename)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><head><title>Reports</title></head><body>
<pre>
<a href="/Reports/Current/DispatchIS_Reports/PUBLIC_DISPATCHIS_202508231905_0000000471234567.zip">PUBLIC_DISPATCHIS_202508231905_0000000471234567.zip</a>
<a href="/Reports/Current/DispatchIS_Reports/PUBLIC_DISPATCHIS_202508231910_0000000471234601.zip">PUBLIC_DISPATCHIS_202508231910_0000000471234601.zip</a>
<a href="/Reports/Current/DispatchIS_Reports/PUBLIC_DISPATCHIS_202508231900_0000000471234499.zip">PUBLIC_DISPATCHIS_202508231900_0000000471234499.zip</a>
</pre>
</body></html>
"#;

    #[test]
    fn extracts_and_dedupes_filenames() {
        let files = extract_filenames(INDEX, ReportFamily::Dispatch);
        assert_eq!(files.len(), 3);
        assert!(files
            .iter()
            .all(|f| f.starts_with("PUBLIC_DISPATCHIS_") && f.ends_with(".zip")));
    }

    #[test]
    fn filters_other_families_out() {
        let mixed = format!(
            "{INDEX}\n<a href=\"PUBLIC_P5MIN_202508231905_001.zip\">PUBLIC_P5MIN_202508231905_001.zip</a></html>"
        );
        let files = extract_filenames(&mixed, ReportFamily::Dispatch);
        assert!(files.iter().all(|f| f.contains("DISPATCHIS")));
    }

    #[test]
    fn latest_picks_max_embedded_timestamp() {
        let files = extract_filenames(INDEX, ReportFamily::Dispatch);
        let latest = DirectoryScanner::latest(&files, ReportFamily::Dispatch).unwrap();
        assert!(latest.contains("202508231910"));
    }

    #[test]
    fn latest_of_empty_is_none() {
        assert_eq!(DirectoryScanner::latest(&[], ReportFamily::Dispatch), None);
    }

    #[test]
    fn truncation_heuristics() {
        assert!(looks_truncated("tiny"));
        assert!(looks_truncated(&format!("{}...", "x".repeat(600))));
        assert!(looks_truncated(&"<a href=x>".repeat(100)));
        assert!(!looks_truncated(&format!(
            "{}{}</html>",
            "<a href=\"f.zip\">f.zip</a>",
            "x".repeat(600)
        )));
    }

    #[test]
    fn bare_filename_rows_survive_without_hrefs() {
        // Truncated pages often lose the anchor markup; the raw pattern scan
        // must still find the names.
        let body = "junk PUBLIC_DISPATCHIS_202508231905_0000000471234567.zip junk";
        let files = extract_filenames(body, ReportFamily::Dispatch);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn embedded_timestamp_parses() {
        assert_eq!(
            embedded_timestamp("PUBLIC_DISPATCHIS_202508231905_0000000471234567.zip"),
            Some(202508231905)
        );
        assert_eq!(embedded_timestamp("no-token.zip"), None);
    }
}
