//! Archive download and extraction.
//!
//! Every report is a small ZIP holding exactly one delimited text file. The
//! fetch path retries transient failures with exponential backoff; 4xx means
//! the file list was stale and is not retried.

use std::io::{Cursor, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::ReportFamily;

const FETCH_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 8_000;

/// GET the archive bytes with retry/backoff on network errors and 5xx.
pub async fn fetch(client: &Client, url: &str) -> Result<Vec<u8>> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..FETCH_ATTEMPTS {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
            tokio::time::sleep(delay).await;
        }

        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let bytes = resp
                        .bytes()
                        .await
                        .with_context(|| format!("read body of {url}"))?;
                    return Ok(bytes.to_vec());
                }
                if status.is_client_error() {
                    anyhow::bail!("GET {url} {status}: not retryable");
                }
                warn!(url, %status, attempt, "server error fetching archive");
                last_err = Some(anyhow::anyhow!("GET {url} {status}"));
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "transport error fetching archive");
                last_err = Some(anyhow::Error::new(e).context(format!("GET {url}")));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("GET {url}: no attempts made")))
}

/// Exponential backoff: 1s, 2s, 4s... capped at 8s.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_DELAY_MS.saturating_mul(1u64 << (attempt - 1));
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Open the ZIP and decode its tabular member as UTF-8.
///
/// Member selection: first entry whose name contains the family token
/// (case-insensitive), else the first `.csv` entry. No tabular member is a
/// bundle-level failure.
pub fn extract_csv(bytes: &[u8], family: ReportFamily) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("open downloaded archive")?;

    let token = family.token().to_ascii_uppercase();
    let mut csv_index: Option<usize> = None;
    let mut family_index: Option<usize> = None;

    for i in 0..archive.len() {
        let name = archive
            .by_index(i)
            .with_context(|| format!("read archive member {i}"))?
            .name()
            .to_string();
        let upper = name.to_ascii_uppercase();
        if family_index.is_none() && upper.contains(&token) {
            family_index = Some(i);
        }
        if csv_index.is_none() && upper.ends_with(".CSV") {
            csv_index = Some(i);
        }
    }

    let index = family_index
        .or(csv_index)
        .context("archive has no tabular member")?;

    let mut member = archive.by_index(index)?;
    let mut raw = Vec::with_capacity(member.size() as usize);
    member
        .read_to_end(&mut raw)
        .context("decompress archive member")?;

    String::from_utf8(raw).context("archive member is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for (name, content) in entries {
                writer
                    .start_file(*name, FileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn prefers_family_named_member() {
        let bytes = make_zip(&[
            ("README.CSV", "wrong"),
            ("PUBLIC_DISPATCHIS_202508231905.CSV", "C,NEMP,right"),
        ]);
        let csv = extract_csv(&bytes, ReportFamily::Dispatch).unwrap();
        assert_eq!(csv, "C,NEMP,right");
    }

    #[test]
    fn falls_back_to_first_csv_member() {
        let bytes = make_zip(&[("data.csv", "C,NEMP,fallback")]);
        let csv = extract_csv(&bytes, ReportFamily::Dispatch).unwrap();
        assert_eq!(csv, "C,NEMP,fallback");
    }

    #[test]
    fn no_tabular_member_is_an_error() {
        let bytes = make_zip(&[("notes.txt", "hello")]);
        assert!(extract_csv(&bytes, ReportFamily::Dispatch).is_err());
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(extract_csv(b"definitely not a zip", ReportFamily::Dispatch).is_err());
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(5), Duration::from_millis(8_000));
    }
}
