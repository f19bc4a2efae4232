//! Raw-object archive.
//!
//! Downloaded bundles are written verbatim before parsing, so the evidence
//! survives a parse failure. Five-minute families land under
//! `raw/YYYY-MM-DD/<family>/<filename>`; long-horizon forecasts under
//! `archive/<family>/YYYY-MM-DD/<filename>`. A JSON metadata sidecar mirrors
//! each object under `meta/`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use object_store::{local::LocalFileSystem, path::Path as ObjectPath, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::scrapers::ReportFamily;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMeta {
    pub source: String,
    pub family: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
}

pub struct ArchiveStore {
    store: Arc<dyn ObjectStore>,
}

impl ArchiveStore {
    pub fn new_local(root: &str) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create archive root {root}"))?;
        let store = LocalFileSystem::new_with_prefix(root)
            .with_context(|| format!("open archive root {root}"))?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
        }
    }

    /// Archive key for a family's bundle downloaded on `date`.
    pub fn key_for(family: ReportFamily, date: DateTime<Utc>, filename: &str) -> String {
        let day = date.format("%Y-%m-%d");
        match family {
            // Long-horizon forecasts are organised family-first for replay.
            ReportFamily::Predispatch | ReportFamily::Stpasa => {
                format!("archive/{}/{}/{}", family.slug(), day, filename)
            }
            _ => format!("raw/{}/{}/{}", day, family.slug(), filename),
        }
    }

    pub async fn put_raw(
        &self,
        family: ReportFamily,
        date: DateTime<Utc>,
        filename: &str,
        bytes: Vec<u8>,
        meta: &ArchiveMeta,
    ) -> Result<String> {
        let key = Self::key_for(family, date, filename);
        self.store
            .put(&ObjectPath::from(key.as_str()), bytes.into())
            .await
            .with_context(|| format!("archive write {key}"))?;

        let meta_key = format!("meta/{key}.json");
        let meta_bytes = serde_json::to_vec(meta).context("serialize archive metadata")?;
        self.store
            .put(&ObjectPath::from(meta_key.as_str()), meta_bytes.into())
            .await
            .with_context(|| format!("archive metadata write {meta_key}"))?;

        Ok(key)
    }

    pub async fn get_raw(&self, key: &str) -> Result<Vec<u8>> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .with_context(|| format!("archive read {key}"))?;
        let bytes = result.bytes().await.context("archive read body")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        crate::timemap::parse_market_to_utc(s).unwrap()
    }

    #[test]
    fn key_layout_per_family() {
        let date = ts("2025/08/23 19:05:00");
        assert_eq!(
            ArchiveStore::key_for(ReportFamily::Dispatch, date, "PUBLIC_DISPATCHIS_x.zip"),
            "raw/2025-08-23/dispatch/PUBLIC_DISPATCHIS_x.zip"
        );
        assert_eq!(
            ArchiveStore::key_for(ReportFamily::Stpasa, date, "PUBLIC_STPASA_x.zip"),
            "archive/stpasa/2025-08-23/PUBLIC_STPASA_x.zip"
        );
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = ArchiveStore::new_in_memory();
        let date = ts("2025/08/23 19:05:00");
        let meta = ArchiveMeta {
            source: "nemweb".to_string(),
            family: "dispatch".to_string(),
            timestamp: date,
            record_count: Some(5),
        };
        let key = store
            .put_raw(ReportFamily::Dispatch, date, "bundle.zip", b"zipbytes".to_vec(), &meta)
            .await
            .unwrap();
        let bytes = store.get_raw(&key).await.unwrap();
        assert_eq!(bytes, b"zipbytes");

        let meta_bytes = store.get_raw(&format!("meta/{key}.json")).await.unwrap();
        let parsed: ArchiveMeta = serde_json::from_slice(&meta_bytes).unwrap();
        assert_eq!(parsed.record_count, Some(5));
    }
}
