//! Process configuration.
//!
//! Everything comes from environment bindings with sane defaults, so the
//! binary runs out of the box against the public reporting site and a local
//! sqlite file.

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the public reporting site, e.g.
    /// `https://nemweb.com.au/Reports/Current`.
    pub report_base_url: String,
    pub database_path: String,
    /// Root directory for the raw-object archive.
    pub archive_root: String,
    pub bind_addr: String,
    /// External authentication collaborator; `POST {url}/verify`.
    pub auth_service_url: String,
    /// Optional chat webhook for validation alerts.
    pub alert_webhook_url: Option<String>,
    /// Deployed front-end origin allowed by CORS (localhost is always allowed).
    pub frontend_origin: String,
    /// Upstream HTTP timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Round-trip efficiency assumed when integrating battery state of charge.
    pub battery_efficiency: f64,
    /// Disable the scheduled ingestion loop (admin /trigger still works).
    pub scheduler_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let report_base_url = std::env::var("REPORT_BASE_URL")
            .unwrap_or_else(|_| "https://nemweb.com.au/Reports/Current".to_string());

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./nemflow.db".to_string());

        let archive_root =
            std::env::var("ARCHIVE_ROOT").unwrap_or_else(|_| "./nemflow-archive".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let auth_service_url = std::env::var("AUTH_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8787".to_string());

        let alert_webhook_url = std::env::var("ALERT_WEBHOOK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let frontend_origin = std::env::var("FRONTEND_ORIGIN")
            .unwrap_or_else(|_| "https://app.nemflow.io".to_string());

        let fetch_timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let battery_efficiency = std::env::var("BATTERY_EFFICIENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &f64| *v > 0.0 && *v <= 1.0)
            .unwrap_or(0.9);

        let scheduler_enabled = std::env::var("SCHEDULER_ENABLED")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(true);

        Ok(Self {
            report_base_url,
            database_path,
            archive_root,
            bind_addr,
            auth_service_url,
            alert_webhook_url,
            frontend_origin,
            fetch_timeout_secs,
            battery_efficiency,
            scheduler_enabled,
        })
    }
}
