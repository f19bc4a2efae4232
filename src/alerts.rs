//! Chat-webhook alert sink.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::models::ValidationReport;

/// POST a structured card describing a failed validation run.
pub async fn send_validation_alert(
    client: &Client,
    webhook_url: &str,
    report: &ValidationReport,
) -> Result<()> {
    let status = if report.passed { "PASSED" } else { "FAILED" };

    let mut sections = Vec::new();
    if !report.issues.is_empty() {
        sections.push(json!({
            "title": "Issues",
            "items": report.issues,
        }));
    }
    if !report.warnings.is_empty() {
        sections.push(json!({
            "title": "Warnings",
            "items": report.warnings,
        }));
    }

    let card = json!({
        "text": format!("Data validation {status} at {}", report.run_ts.to_rfc3339()),
        "status": status,
        "sections": sections,
        "metrics": report.metrics,
    });

    let resp = client
        .post(webhook_url)
        .json(&card)
        .send()
        .await
        .context("POST validation alert")?;

    let status_code = resp.status();
    if !status_code.is_success() {
        anyhow::bail!("alert webhook returned {status_code}");
    }

    info!(status, issues = report.issues.len(), "validation alert posted");
    Ok(())
}
