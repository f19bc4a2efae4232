//! Property suite over the persisted state.
//!
//! Five check families: freshness, completeness, consistency, forecast
//! horizon, and cache health. Hard failures land in `issues`, soft ones in
//! `warnings`; a report row is appended to a 7-day rolling log. Validation
//! never aborts ingestion.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::models::ValidationReport;
use crate::storage::{KvStore, Store};

const FRESH_DISPATCH_MINUTES: i64 = 10;
const FRESH_TRADING_MINUTES: i64 = 35;

const EXPECTED_REGIONS: i64 = 5;
const MIN_SCADA_UNITS: i64 = 400;
// Nine FCAS services with routinely non-zero prices; the tenth (LOWER1SEC)
// clears at zero most intervals and is not required.
const EXPECTED_FCAS_SERVICES: i64 = 9;
const MIN_BATTERY_UNITS: i64 = 30;

const BALANCE_TOLERANCE: f64 = 0.05;

const MIN_P5MIN_FUTURE_INTERVALS: i64 = 12;
const MIN_PREDISPATCH_FUTURE_INTERVALS: i64 = 96;
const MIN_STPASA_FUTURE_INTERVALS: i64 = 336;

const LOG_RETENTION_DAYS: i64 = 7;

const CACHE_PROBE_KEYS: [&str; 7] = [
    "prices:latest",
    "prices:NSW1",
    "prices:VIC1",
    "prices:QLD1",
    "prices:SA1",
    "prices:TAS1",
    "fcas:latest",
];

pub struct Validator {
    store: Store,
}

impl Validator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run all five families and append the report to the rolling log.
    pub async fn run(&self, kv: &KvStore, now: DateTime<Utc>) -> Result<ValidationReport> {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut metrics: BTreeMap<String, serde_json::Value> = BTreeMap::new();

        self.check_freshness(now, &mut issues, &mut metrics).await?;
        self.check_completeness(now, &mut issues, &mut warnings, &mut metrics)
            .await?;
        self.check_consistency(now, &mut issues, &mut warnings, &mut metrics)
            .await?;
        self.check_forecast_horizon(now, &mut issues, &mut metrics)
            .await?;
        check_cache_health(kv, &mut metrics);

        let report = ValidationReport {
            passed: issues.is_empty(),
            issues,
            warnings,
            metrics,
            run_ts: now,
        };

        self.store.insert_validation_report(&report).await?;
        let pruned = self
            .store
            .prune_validation_log(now - Duration::days(LOG_RETENTION_DAYS))
            .await?;
        if pruned > 0 {
            info!(pruned, "validation log pruned");
        }

        if report.passed {
            info!(warnings = report.warnings.len(), "validation passed");
        } else {
            warn!(issues = report.issues.len(), "validation FAILED");
        }

        Ok(report)
    }

    async fn check_freshness(
        &self,
        now: DateTime<Utc>,
        issues: &mut Vec<String>,
        metrics: &mut BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        let checks = [
            ("dispatch_prices", "settlement_ts", FRESH_DISPATCH_MINUTES),
            ("generator_scada", "settlement_ts", FRESH_DISPATCH_MINUTES),
            ("trading_prices", "trading_ts", FRESH_TRADING_MINUTES),
        ];

        for (table, ts_column, max_age) in checks {
            match self.store.max_ts(table, ts_column).await? {
                Some(latest) => {
                    let age = crate::timemap::interval_age_minutes(now, latest);
                    metrics.insert(format!("{table}_age_minutes"), json!(age));
                    if age >= max_age {
                        issues.push(format!(
                            "{table} is stale: latest interval {} is {age} minutes old (max {max_age})",
                            latest.to_rfc3339()
                        ));
                    }
                }
                None => {
                    metrics.insert(format!("{table}_age_minutes"), json!(null));
                    issues.push(format!("{table} is empty; no data ingested yet"));
                }
            }
        }

        Ok(())
    }

    async fn check_completeness(
        &self,
        now: DateTime<Utc>,
        issues: &mut Vec<String>,
        warnings: &mut Vec<String>,
        metrics: &mut BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        let since = now - Duration::minutes(10);

        let regions = self
            .store
            .distinct_count_since("dispatch_prices", "region", "settlement_ts", since)
            .await?;
        metrics.insert("region_count".to_string(), json!(regions));
        if regions != EXPECTED_REGIONS {
            issues.push(format!(
                "expected {EXPECTED_REGIONS} regions in the last 10 minutes, saw {regions}"
            ));
        }

        let scada_units = self
            .store
            .distinct_count_since("generator_scada", "duid", "settlement_ts", since)
            .await?;
        metrics.insert("scada_unit_count".to_string(), json!(scada_units));
        if scada_units < MIN_SCADA_UNITS {
            warnings.push(format!(
                "only {scada_units} SCADA units in the last 10 minutes (expect >= {MIN_SCADA_UNITS})"
            ));
        }

        let services = self
            .store
            .distinct_count_since("fcas_prices", "service", "settlement_ts", since)
            .await?;
        metrics.insert("fcas_service_count".to_string(), json!(services));
        if services != EXPECTED_FCAS_SERVICES {
            issues.push(format!(
                "expected {EXPECTED_FCAS_SERVICES} FCAS services in the last 10 minutes, saw {services}"
            ));
        }

        let batteries = self
            .store
            .distinct_count_since("battery_dispatch", "duid", "settlement_ts", since)
            .await?;
        metrics.insert("battery_unit_count".to_string(), json!(batteries));
        if batteries < MIN_BATTERY_UNITS {
            warnings.push(format!(
                "only {batteries} battery units in the last 10 minutes (expect >= {MIN_BATTERY_UNITS})"
            ));
        }

        Ok(())
    }

    async fn check_consistency(
        &self,
        now: DateTime<Utc>,
        issues: &mut Vec<String>,
        warnings: &mut Vec<String>,
        metrics: &mut BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        if let Some((generation, demand)) = self.store.latest_balance().await? {
            if demand.abs() > f64::EPSILON {
                let imbalance = (generation - demand).abs() / demand;
                metrics.insert("supply_demand_imbalance".to_string(), json!(imbalance));
                if imbalance > BALANCE_TOLERANCE {
                    warnings.push(format!(
                        "supply/demand imbalance {:.1}% exceeds {:.0}% at the latest interval",
                        imbalance * 100.0,
                        BALANCE_TOLERANCE * 100.0
                    ));
                }
            }
        }

        let hour_ago = now - Duration::hours(1);
        let price_violations = self.store.price_range_violations_since(hour_ago).await?;
        metrics.insert("price_range_violations".to_string(), json!(price_violations));
        if price_violations > 0 {
            issues.push(format!(
                "{price_violations} dispatch prices outside [-1000, 16600] in the last hour"
            ));
        }

        let soc_violations = self.store.soc_range_violations_since(hour_ago).await?;
        metrics.insert("soc_range_violations".to_string(), json!(soc_violations));
        if soc_violations > 0 {
            issues.push(format!(
                "{soc_violations} battery SoC readings outside [0, 100] in the last hour"
            ));
        }

        Ok(())
    }

    async fn check_forecast_horizon(
        &self,
        now: DateTime<Utc>,
        issues: &mut Vec<String>,
        metrics: &mut BTreeMap<String, serde_json::Value>,
    ) -> Result<()> {
        let checks = [
            ("p5min_forecasts", MIN_P5MIN_FUTURE_INTERVALS),
            ("predispatch_forecasts", MIN_PREDISPATCH_FUTURE_INTERVALS),
            ("stpasa_forecasts", MIN_STPASA_FUTURE_INTERVALS),
        ];

        for (table, minimum) in checks {
            let count = self.store.future_interval_count(table, now).await?;
            metrics.insert(format!("{table}_future_intervals"), json!(count));
            if count < minimum {
                issues.push(format!(
                    "{table} holds {count} future intervals (expect >= {minimum})"
                ));
            }
        }

        Ok(())
    }
}

/// Probe the stable snapshot keys and record a synthetic hit rate.
fn check_cache_health(kv: &KvStore, metrics: &mut BTreeMap<String, serde_json::Value>) {
    let hits = CACHE_PROBE_KEYS
        .iter()
        .filter(|key| kv.get(key).is_some())
        .count();
    let hit_rate = hits as f64 / CACHE_PROBE_KEYS.len() as f64;
    metrics.insert("cache_probe_hits".to_string(), json!(hits));
    metrics.insert("cache_hit_rate".to_string(), json!(hit_rate));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispatchPriceRow, Region};
    use crate::timemap::parse_market_to_utc;

    fn price_row(region: Region, ts: DateTime<Utc>) -> DispatchPriceRow {
        DispatchPriceRow {
            region,
            settlement_ts: ts,
            rrp: 100.0,
            rop: 0.0,
            apc_flag: false,
            total_demand: 9000.0,
            available_generation: 9100.0,
            net_interchange: 0.0,
            fcas: Default::default(),
            price_status: None,
            last_changed: None,
        }
    }

    #[tokio::test]
    async fn empty_store_fails_with_staleness_issues() {
        let store = Store::new_in_memory().unwrap();
        let kv = KvStore::new();
        let validator = Validator::new(store);

        let now = parse_market_to_utc("2025/08/23 19:10:00").unwrap();
        let report = validator.run(&kv, now).await.unwrap();

        assert!(!report.passed);
        assert!(report
            .issues
            .iter()
            .any(|i| i.contains("empty") || i.contains("stale")));
    }

    #[tokio::test]
    async fn fresh_balanced_data_clears_freshness_and_consistency() {
        let store = Store::new_in_memory().unwrap();
        let kv = KvStore::new();
        let now = parse_market_to_utc("2025/08/23 19:10:00").unwrap();
        let interval = parse_market_to_utc("2025/08/23 19:05:00").unwrap();

        let rows: Vec<_> = Region::ALL
            .into_iter()
            .map(|r| price_row(r, interval))
            .collect();
        store.upsert_dispatch_prices(&rows).await.unwrap();

        let validator = Validator::new(store);
        let report = validator.run(&kv, now).await.unwrap();

        // Dispatch freshness and region count pass; other families still fail.
        assert!(!report
            .issues
            .iter()
            .any(|i| i.starts_with("dispatch_prices")));
        assert!(!report.issues.iter().any(|i| i.contains("regions")));
        assert_eq!(report.metrics["region_count"], json!(5));
        assert_eq!(report.metrics["dispatch_prices_age_minutes"], json!(5));
    }

    #[tokio::test]
    async fn imbalance_is_a_warning_not_an_issue() {
        let store = Store::new_in_memory().unwrap();
        let kv = KvStore::new();
        let now = parse_market_to_utc("2025/08/23 19:10:00").unwrap();
        let interval = parse_market_to_utc("2025/08/23 19:05:00").unwrap();

        let mut row = price_row(Region::NSW1, interval);
        row.available_generation = 12_000.0; // >5% over demand
        store.upsert_dispatch_prices(&[row]).await.unwrap();

        let report = Validator::new(store).run(&kv, now).await.unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("imbalance")));
        assert!(!report.issues.iter().any(|i| i.contains("imbalance")));
    }

    #[tokio::test]
    async fn cache_probe_reports_hit_rate() {
        let store = Store::new_in_memory().unwrap();
        let kv = KvStore::new();
        kv.set("prices:latest", json!(1), 60);
        kv.set("fcas:latest", json!(1), 60);

        let now = parse_market_to_utc("2025/08/23 19:10:00").unwrap();
        let report = Validator::new(store).run(&kv, now).await.unwrap();
        assert_eq!(report.metrics["cache_probe_hits"], json!(2));
    }

    #[tokio::test]
    async fn report_rows_are_pruned_after_seven_days() {
        let store = Store::new_in_memory().unwrap();
        let kv = KvStore::new();
        let validator = Validator::new(store.clone());

        let old = parse_market_to_utc("2025/08/10 19:10:00").unwrap();
        validator.run(&kv, old).await.unwrap();
        assert_eq!(store.count_rows("validation_log").await.unwrap(), 1);

        let now = parse_market_to_utc("2025/08/23 19:10:00").unwrap();
        validator.run(&kv, now).await.unwrap();
        assert_eq!(store.count_rows("validation_log").await.unwrap(), 1);
    }
}
