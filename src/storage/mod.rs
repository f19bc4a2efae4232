//! Tiered persistence: relational time-series, raw-object archive, and the
//! hot KV snapshot cache.

pub mod archive_store;
pub mod db;
pub mod kv;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

pub use archive_store::{ArchiveMeta, ArchiveStore};
pub use db::Store;
pub use kv::{KvStore, TTL_DISPATCH_SECS, TTL_FORWARD_SECS, TTL_TRADING_SECS};

use crate::duid;
use crate::models::{FcasPriceRow, PredispatchRegionRow, Region, RegionPrice, ScadaRow};

/// One fuel-mix rollup row: generation summed over a fuel type (or fuel
/// category) for one interval in one region.
#[derive(Debug, Clone)]
pub struct FuelRollupRow {
    pub fuel_type: String,
    pub category: String,
    pub settlement_ts: DateTime<Utc>,
    pub region: String,
    pub total_mw: f64,
    pub unit_count: usize,
}

/// Group positive SCADA readings by registry fuel type, plus one rollup per
/// fuel category. Unregistered units are excluded.
pub fn fuel_rollup(scada: &[ScadaRow]) -> Vec<FuelRollupRow> {
    use std::collections::BTreeMap;

    let mut by_fuel: BTreeMap<(String, i64, String), (String, f64, usize)> = BTreeMap::new();
    let mut by_category: BTreeMap<(String, i64, String), (f64, usize)> = BTreeMap::new();

    for point in scada {
        if point.scada_mw <= 0.0 {
            continue;
        }
        let Some(rec) = duid::lookup(&point.duid) else {
            continue;
        };
        let ts = point.settlement_ts.timestamp();
        let region = rec.region.as_str().to_string();

        let fuel_entry = by_fuel
            .entry((rec.fuel_type.to_string(), ts, region.clone()))
            .or_insert_with(|| (rec.category.as_str().to_string(), 0.0, 0));
        fuel_entry.1 += point.scada_mw;
        fuel_entry.2 += 1;

        let cat_entry = by_category
            .entry((rec.category.as_str().to_string(), ts, region))
            .or_insert((0.0, 0));
        cat_entry.0 += point.scada_mw;
        cat_entry.1 += 1;
    }

    let mut rows: Vec<FuelRollupRow> = by_fuel
        .into_iter()
        .map(|((fuel_type, ts, region), (category, total_mw, unit_count))| FuelRollupRow {
            fuel_type,
            category,
            settlement_ts: chrono::TimeZone::timestamp_opt(&Utc, ts, 0).unwrap(),
            region,
            total_mw,
            unit_count,
        })
        .collect();

    rows.extend(by_category.into_iter().map(
        |((category, ts, region), (total_mw, unit_count))| FuelRollupRow {
            fuel_type: category.clone(),
            category,
            settlement_ts: chrono::TimeZone::timestamp_opt(&Utc, ts, 0).unwrap(),
            region,
            total_mw,
            unit_count,
        },
    ));

    rows
}

// ---- Hot snapshot writers (best-effort, never fail ingestion) ----

pub fn write_price_snapshots(kv: &KvStore, prices: &[RegionPrice]) {
    if prices.is_empty() {
        return;
    }
    let snapshot = json!({
        "prices": prices,
        "updated_at": Utc::now().to_rfc3339(),
    });
    kv.set("prices:latest", snapshot.clone(), TTL_DISPATCH_SECS);
    kv.track_key("prices:*", "prices:latest");

    for price in prices {
        let key = format!("prices:{}", price.region);
        kv.set(&key, json!(price), TTL_DISPATCH_SECS);
        kv.track_key("prices:*", &key);
    }

    kv.set("comprehensive:latest", snapshot, TTL_DISPATCH_SECS);
    kv.track_key("prices:*", "comprehensive:latest");
    debug!(regions = prices.len(), "hot price snapshots written");
}

pub fn write_fcas_snapshot(kv: &KvStore, rows: &[FcasPriceRow]) {
    if rows.is_empty() {
        return;
    }
    kv.set(
        "fcas:latest",
        json!({ "services": rows, "updated_at": Utc::now().to_rfc3339() }),
        TTL_DISPATCH_SECS,
    );
    kv.track_key("fcas:*", "fcas:latest");
}

pub fn write_forward_snapshot(
    kv: &KvStore,
    region: Region,
    date: &str,
    rows: &[PredispatchRegionRow],
) {
    let key = format!("forward:{region}:{date}");
    kv.set(
        &key,
        json!({ "intervals": rows, "updated_at": Utc::now().to_rfc3339() }),
        TTL_FORWARD_SECS,
    );
    kv.track_key("forward:*", &key);
}

pub fn write_demand_forecast_snapshot(
    kv: &KvStore,
    region: Region,
    series: &[(DateTime<Utc>, f64)],
) {
    let key = format!("demand:forecast:{region}");
    let points: Vec<_> = series
        .iter()
        .map(|(ts, mw)| json!({ "interval": ts.to_rfc3339(), "demand_mw": mw }))
        .collect();
    kv.set(
        &key,
        json!({ "series": points, "updated_at": Utc::now().to_rfc3339() }),
        TTL_TRADING_SECS,
    );
    kv.track_key("demand:*", &key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispatchPriceRow, Position, PositionSide, PositionStatus};
    use crate::timemap::parse_market_to_utc;
    use std::collections::BTreeMap;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_market_to_utc(s).unwrap()
    }

    fn scada(duid: &str, mw: f64) -> ScadaRow {
        ScadaRow {
            duid: duid.to_string(),
            settlement_ts: ts("2025/08/23 19:05:00"),
            scada_mw: mw,
        }
    }

    fn price_row(region: Region, rrp: f64) -> DispatchPriceRow {
        DispatchPriceRow {
            region,
            settlement_ts: ts("2025/08/23 19:05:00"),
            rrp,
            rop: 0.0,
            apc_flag: false,
            total_demand: 9334.46,
            available_generation: 11004.64,
            net_interchange: -123.45,
            fcas: BTreeMap::new(),
            price_status: None,
            last_changed: None,
        }
    }

    #[test]
    fn rollup_groups_by_fuel_and_category() {
        let rows = fuel_rollup(&[
            scada("BW01", 600.0),
            scada("BW02", 580.0),
            scada("HPRG1", 50.0),
            scada("HPRL1", -30.0), // consuming, excluded
            scada("UNKNOWN9", 10.0),
        ]);

        let coal = rows
            .iter()
            .find(|r| r.fuel_type == "Black Coal")
            .expect("coal rollup row");
        assert_eq!(coal.total_mw, 1180.0);
        assert_eq!(coal.unit_count, 2);
        assert_eq!(coal.region, "NSW1");

        let battery_cat = rows
            .iter()
            .find(|r| r.fuel_type == "battery")
            .expect("battery category row");
        assert_eq!(battery_cat.total_mw, 50.0);
    }

    #[tokio::test]
    async fn reingesting_the_same_rows_is_idempotent() {
        let store = Store::new_in_memory().unwrap();
        let rows = vec![price_row(Region::NSW1, 134.85637), price_row(Region::VIC1, 60.0)];

        store.upsert_dispatch_prices(&rows).await.unwrap();
        store.upsert_dispatch_prices(&rows).await.unwrap();

        assert_eq!(store.count_rows("dispatch_prices").await.unwrap(), 2);
        let latest = store.latest_dispatch_prices().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].region, Region::NSW1);
        assert_eq!(latest[0].rrp, 134.85637);
    }

    #[tokio::test]
    async fn upsert_overwrites_changed_fields() {
        let store = Store::new_in_memory().unwrap();
        store
            .upsert_dispatch_prices(&[price_row(Region::NSW1, 100.0)])
            .await
            .unwrap();
        store
            .upsert_dispatch_prices(&[price_row(Region::NSW1, 120.0)])
            .await
            .unwrap();
        let latest = store.latest_dispatch_prices().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].rrp, 120.0);
    }

    #[tokio::test]
    async fn position_close_is_single_shot() {
        let store = Store::new_in_memory().unwrap();
        let position = Position {
            id: "pos-1".to_string(),
            user_id: "user-1".to_string(),
            region: Region::NSW1,
            side: PositionSide::Long,
            quantity: 10.0,
            entry_price: 100.0,
            entry_ts: ts("2025/08/23 19:05:00"),
            exit_price: None,
            exit_ts: None,
            pnl: None,
            status: PositionStatus::Open,
        };
        store.insert_position(&position).await.unwrap();

        let changed = store
            .close_position("pos-1", "user-1", 120.0, ts("2025/08/23 20:05:00"), 200.0)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        // Second close finds no OPEN row.
        let changed = store
            .close_position("pos-1", "user-1", 130.0, ts("2025/08/23 21:05:00"), 300.0)
            .await
            .unwrap();
        assert_eq!(changed, 0);

        let stored = store.get_position("pos-1", "user-1").await.unwrap().unwrap();
        assert_eq!(stored.status, PositionStatus::Closed);
        assert_eq!(stored.pnl, Some(200.0));
        assert_eq!(stored.exit_price, Some(120.0));
    }

    #[tokio::test]
    async fn hub_prices_round_trip() {
        let store = Store::new_in_memory().unwrap();
        let prices = vec![RegionPrice {
            region: Region::SA1,
            price: 88.5,
            total_demand: 1500.0,
            available_generation: 1800.0,
            net_interchange: 120.0,
            settlement_ts: ts("2025/08/23 19:05:00"),
        }];
        store.upsert_hub_prices(&prices).await.unwrap();
        let loaded = store.load_hub_prices().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].region, Region::SA1);
        assert_eq!(loaded[0].price, 88.5);
    }
}
