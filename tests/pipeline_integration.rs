//! End-to-end pipeline tests: raw bundle text through parse, merge, persist,
//! and back out of the query surface.

use nemflow_backend::models::{FcasService, PositionSide, PositionStatus, Region, RegionPrice};
use nemflow_backend::parsers::{merge, ParserRegistry};
use nemflow_backend::storage::{KvStore, Store};
use nemflow_backend::timemap;
use nemflow_backend::trading::{CloseOutcome, TradingLedger};
use nemflow_backend::validator::Validator;

/// Build a DISPATCH PRICE data row with the positional layout the parser
/// documents (RRP at 9, RAISE6SECRRP at 14, LOWER6SECRRP at 26).
fn price_row(region: &str, settlement: &str, rrp: &str, raise6: &str, lower6: &str) -> String {
    let mut cols = vec![String::new(); 62];
    cols[0] = "D".into();
    cols[1] = "DISPATCH".into();
    cols[2] = "PRICE".into();
    cols[3] = "5".into();
    cols[4] = settlement.into();
    cols[5] = "1".into();
    cols[6] = region.into();
    cols[8] = "0".into();
    cols[9] = rrp.into();
    cols[10] = "0".into();
    cols[11] = "0".into();
    cols[14] = raise6.into();
    cols[26] = lower6.into();
    cols.join(",")
}

/// REGIONSUM row: TOTALDEMAND at 9, AVAILABLEGENERATION at 10,
/// NETINTERCHANGE at 15.
fn regionsum_row(region: &str, settlement: &str, demand: &str, gen: &str, inter: &str) -> String {
    let mut cols = vec![String::new(); 47];
    cols[0] = "D".into();
    cols[1] = "DISPATCH".into();
    cols[2] = "REGIONSUM".into();
    cols[3] = "4".into();
    cols[4] = settlement.into();
    cols[6] = region.into();
    cols[9] = demand.into();
    cols[10] = gen.into();
    cols[15] = inter.into();
    cols.join(",")
}

/// INTERCONNECTORRES row: id at 6, METEREDMWFLOW 9, MWFLOW 10, MWLOSSES 11.
fn interconnector_row(id: &str, settlement: &str, flow: &str, losses: &str) -> String {
    let mut cols = vec![String::new(); 18];
    cols[0] = "D".into();
    cols[1] = "DISPATCH".into();
    cols[2] = "INTERCONNECTORRES".into();
    cols[4] = settlement.into();
    cols[6] = id.into();
    cols[9] = flow.into();
    cols[10] = flow.into();
    cols[11] = losses.into();
    cols.join(",")
}

fn dispatch_bundle_csv() -> String {
    let settlement = "\"2025/08/23 19:05:00\"";
    [
        "C,NEMP.WORLD,DISPATCHIS,AEMO".to_string(),
        price_row("NSW1", settlement, "134.85637", "0.5", "0"),
        regionsum_row("NSW1", settlement, "9334.46", "11004.64", "-123.45"),
        interconnector_row("NSW1-QLD1", settlement, "450.23", "5.67"),
        interconnector_row("V-S-MNSP1", settlement, "120.0", "2.2"),
        "C,END OF REPORT".to_string(),
    ]
    .join("\n")
}

#[tokio::test]
async fn dispatch_happy_path_lands_in_query_surface() {
    let registry = ParserRegistry::standard();
    let outcome = registry.parse(&dispatch_bundle_csv());
    assert_eq!(outcome.skipped_rows, 0);

    let bundle = merge::merge_dispatch(outcome.records);
    assert_eq!(bundle.prices.len(), 1);

    let store = Store::new_in_memory().unwrap();
    store.upsert_dispatch_prices(&bundle.prices).await.unwrap();
    store
        .upsert_interconnector_flows(&bundle.interconnectors)
        .await
        .unwrap();

    let latest = store.latest_dispatch_prices().await.unwrap();
    assert_eq!(latest.len(), 1);
    let row = &latest[0];
    assert_eq!(row.region, Region::NSW1);
    assert_eq!(row.rrp, 134.85637);
    assert_eq!(row.total_demand, 9334.46);
    assert_eq!(row.available_generation, 11004.64);
    assert_eq!(row.net_interchange, -123.45);
    assert_eq!(row.settlement_ts.to_rfc3339(), "2025-08-23T09:05:00+00:00");

    // Wire shape: the API row uses demand/generation/settlement_date names.
    let wire = serde_json::to_value(RegionPrice::from_dispatch(row)).unwrap();
    assert_eq!(wire["region"], "NSW1");
    assert_eq!(wire["price"], 134.85637);
    assert_eq!(wire["demand"], 9334.46);
    assert_eq!(wire["generation"], 11004.64);
    assert_eq!(wire["settlement_date"], "2025-08-23T09:05:00Z");
}

#[tokio::test]
async fn price_above_cap_is_clamped_before_persist() {
    let settlement = "\"2025/08/23 19:05:00\"";
    let csv = [
        price_row("NSW1", settlement, "20000", "0", "0"),
        regionsum_row("NSW1", settlement, "9000", "9500", "0"),
    ]
    .join("\n");

    let bundle = merge::merge_dispatch(ParserRegistry::standard().parse(&csv).records);
    assert_eq!(bundle.prices[0].rrp, 16_600.0);

    let store = Store::new_in_memory().unwrap();
    store.upsert_dispatch_prices(&bundle.prices).await.unwrap();
    let latest = store.latest_dispatch_prices().await.unwrap();
    assert!(latest.iter().all(|r| r.rrp <= 16_600.0 && r.rrp >= -1_000.0));
}

#[test]
fn fcas_rows_emitted_only_for_nonzero_prices() {
    let settlement = "\"2025/08/23 19:05:00\"";
    let csv = [
        price_row("NSW1", settlement, "100.0", "0.5", "0"),
        regionsum_row("NSW1", settlement, "9000", "9500", "0"),
    ]
    .join("\n");

    let bundle = merge::merge_dispatch(ParserRegistry::standard().parse(&csv).records);
    assert_eq!(bundle.fcas.len(), 1);
    assert_eq!(bundle.fcas[0].service, FcasService::Raise6Sec);
    assert_eq!(bundle.fcas[0].price, 0.5);
    assert!(bundle.fcas.iter().all(|f| f.price != 0.0));
}

#[tokio::test]
async fn interconnector_endpoints_resolve_from_table_and_split() {
    let bundle = merge::merge_dispatch(
        ParserRegistry::standard().parse(&dispatch_bundle_csv()).records,
    );
    assert_eq!(bundle.interconnectors.len(), 2);

    let nsw_qld = bundle
        .interconnectors
        .iter()
        .find(|i| i.interconnector_id == "NSW1-QLD1")
        .unwrap();
    assert_eq!(nsw_qld.from_region, "NSW1");
    assert_eq!(nsw_qld.to_region, "QLD1");
    assert_eq!(nsw_qld.mw_flow, 450.23);
    assert_eq!(nsw_qld.mw_losses, 5.67);

    let murraylink = bundle
        .interconnectors
        .iter()
        .find(|i| i.interconnector_id == "V-S-MNSP1")
        .unwrap();
    assert_eq!(murraylink.from_region, "VIC1");
    assert_eq!(murraylink.to_region, "SA1");
}

#[tokio::test]
async fn reingesting_a_bundle_twice_changes_nothing() {
    let store = Store::new_in_memory().unwrap();

    for _ in 0..2 {
        let bundle = merge::merge_dispatch(
            ParserRegistry::standard().parse(&dispatch_bundle_csv()).records,
        );
        store.upsert_dispatch_prices(&bundle.prices).await.unwrap();
        store.upsert_fcas_prices(&bundle.fcas).await.unwrap();
        store
            .upsert_interconnector_flows(&bundle.interconnectors)
            .await
            .unwrap();
    }

    assert_eq!(store.count_rows("dispatch_prices").await.unwrap(), 1);
    assert_eq!(store.count_rows("fcas_prices").await.unwrap(), 1);
    assert_eq!(store.count_rows("interconnector_flows").await.unwrap(), 2);

    let latest = store.latest_dispatch_prices().await.unwrap();
    assert_eq!(latest[0].rrp, 134.85637);
}

#[tokio::test]
async fn position_open_close_matches_side_formula() {
    let store = Store::new_in_memory().unwrap();
    let ledger = TradingLedger::new(store);
    let now = timemap::parse_market_to_utc("2025/08/23 19:05:00").unwrap();

    let position = ledger
        .open("user-9", Region::NSW1, PositionSide::Long, 100.0, 10.0, now)
        .await
        .unwrap();
    assert_eq!(position.status, PositionStatus::Open);

    let CloseOutcome::Closed(closed) = ledger
        .close("user-9", &position.id, 120.0, now)
        .await
        .unwrap()
    else {
        panic!("close should succeed");
    };
    assert_eq!(closed.pnl, Some(200.0));
    assert_eq!(closed.status, PositionStatus::Closed);

    // A second close of the same id reports not-found.
    assert!(matches!(
        ledger.close("user-9", &position.id, 150.0, now).await.unwrap(),
        CloseOutcome::NotFound
    ));
}

#[tokio::test]
async fn validator_fails_loudly_on_an_empty_store() {
    let store = Store::new_in_memory().unwrap();
    let kv = KvStore::new();
    let now = timemap::parse_market_to_utc("2025/08/23 19:10:00").unwrap();

    let report = Validator::new(store).run(&kv, now).await.unwrap();
    assert!(!report.passed);
    assert!(report
        .issues
        .iter()
        .any(|i| i.contains("stale") || i.contains("empty") || i.contains("region")));
}

#[test]
fn trading_day_boundary_and_fixed_offset_round_trip() {
    // 03:59 belongs to the previous trading day, 04:00 to the current one.
    let before = timemap::parse_market_to_utc("2025/10/05 03:59:00").unwrap();
    let after = timemap::parse_market_to_utc("2025/10/05 04:00:00").unwrap();
    assert_eq!(
        timemap::format_utc_as_market(timemap::trading_day_start(before)),
        "2025/10/04 04:00:00"
    );
    assert_eq!(
        timemap::format_utc_as_market(timemap::trading_day_start(after)),
        "2025/10/05 04:00:00"
    );

    // The civil DST spring-forward gap (02:30 that morning) must not exist
    // for the fixed-offset parser.
    let gap = timemap::parse_market_to_utc("2025/10/05 02:30:00").unwrap();
    assert_eq!(timemap::format_utc_as_market(gap), "2025/10/05 02:30:00");
}
