//! Cross-record merge passes.
//!
//! Parsers stay pure per-row; combining PRICE with REGIONSUM (and the
//! trading/predispatch equivalents) happens here, keyed on the natural key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{
    ConstraintForecast, DispatchBundle, DispatchPriceRow, FcasLevel, FcasPriceRow,
    InterconnectorForecast, P5minRegionForecast, P5minUnitForecast, PredispatchRegionRow,
    PredispatchUnitRow, Region, ScadaRow, StpasaRegionRow, StpasaUnitAvailability,
    TradingPriceRow,
};

use super::RawRecord;

/// Merge a DISPATCHIS walk into the persistable bundle. REGIONSUM supplies
/// demand, generation, interchange, and required FCAS MW; PRICE supplies the
/// energy and FCAS RRPs. FCAS rows are emitted post-merge, one per service
/// with a non-zero price. Constraints are filtered to binding only.
pub fn merge_dispatch(records: Vec<RawRecord>) -> DispatchBundle {
    let mut bundle = DispatchBundle::default();
    let mut sums: BTreeMap<(Region, DateTime<Utc>), crate::models::RegionSummaryRow> =
        BTreeMap::new();
    let mut prices: Vec<super::DispatchPriceRecord> = Vec::new();

    for rec in records {
        match rec {
            RawRecord::DispatchPrice(p) => prices.push(p),
            RawRecord::DispatchRegionSum(s) => {
                sums.insert((s.region, s.settlement_ts), s);
            }
            RawRecord::Interconnector(i) => bundle.interconnectors.push(i),
            RawRecord::Constraint(c) => {
                if c.marginal_value > 0.0 {
                    bundle.constraints.push(c);
                }
            }
            RawRecord::UnitSolution(u) => bundle.units.push(u),
            _ => {}
        }
    }

    // PRICE rows were collected in file order; emit merged rows in region
    // order per interval.
    prices.sort_by_key(|p| (p.settlement_ts, p.region));

    for price in prices {
        let key = (price.region, price.settlement_ts);
        let sum = sums.get(&key);
        if sum.is_none() {
            warn!(
                region = %price.region,
                ts = %price.settlement_ts,
                "PRICE row without matching REGIONSUM"
            );
        }

        let mut fcas = BTreeMap::new();
        for (service, rrp) in &price.fcas_prices {
            let required_mw = sum
                .map(|s| s.fcas_required_mw.get(service).copied().unwrap_or(0.0))
                .unwrap_or(0.0);
            fcas.insert(
                *service,
                FcasLevel {
                    price: *rrp,
                    required_mw,
                },
            );

            if *rrp != 0.0 {
                bundle.fcas.push(FcasPriceRow {
                    region: price.region,
                    service: *service,
                    settlement_ts: price.settlement_ts,
                    price: *rrp,
                    enablement_min: 0.0,
                    // Enablement ceiling mirrors the region's requirement.
                    enablement_max: required_mw,
                });
            }
        }

        bundle.prices.push(DispatchPriceRow {
            region: price.region,
            settlement_ts: price.settlement_ts,
            rrp: price.rrp,
            rop: price.rop,
            apc_flag: price.apc_flag,
            total_demand: sum.map(|s| s.total_demand).unwrap_or(0.0),
            available_generation: sum.map(|s| s.available_generation).unwrap_or(0.0),
            net_interchange: sum.map(|s| s.net_interchange).unwrap_or(0.0),
            fcas,
            price_status: price.price_status,
            last_changed: price.last_changed,
        });
    }

    bundle
}

/// Merge TRADING PRICE and REGIONSUM rows on (region, interval).
pub fn merge_trading(records: Vec<RawRecord>) -> Vec<TradingPriceRow> {
    let mut sums: BTreeMap<(Region, DateTime<Utc>), super::TradingRegionSumRecord> =
        BTreeMap::new();
    let mut prices: Vec<super::TradingPriceRecord> = Vec::new();

    for rec in records {
        match rec {
            RawRecord::TradingPrice(p) => prices.push(p),
            RawRecord::TradingRegionSum(s) => {
                sums.insert((s.region, s.trading_ts), s);
            }
            _ => {}
        }
    }

    prices.sort_by_key(|p| (p.trading_ts, p.region));
    prices
        .into_iter()
        .map(|p| {
            let sum = sums.get(&(p.region, p.trading_ts));
            TradingPriceRow {
                region: p.region,
                trading_ts: p.trading_ts,
                rrp: p.rrp,
                total_demand: sum.map(|s| s.total_demand).unwrap_or(0.0),
                available_generation: sum.map(|s| s.available_generation).unwrap_or(0.0),
                net_interchange: sum.map(|s| s.net_interchange).unwrap_or(0.0),
            }
        })
        .collect()
}

/// Everything a predispatch walk yields, region rows merged.
#[derive(Debug, Default)]
pub struct PredispatchBundle {
    pub regions: Vec<PredispatchRegionRow>,
    pub units: Vec<PredispatchUnitRow>,
    pub interconnectors: Vec<InterconnectorForecast>,
    pub constraints: Vec<ConstraintForecast>,
}

pub fn merge_predispatch(records: Vec<RawRecord>) -> PredispatchBundle {
    let mut bundle = PredispatchBundle::default();
    let mut sums: BTreeMap<
        (Region, DateTime<Utc>, DateTime<Utc>),
        super::PredispatchRegionSumRecord,
    > = BTreeMap::new();
    let mut prices: Vec<super::PredispatchRegionPriceRecord> = Vec::new();

    for rec in records {
        match rec {
            RawRecord::PredispatchRegionPrice(p) => prices.push(p),
            RawRecord::PredispatchRegionSum(s) => {
                sums.insert((s.region, s.run_ts, s.interval_ts), s);
            }
            RawRecord::PredispatchUnit(u) => bundle.units.push(u),
            RawRecord::PredispatchInterconnector(i) => bundle.interconnectors.push(i),
            RawRecord::PredispatchConstraint(c) => bundle.constraints.push(c),
            _ => {}
        }
    }

    prices.sort_by_key(|p| (p.interval_ts, p.region));
    bundle.regions = prices
        .into_iter()
        .map(|p| {
            let sum = sums.get(&(p.region, p.run_ts, p.interval_ts));
            PredispatchRegionRow {
                run_ts: p.run_ts,
                interval_ts: p.interval_ts,
                region: p.region,
                rrp: p.rrp,
                total_demand: sum.map(|s| s.total_demand).unwrap_or(0.0),
                available_generation: sum.map(|s| s.available_generation).unwrap_or(0.0),
                net_interchange: sum.map(|s| s.net_interchange).unwrap_or(0.0),
            }
        })
        .collect();

    bundle
}

pub fn collect_scada(records: Vec<RawRecord>) -> Vec<ScadaRow> {
    records
        .into_iter()
        .filter_map(|r| match r {
            RawRecord::Scada(s) => Some(s),
            _ => None,
        })
        .collect()
}

pub fn collect_p5min(
    records: Vec<RawRecord>,
) -> (Vec<P5minRegionForecast>, Vec<P5minUnitForecast>) {
    let mut regions = Vec::new();
    let mut units = Vec::new();
    for rec in records {
        match rec {
            RawRecord::P5Region(r) => regions.push(r),
            RawRecord::P5Unit(u) => units.push(u),
            _ => {}
        }
    }
    (regions, units)
}

pub fn collect_stpasa(
    records: Vec<RawRecord>,
) -> (Vec<StpasaRegionRow>, Vec<StpasaUnitAvailability>) {
    let mut regions = Vec::new();
    let mut units = Vec::new();
    for rec in records {
        match rec {
            RawRecord::StpasaRegion(r) => regions.push(r),
            RawRecord::StpasaUnit(u) => units.push(u),
            _ => {}
        }
    }
    (regions, units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FcasService;
    use crate::parsers::{
        DispatchPriceRecord, TradingPriceRecord, TradingRegionSumRecord,
    };
    use crate::timemap::parse_market_to_utc;

    fn price_record(region: Region, rrp: f64) -> DispatchPriceRecord {
        let mut fcas_prices = BTreeMap::new();
        fcas_prices.insert(FcasService::Raise6Sec, 0.5);
        fcas_prices.insert(FcasService::Lower6Sec, 0.0);
        DispatchPriceRecord {
            region,
            settlement_ts: parse_market_to_utc("2025/08/23 19:05:00").unwrap(),
            rrp,
            rop: 0.0,
            apc_flag: false,
            fcas_prices,
            price_status: Some("FIRM".to_string()),
            last_changed: None,
        }
    }

    fn regionsum_record(region: Region) -> crate::models::RegionSummaryRow {
        let mut fcas_required_mw = BTreeMap::new();
        fcas_required_mw.insert(FcasService::Raise6Sec, 550.0);
        crate::models::RegionSummaryRow {
            region,
            settlement_ts: parse_market_to_utc("2025/08/23 19:05:00").unwrap(),
            total_demand: 9334.46,
            available_generation: 11004.64,
            net_interchange: -123.45,
            fcas_required_mw,
        }
    }

    #[test]
    fn merges_price_with_regionsum() {
        let records = vec![
            RawRecord::DispatchPrice(price_record(Region::NSW1, 134.85637)),
            RawRecord::DispatchRegionSum(regionsum_record(Region::NSW1)),
        ];
        let bundle = merge_dispatch(records);
        assert_eq!(bundle.prices.len(), 1);
        let row = &bundle.prices[0];
        assert_eq!(row.rrp, 134.85637);
        assert_eq!(row.total_demand, 9334.46);
        assert_eq!(row.available_generation, 11004.64);
        assert_eq!(row.net_interchange, -123.45);
        assert_eq!(row.fcas[&FcasService::Raise6Sec].required_mw, 550.0);
    }

    #[test]
    fn emits_only_nonzero_fcas_prices() {
        let records = vec![
            RawRecord::DispatchPrice(price_record(Region::NSW1, 100.0)),
            RawRecord::DispatchRegionSum(regionsum_record(Region::NSW1)),
        ];
        let bundle = merge_dispatch(records);
        assert_eq!(bundle.fcas.len(), 1);
        assert_eq!(bundle.fcas[0].service, FcasService::Raise6Sec);
        assert_eq!(bundle.fcas[0].price, 0.5);
    }

    #[test]
    fn filters_non_binding_constraints() {
        let ts = parse_market_to_utc("2025/08/23 19:05:00").unwrap();
        let make = |id: &str, mv: f64| {
            RawRecord::Constraint(crate::models::ConstraintRow {
                constraint_id: id.to_string(),
                settlement_ts: ts,
                rhs: 100.0,
                marginal_value: mv,
                violation_degree: 0.0,
            })
        };
        let bundle = merge_dispatch(vec![make("BOUND", 12.5), make("SLACK", 0.0)]);
        assert_eq!(bundle.constraints.len(), 1);
        assert_eq!(bundle.constraints[0].constraint_id, "BOUND");
    }

    #[test]
    fn price_without_regionsum_still_merges_with_zero_sums() {
        let bundle = merge_dispatch(vec![RawRecord::DispatchPrice(price_record(
            Region::TAS1,
            45.0,
        ))]);
        assert_eq!(bundle.prices.len(), 1);
        assert_eq!(bundle.prices[0].total_demand, 0.0);
    }

    #[test]
    fn merged_rows_come_out_in_region_order() {
        let records = vec![
            RawRecord::DispatchPrice(price_record(Region::VIC1, 70.0)),
            RawRecord::DispatchPrice(price_record(Region::NSW1, 80.0)),
            RawRecord::DispatchRegionSum(regionsum_record(Region::NSW1)),
            RawRecord::DispatchRegionSum(regionsum_record(Region::VIC1)),
        ];
        let bundle = merge_dispatch(records);
        assert_eq!(bundle.prices[0].region, Region::NSW1);
        assert_eq!(bundle.prices[1].region, Region::VIC1);
    }

    #[test]
    fn trading_merge_joins_on_region_and_interval() {
        let ts = parse_market_to_utc("2025/08/23 19:30:00").unwrap();
        let records = vec![
            RawRecord::TradingPrice(TradingPriceRecord {
                region: Region::QLD1,
                trading_ts: ts,
                rrp: 66.0,
            }),
            RawRecord::TradingRegionSum(TradingRegionSumRecord {
                region: Region::QLD1,
                trading_ts: ts,
                total_demand: 6100.0,
                available_generation: 8100.0,
                net_interchange: 300.0,
            }),
        ];
        let rows = merge_trading(records);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rrp, 66.0);
        assert_eq!(rows[0].total_demand, 6100.0);
    }
}
