//! PREDISPATCH (30-minute, 2-day horizon) parsers.
//!
//! The schema mirrors dispatch at 30-minute cadence: REGION_PRICES and
//! REGIONSUM merge on (run, interval, region) in the post-pass.

use crate::models::{
    ConstraintForecast, InterconnectorForecast, PredispatchUnitRow, Region,
};

use super::{
    clamp_mw, clamp_price, field, num_field, ts_field, PredispatchRegionPriceRecord,
    PredispatchRegionSumRecord, RawRecord,
};

// D,PREDISPATCH,REGION_PRICES columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 REGIONID  7 RRP
const PRICE_RUN: usize = 4;
const PRICE_INTERVAL: usize = 5;
const PRICE_REGION: usize = 6;
const PRICE_RRP: usize = 7;

pub fn parse_region_prices(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, PRICE_REGION)?)?;

    Some(RawRecord::PredispatchRegionPrice(
        PredispatchRegionPriceRecord {
            run_ts: ts_field(fields, PRICE_RUN)?,
            interval_ts: ts_field(fields, PRICE_INTERVAL)?,
            region,
            rrp: clamp_price(num_field(fields, PRICE_RRP)?, "PREDISPATCH rrp"),
        },
    ))
}

// D,PREDISPATCH,REGIONSUM columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 REGIONID
//   7 TOTALDEMAND  8 AVAILABLEGENERATION  9 NETINTERCHANGE
const RSUM_RUN: usize = 4;
const RSUM_INTERVAL: usize = 5;
const RSUM_REGION: usize = 6;
const RSUM_DEMAND: usize = 7;
const RSUM_AVAILGEN: usize = 8;
const RSUM_INTERCHANGE: usize = 9;

pub fn parse_regionsum(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, RSUM_REGION)?)?;

    Some(RawRecord::PredispatchRegionSum(PredispatchRegionSumRecord {
        run_ts: ts_field(fields, RSUM_RUN)?,
        interval_ts: ts_field(fields, RSUM_INTERVAL)?,
        region,
        total_demand: clamp_mw(num_field(fields, RSUM_DEMAND)?, "PREDISPATCH demand"),
        available_generation: clamp_mw(
            num_field(fields, RSUM_AVAILGEN)?,
            "PREDISPATCH generation",
        ),
        net_interchange: clamp_mw(
            num_field(fields, RSUM_INTERCHANGE).unwrap_or(0.0),
            "PREDISPATCH interchange",
        ),
    }))
}

// D,PREDISPATCH,UNIT_SOLUTION columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 DUID  7 ENERGY  8 AVAILABILITY
const UNIT_RUN: usize = 4;
const UNIT_INTERVAL: usize = 5;
const UNIT_DUID: usize = 6;
const UNIT_ENERGY: usize = 7;
const UNIT_AVAILABILITY: usize = 8;

pub fn parse_unit_solution(fields: &[&str]) -> Option<RawRecord> {
    let duid = field(fields, UNIT_DUID)?.to_string();
    if duid.is_empty() {
        return None;
    }

    Some(RawRecord::PredispatchUnit(PredispatchUnitRow {
        run_ts: ts_field(fields, UNIT_RUN)?,
        interval_ts: ts_field(fields, UNIT_INTERVAL)?,
        duid,
        energy_mw: clamp_mw(num_field(fields, UNIT_ENERGY)?, "PREDISPATCH unit energy"),
        availability: num_field(fields, UNIT_AVAILABILITY).unwrap_or(0.0),
    }))
}

// D,PREDISPATCH,INTERCONNECTORRES columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 INTERCONNECTORID
//   7 MWFLOW  8 EXPORTLIMIT  9 IMPORTLIMIT
const ICON_RUN: usize = 4;
const ICON_INTERVAL: usize = 5;
const ICON_ID: usize = 6;
const ICON_FLOW: usize = 7;
const ICON_EXPORT: usize = 8;
const ICON_IMPORT: usize = 9;

pub fn parse_interconnector(fields: &[&str]) -> Option<RawRecord> {
    let id = field(fields, ICON_ID)?.to_string();
    if id.is_empty() {
        return None;
    }

    Some(RawRecord::PredispatchInterconnector(InterconnectorForecast {
        run_ts: ts_field(fields, ICON_RUN)?,
        interval_ts: ts_field(fields, ICON_INTERVAL)?,
        interconnector_id: id,
        mw_flow: num_field(fields, ICON_FLOW)?,
        export_limit: num_field(fields, ICON_EXPORT).unwrap_or(0.0),
        import_limit: num_field(fields, ICON_IMPORT).unwrap_or(0.0),
    }))
}

// D,PREDISPATCH,CONSTRAINT columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 CONSTRAINTID  7 RHS  8 MARGINALVALUE
const CON_RUN: usize = 4;
const CON_INTERVAL: usize = 5;
const CON_ID: usize = 6;
const CON_RHS: usize = 7;
const CON_MARGINAL: usize = 8;

pub fn parse_constraint(fields: &[&str]) -> Option<RawRecord> {
    let id = field(fields, CON_ID)?.to_string();
    if id.is_empty() {
        return None;
    }

    Some(RawRecord::PredispatchConstraint(ConstraintForecast {
        run_ts: ts_field(fields, CON_RUN)?,
        interval_ts: ts_field(fields, CON_INTERVAL)?,
        constraint_id: id,
        rhs: num_field(fields, CON_RHS)?,
        marginal_value: num_field(fields, CON_MARGINAL)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::split_fields;

    #[test]
    fn parses_region_price_row() {
        let row = "D,PREDISPATCH,REGION_PRICES,1,\"2025/08/23 19:00:00\",\"2025/08/24 08:30:00\",VIC1,75.2";
        let Some(RawRecord::PredispatchRegionPrice(rec)) =
            parse_region_prices(&split_fields(row))
        else {
            panic!("expected predispatch price record");
        };
        assert_eq!(rec.region, Region::VIC1);
        assert_eq!(rec.rrp, 75.2);
    }

    #[test]
    fn parses_unit_solution_row() {
        let row = "D,PREDISPATCH,UNIT_SOLUTION,1,\"2025/08/23 19:00:00\",\"2025/08/24 08:30:00\",ER01,680,720";
        let Some(RawRecord::PredispatchUnit(rec)) = parse_unit_solution(&split_fields(row))
        else {
            panic!("expected predispatch unit record");
        };
        assert_eq!(rec.duid, "ER01");
        assert_eq!(rec.energy_mw, 680.0);
        assert_eq!(rec.availability, 720.0);
    }
}
