//! ST PASA (7-day adequacy outlook) parsers.

use crate::models::{Region, StpasaRegionRow, StpasaUnitAvailability};

use super::{clamp_mw, field, num_field, ts_field, RawRecord};

// D,STPASA,REGIONSOLUTION columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 REGIONID
//   7 DEMAND10  8 DEMAND50  9 DEMAND90
//   10 AGGREGATECAPACITYAVAILABLE  11 SURPLUSCAPACITY
const REG_RUN: usize = 4;
const REG_INTERVAL: usize = 5;
const REG_REGION: usize = 6;
const REG_DEMAND10: usize = 7;
const REG_DEMAND50: usize = 8;
const REG_DEMAND90: usize = 9;
const REG_CAPACITY: usize = 10;
const REG_SURPLUS: usize = 11;

pub fn parse_regionsolution(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, REG_REGION)?)?;

    Some(RawRecord::StpasaRegion(StpasaRegionRow {
        run_ts: ts_field(fields, REG_RUN)?,
        interval_ts: ts_field(fields, REG_INTERVAL)?,
        region,
        demand_10: clamp_mw(num_field(fields, REG_DEMAND10)?, "STPASA demand10"),
        demand_50: clamp_mw(num_field(fields, REG_DEMAND50)?, "STPASA demand50"),
        demand_90: clamp_mw(num_field(fields, REG_DEMAND90)?, "STPASA demand90"),
        aggregate_capacity: clamp_mw(
            num_field(fields, REG_CAPACITY).unwrap_or(0.0),
            "STPASA capacity",
        ),
        surplus_capacity: num_field(fields, REG_SURPLUS).unwrap_or(0.0),
    }))
}

// D,STPASA,UNITAVAILABILITY columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 DUID  7 PASAAVAILABILITY
const UNIT_RUN: usize = 4;
const UNIT_INTERVAL: usize = 5;
const UNIT_DUID: usize = 6;
const UNIT_AVAILABILITY: usize = 7;

pub fn parse_unitavailability(fields: &[&str]) -> Option<RawRecord> {
    let duid = field(fields, UNIT_DUID)?.to_string();
    if duid.is_empty() {
        return None;
    }

    Some(RawRecord::StpasaUnit(StpasaUnitAvailability {
        run_ts: ts_field(fields, UNIT_RUN)?,
        interval_ts: ts_field(fields, UNIT_INTERVAL)?,
        duid,
        pasa_availability: num_field(fields, UNIT_AVAILABILITY)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::split_fields;

    #[test]
    fn parses_region_adequacy_row() {
        let row = "D,STPASA,REGIONSOLUTION,1,\"2025/08/23 01:00:00\",\"2025/08/25 12:00:00\",SA1,1400,1600,1900,3200,1300";
        let Some(RawRecord::StpasaRegion(rec)) = parse_regionsolution(&split_fields(row)) else {
            panic!("expected stpasa region record");
        };
        assert_eq!(rec.region, Region::SA1);
        assert_eq!(rec.demand_10, 1400.0);
        assert_eq!(rec.demand_90, 1900.0);
        assert_eq!(rec.surplus_capacity, 1300.0);
    }

    #[test]
    fn parses_unit_availability_row() {
        let row = "D,STPASA,UNITAVAILABILITY,1,\"2025/08/23 01:00:00\",\"2025/08/25 12:00:00\",TORRB1,200";
        let Some(RawRecord::StpasaUnit(rec)) = parse_unitavailability(&split_fields(row)) else {
            panic!("expected stpasa unit record");
        };
        assert_eq!(rec.duid, "TORRB1");
        assert_eq!(rec.pasa_availability, 200.0);
    }
}
