//! P5MIN (five-minute predispatch) parsers.

use crate::models::{P5minRegionForecast, P5minUnitForecast, Region};

use super::{clamp_mw, clamp_price, field, num_field, ts_field, RawRecord};

// D,P5MIN,REGIONSOLUTION columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 REGIONID  7 RRP
//   12 TOTALDEMAND  13 AVAILABLEGENERATION  14 NETINTERCHANGE
const REG_RUN: usize = 4;
const REG_INTERVAL: usize = 5;
const REG_REGION: usize = 6;
const REG_RRP: usize = 7;
const REG_DEMAND: usize = 12;
const REG_AVAILGEN: usize = 13;
const REG_INTERCHANGE: usize = 14;

pub fn parse_regionsolution(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, REG_REGION)?)?;

    Some(RawRecord::P5Region(P5minRegionForecast {
        run_ts: ts_field(fields, REG_RUN)?,
        interval_ts: ts_field(fields, REG_INTERVAL)?,
        region,
        rrp: clamp_price(num_field(fields, REG_RRP)?, "P5MIN rrp"),
        total_demand: clamp_mw(num_field(fields, REG_DEMAND).unwrap_or(0.0), "P5MIN demand"),
        available_generation: clamp_mw(
            num_field(fields, REG_AVAILGEN).unwrap_or(0.0),
            "P5MIN generation",
        ),
        net_interchange: clamp_mw(
            num_field(fields, REG_INTERCHANGE).unwrap_or(0.0),
            "P5MIN interchange",
        ),
    }))
}

// D,P5MIN,UNITSOLUTION columns:
//   4 RUN_DATETIME  5 INTERVAL_DATETIME  6 DUID  9 ENERGY  10 AVAILABILITY
const UNIT_RUN: usize = 4;
const UNIT_INTERVAL: usize = 5;
const UNIT_DUID: usize = 6;
const UNIT_ENERGY: usize = 9;
const UNIT_AVAILABILITY: usize = 10;

pub fn parse_unitsolution(fields: &[&str]) -> Option<RawRecord> {
    let duid = field(fields, UNIT_DUID)?.to_string();
    if duid.is_empty() {
        return None;
    }

    Some(RawRecord::P5Unit(P5minUnitForecast {
        run_ts: ts_field(fields, UNIT_RUN)?,
        interval_ts: ts_field(fields, UNIT_INTERVAL)?,
        duid,
        energy_mw: clamp_mw(num_field(fields, UNIT_ENERGY)?, "P5MIN unit energy"),
        availability: num_field(fields, UNIT_AVAILABILITY).unwrap_or(0.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::split_fields;

    #[test]
    fn parses_regionsolution() {
        let mut cols = vec![String::new(); 15];
        cols[0] = "D".into();
        cols[1] = "P5MIN".into();
        cols[2] = "REGIONSOLUTION".into();
        cols[4] = "2025/08/23 19:05:00".into();
        cols[5] = "2025/08/23 19:30:00".into();
        cols[6] = "NSW1".into();
        cols[7] = "101.5".into();
        cols[12] = "9400".into();
        let row = cols.join(",");
        let Some(RawRecord::P5Region(rec)) = parse_regionsolution(&split_fields(&row)) else {
            panic!("expected p5 region record");
        };
        assert_eq!(rec.rrp, 101.5);
        assert_eq!(rec.total_demand, 9400.0);
        assert!(rec.interval_ts > rec.run_ts);
    }

    #[test]
    fn malformed_interval_skips_row() {
        let row = "D,P5MIN,REGIONSOLUTION,1,\"2025/08/23 19:05:00\",bogus,NSW1,50";
        assert!(parse_regionsolution(&split_fields(row)).is_none());
    }
}
