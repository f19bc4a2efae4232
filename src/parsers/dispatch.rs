//! DISPATCHIS record parsers.
//!
//! Fixed-position mode: the column indexes below follow the MMS data model
//! row layouts and will silently read the wrong field if the upstream ever
//! reorders them, which is why each parser documents its positions next to
//! the code that uses them.

use std::collections::BTreeMap;

use crate::models::{
    ConstraintRow, FcasService, GeneratorDispatchRow, InterconnectorFlowRow, Region,
    RegionSummaryRow,
};

use super::{
    clamp_mw, clamp_price, field, num_field, ts_field, DispatchPriceRecord, RawRecord,
};

// D,DISPATCH,PRICE columns:
//   4  SETTLEMENTDATE    9  RRP       12 APCFLAG
//   6  REGIONID          10 EEP       38 PRICE_STATUS
//   8  INTERVENTION      11 ROP       57 LASTCHANGED
// FCAS RRPs: 14 RAISE6SEC  17 RAISE60SEC  20 RAISE5MIN  23 RAISEREG
//            26 LOWER6SEC  29 LOWER60SEC  32 LOWER5MIN  35 LOWERREG
// 1-second markets (appended after LASTCHANGED): 58 RAISE1SEC  61 LOWER1SEC
const PRICE_SETTLEMENT: usize = 4;
const PRICE_REGION: usize = 6;
const PRICE_RRP: usize = 9;
const PRICE_ROP: usize = 11;
const PRICE_APC: usize = 12;
const PRICE_STATUS: usize = 38;
const PRICE_LASTCHANGED: usize = 57;

const PRICE_FCAS_RRP: [(FcasService, usize); 10] = [
    (FcasService::Raise6Sec, 14),
    (FcasService::Raise60Sec, 17),
    (FcasService::Raise5Min, 20),
    (FcasService::RaiseReg, 23),
    (FcasService::Lower6Sec, 26),
    (FcasService::Lower60Sec, 29),
    (FcasService::Lower5Min, 32),
    (FcasService::LowerReg, 35),
    (FcasService::Raise1Sec, 58),
    (FcasService::Lower1Sec, 61),
];

pub fn parse_price(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, PRICE_REGION)?)?;
    let settlement_ts = ts_field(fields, PRICE_SETTLEMENT)?;
    let rrp = clamp_price(num_field(fields, PRICE_RRP)?, "DISPATCH.PRICE rrp");
    let rop = num_field(fields, PRICE_ROP)?;
    let apc_flag = num_field(fields, PRICE_APC).unwrap_or(0.0) != 0.0;

    let mut fcas_prices = BTreeMap::new();
    for (service, idx) in PRICE_FCAS_RRP {
        // Trailing columns (the 1-second markets) are absent in older files.
        let price = num_field(fields, idx).unwrap_or(0.0);
        fcas_prices.insert(service, clamp_price(price, service.as_str()));
    }

    let price_status = field(fields, PRICE_STATUS)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let last_changed = ts_field(fields, PRICE_LASTCHANGED);

    Some(RawRecord::DispatchPrice(DispatchPriceRecord {
        region,
        settlement_ts,
        rrp,
        rop,
        apc_flag,
        fcas_prices,
        price_status,
        last_changed,
    }))
}

// D,DISPATCH,REGIONSUM columns:
//   4  SETTLEMENTDATE    9  TOTALDEMAND           15 NETINTERCHANGE
//   6  REGIONID          10 AVAILABLEGENERATION
// FCAS requirement triplets run DISPATCH/IMPORT/LOCALDISPATCH; the local
// dispatch slot is the one populated:
//   19 LOWER5MIN   22 LOWER60SEC  25 LOWER6SEC   28 RAISE5MIN
//   31 RAISE60SEC  34 RAISE6SEC   37 LOWERREG    40 RAISEREG
// The 1-second requirement also lands in the local-dispatch slot:
//   43 RAISE1SEC   46 LOWER1SEC
const RSUM_SETTLEMENT: usize = 4;
const RSUM_REGION: usize = 6;
const RSUM_DEMAND: usize = 9;
const RSUM_AVAILGEN: usize = 10;
const RSUM_INTERCHANGE: usize = 15;

const RSUM_FCAS_REQ: [(FcasService, usize); 10] = [
    (FcasService::Lower5Min, 19),
    (FcasService::Lower60Sec, 22),
    (FcasService::Lower6Sec, 25),
    (FcasService::Raise5Min, 28),
    (FcasService::Raise60Sec, 31),
    (FcasService::Raise6Sec, 34),
    (FcasService::LowerReg, 37),
    (FcasService::RaiseReg, 40),
    (FcasService::Raise1Sec, 43),
    (FcasService::Lower1Sec, 46),
];

pub fn parse_regionsum(fields: &[&str]) -> Option<RawRecord> {
    let region = Region::parse(field(fields, RSUM_REGION)?)?;
    let settlement_ts = ts_field(fields, RSUM_SETTLEMENT)?;
    let total_demand = clamp_mw(num_field(fields, RSUM_DEMAND)?, "REGIONSUM demand");
    let available_generation = clamp_mw(
        num_field(fields, RSUM_AVAILGEN)?,
        "REGIONSUM available generation",
    );
    let net_interchange = clamp_mw(
        num_field(fields, RSUM_INTERCHANGE).unwrap_or(0.0),
        "REGIONSUM interchange",
    );

    let mut fcas_required_mw = BTreeMap::new();
    for (service, idx) in RSUM_FCAS_REQ {
        fcas_required_mw.insert(service, num_field(fields, idx).unwrap_or(0.0));
    }

    Some(RawRecord::DispatchRegionSum(RegionSummaryRow {
        region,
        settlement_ts,
        total_demand,
        available_generation,
        net_interchange,
        fcas_required_mw,
    }))
}

// D,DISPATCH,INTERCONNECTORRES columns:
//   4 SETTLEMENTDATE   9  METEREDMWFLOW  12 MARGINALVALUE   16 EXPORTLIMIT
//   6 INTERCONNECTORID 10 MWFLOW         13 VIOLATIONDEGREE 17 IMPORTLIMIT
//                      11 MWLOSSES
const ICON_SETTLEMENT: usize = 4;
const ICON_ID: usize = 6;
const ICON_METERED: usize = 9;
const ICON_FLOW: usize = 10;
const ICON_LOSSES: usize = 11;
const ICON_MARGINAL: usize = 12;
const ICON_VIOLATION: usize = 13;
const ICON_EXPORT: usize = 16;
const ICON_IMPORT: usize = 17;

/// Well-known interconnector endpoints.
const INTERCONNECTOR_LINKS: &[(&str, Region, Region)] = &[
    ("NSW1-QLD1", Region::NSW1, Region::QLD1),
    ("N-Q-MNSP1", Region::NSW1, Region::QLD1),
    ("VIC1-NSW1", Region::VIC1, Region::NSW1),
    ("V-SA", Region::VIC1, Region::SA1),
    ("V-S-MNSP1", Region::VIC1, Region::SA1),
    ("T-V-MNSP1", Region::TAS1, Region::VIC1),
];

/// Resolve a link id to its (from, to) regions. Unknown two-token ids fall
/// back to splitting on `-`; anything else is UNKNOWN on both ends.
pub fn interconnector_endpoints(id: &str) -> (String, String) {
    if let Some((_, from, to)) = INTERCONNECTOR_LINKS.iter().find(|(k, _, _)| *k == id) {
        return (from.as_str().to_string(), to.as_str().to_string());
    }

    let parts: Vec<&str> = id.split('-').collect();
    if parts.len() == 2 {
        if let (Some(from), Some(to)) = (Region::parse(parts[0]), Region::parse(parts[1])) {
            return (from.as_str().to_string(), to.as_str().to_string());
        }
    }

    ("UNKNOWN".to_string(), "UNKNOWN".to_string())
}

pub fn parse_interconnector(fields: &[&str]) -> Option<RawRecord> {
    let id = field(fields, ICON_ID)?.to_string();
    if id.is_empty() {
        return None;
    }
    let settlement_ts = ts_field(fields, ICON_SETTLEMENT)?;
    let (from_region, to_region) = interconnector_endpoints(&id);

    Some(RawRecord::Interconnector(InterconnectorFlowRow {
        interconnector_id: id,
        settlement_ts,
        from_region,
        to_region,
        metered_mw: num_field(fields, ICON_METERED)?,
        mw_flow: num_field(fields, ICON_FLOW)?,
        mw_losses: num_field(fields, ICON_LOSSES)?,
        export_limit: num_field(fields, ICON_EXPORT).unwrap_or(0.0),
        import_limit: num_field(fields, ICON_IMPORT).unwrap_or(0.0),
        marginal_value: num_field(fields, ICON_MARGINAL).unwrap_or(0.0),
        violation_degree: num_field(fields, ICON_VIOLATION).unwrap_or(0.0),
    }))
}

// D,DISPATCH,CONSTRAINT columns:
//   4 SETTLEMENTDATE  6 CONSTRAINTID  9 RHS  10 MARGINALVALUE  11 VIOLATIONDEGREE
const CON_SETTLEMENT: usize = 4;
const CON_ID: usize = 6;
const CON_RHS: usize = 9;
const CON_MARGINAL: usize = 10;
const CON_VIOLATION: usize = 11;

pub fn parse_constraint(fields: &[&str]) -> Option<RawRecord> {
    let id = field(fields, CON_ID)?.to_string();
    if id.is_empty() {
        return None;
    }

    Some(RawRecord::Constraint(ConstraintRow {
        constraint_id: id,
        settlement_ts: ts_field(fields, CON_SETTLEMENT)?,
        rhs: num_field(fields, CON_RHS)?,
        marginal_value: num_field(fields, CON_MARGINAL)?,
        violation_degree: num_field(fields, CON_VIOLATION).unwrap_or(0.0),
    }))
}

// D,DISPATCH,UNIT_SOLUTION columns:
//   4 SETTLEMENTDATE  9  INITIALMW     23 AVAILABILITY
//   6 DUID            10 TOTALCLEARED  24 SEMIDISPATCHCAP
//   8 INTERVENTION    11 RAMPDOWNRATE
//                     12 RAMPUPRATE
// FCAS enablement MW:
//   13 LOWER5MIN  14 LOWER60SEC  15 LOWER6SEC  16 RAISE5MIN  17 RAISE60SEC
//   18 RAISE6SEC  19 LOWERREG    20 RAISEREG   21 RAISE1SEC  22 LOWER1SEC
const UNIT_SETTLEMENT: usize = 4;
const UNIT_DUID: usize = 6;
const UNIT_INTERVENTION: usize = 8;
const UNIT_INITIAL: usize = 9;
const UNIT_CLEARED: usize = 10;
const UNIT_RAMP_DOWN: usize = 11;
const UNIT_RAMP_UP: usize = 12;
const UNIT_AVAILABILITY: usize = 23;
const UNIT_SEMI_CAP: usize = 24;

const UNIT_FCAS: [(FcasService, usize); 10] = [
    (FcasService::Lower5Min, 13),
    (FcasService::Lower60Sec, 14),
    (FcasService::Lower6Sec, 15),
    (FcasService::Raise5Min, 16),
    (FcasService::Raise60Sec, 17),
    (FcasService::Raise6Sec, 18),
    (FcasService::LowerReg, 19),
    (FcasService::RaiseReg, 20),
    (FcasService::Raise1Sec, 21),
    (FcasService::Lower1Sec, 22),
];

pub fn parse_unit_solution(fields: &[&str]) -> Option<RawRecord> {
    let duid = field(fields, UNIT_DUID)?.to_string();
    if duid.is_empty() {
        return None;
    }
    let settlement_ts = ts_field(fields, UNIT_SETTLEMENT)?;
    let intervention = num_field(fields, UNIT_INTERVENTION).unwrap_or(0.0) as i64;

    let mut fcas_enabled_mw = BTreeMap::new();
    for (service, idx) in UNIT_FCAS {
        fcas_enabled_mw.insert(service, num_field(fields, idx).unwrap_or(0.0));
    }

    Some(RawRecord::UnitSolution(GeneratorDispatchRow {
        duid,
        settlement_ts,
        intervention,
        initial_mw: clamp_mw(num_field(fields, UNIT_INITIAL)?, "UNIT_SOLUTION initial"),
        total_cleared_mw: clamp_mw(num_field(fields, UNIT_CLEARED)?, "UNIT_SOLUTION cleared"),
        ramp_down_rate: num_field(fields, UNIT_RAMP_DOWN).unwrap_or(0.0),
        ramp_up_rate: num_field(fields, UNIT_RAMP_UP).unwrap_or(0.0),
        availability: num_field(fields, UNIT_AVAILABILITY).unwrap_or(0.0),
        semi_dispatch_cap: num_field(fields, UNIT_SEMI_CAP).unwrap_or(0.0) != 0.0,
        fcas_enabled_mw,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::split_fields;

    fn price_row(region: &str, rrp: &str) -> String {
        let mut cols = vec![String::new(); 62];
        cols[0] = "D".into();
        cols[1] = "DISPATCH".into();
        cols[2] = "PRICE".into();
        cols[3] = "5".into();
        cols[4] = "2025/08/23 19:05:00".into();
        cols[5] = "1".into();
        cols[6] = region.into();
        cols[8] = "0".into();
        cols[9] = rrp.into();
        cols[11] = "0".into();
        cols[14] = "0.5".into(); // RAISE6SECRRP
        cols[26] = "0".into(); // LOWER6SECRRP
        cols.join(",")
    }

    #[test]
    fn parses_price_row() {
        let row = price_row("NSW1", "134.85637");
        let fields = split_fields(&row);
        let Some(RawRecord::DispatchPrice(rec)) = parse_price(&fields) else {
            panic!("expected price record");
        };
        assert_eq!(rec.region, Region::NSW1);
        assert_eq!(rec.rrp, 134.85637);
        assert_eq!(rec.fcas_prices[&FcasService::Raise6Sec], 0.5);
        assert_eq!(rec.fcas_prices[&FcasService::Lower6Sec], 0.0);
        assert_eq!(
            rec.settlement_ts.to_rfc3339(),
            "2025-08-23T09:05:00+00:00"
        );
    }

    #[test]
    fn price_above_cap_is_clamped() {
        let row = price_row("NSW1", "20000");
        let fields = split_fields(&row);
        let Some(RawRecord::DispatchPrice(rec)) = parse_price(&fields) else {
            panic!("expected price record");
        };
        assert_eq!(rec.rrp, 16_600.0);
    }

    #[test]
    fn unknown_region_skips_row() {
        let row = price_row("SNOWY1", "50");
        let fields = split_fields(&row);
        assert!(parse_price(&fields).is_none());
    }

    #[test]
    fn bad_number_skips_row() {
        let row = price_row("NSW1", "not-a-price");
        let fields = split_fields(&row);
        assert!(parse_price(&fields).is_none());
    }

    #[test]
    fn interconnector_endpoints_cover_table_split_and_unknown() {
        assert_eq!(
            interconnector_endpoints("V-S-MNSP1"),
            ("VIC1".to_string(), "SA1".to_string())
        );
        assert_eq!(
            interconnector_endpoints("NSW1-QLD1"),
            ("NSW1".to_string(), "QLD1".to_string())
        );
        assert_eq!(
            interconnector_endpoints("XX-YY-ZZ"),
            ("UNKNOWN".to_string(), "UNKNOWN".to_string())
        );
    }

    #[test]
    fn parses_regionsum_row() {
        let mut cols = vec![String::new(); 47];
        cols[0] = "D".into();
        cols[1] = "DISPATCH".into();
        cols[2] = "REGIONSUM".into();
        cols[4] = "2025/08/23 19:05:00".into();
        cols[6] = "NSW1".into();
        cols[9] = "9334.46".into();
        cols[10] = "11004.64".into();
        cols[15] = "-123.45".into();
        cols[34] = "550.0".into(); // RAISE6SEC requirement
        let row = cols.join(",");
        let fields = split_fields(&row);
        let Some(RawRecord::DispatchRegionSum(rec)) = parse_regionsum(&fields) else {
            panic!("expected regionsum record");
        };
        assert_eq!(rec.total_demand, 9334.46);
        assert_eq!(rec.available_generation, 11004.64);
        assert_eq!(rec.net_interchange, -123.45);
        assert_eq!(rec.fcas_required_mw[&FcasService::Raise6Sec], 550.0);
    }

    #[test]
    fn unit_solution_keeps_intervention_in_key() {
        let mut cols = vec![String::new(); 25];
        cols[0] = "D".into();
        cols[1] = "DISPATCH".into();
        cols[2] = "UNIT_SOLUTION".into();
        cols[4] = "2025/08/23 19:05:00".into();
        cols[6] = "BW01".into();
        cols[8] = "1".into();
        cols[9] = "620.0".into();
        cols[10] = "660.0".into();
        cols[23] = "660.0".into();
        let row = cols.join(",");
        let fields = split_fields(&row);
        let Some(RawRecord::UnitSolution(rec)) = parse_unit_solution(&fields) else {
            panic!("expected unit record");
        };
        assert_eq!(rec.intervention, 1);
        assert_eq!(rec.total_cleared_mw, 660.0);
    }
}
