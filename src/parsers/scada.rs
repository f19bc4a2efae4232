//! DISPATCH_UNIT_SCADA parser.

use crate::models::ScadaRow;

use super::{clamp_mw, field, num_field, ts_field, RawRecord};

// D,DISPATCH,UNIT_SCADA columns:
//   4 SETTLEMENTDATE  5 DUID  6 SCADAVALUE
const SCADA_SETTLEMENT: usize = 4;
const SCADA_DUID: usize = 5;
const SCADA_VALUE: usize = 6;

pub fn parse_unit_scada(fields: &[&str]) -> Option<RawRecord> {
    let duid = field(fields, SCADA_DUID)?.to_string();
    if duid.is_empty() {
        return None;
    }

    Some(RawRecord::Scada(ScadaRow {
        duid,
        settlement_ts: ts_field(fields, SCADA_SETTLEMENT)?,
        // Negative is a consuming unit; clamp only guards against corrupt values.
        scada_mw: clamp_mw(num_field(fields, SCADA_VALUE)?, "UNIT_SCADA value"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::split_fields;

    #[test]
    fn parses_scada_row() {
        let fields =
            split_fields("D,DISPATCH,UNIT_SCADA,1,\"2025/08/23 19:05:00\",BW01,612.5");
        let Some(RawRecord::Scada(rec)) = parse_unit_scada(&fields) else {
            panic!("expected scada record");
        };
        assert_eq!(rec.duid, "BW01");
        assert_eq!(rec.scada_mw, 612.5);
    }

    #[test]
    fn negative_consumption_is_preserved() {
        let fields =
            split_fields("D,DISPATCH,UNIT_SCADA,1,\"2025/08/23 19:05:00\",HPRL1,-42.0");
        let Some(RawRecord::Scada(rec)) = parse_unit_scada(&fields) else {
            panic!("expected scada record");
        };
        assert_eq!(rec.scada_mw, -42.0);
    }

    #[test]
    fn missing_duid_skips_row() {
        let fields = split_fields("D,DISPATCH,UNIT_SCADA,1,\"2025/08/23 19:05:00\",,10");
        assert!(parse_unit_scada(&fields).is_none());
    }
}
