//! TRADINGIS parsers (header-mapped mode).
//!
//! Unlike dispatch, the trading file's `I` rows drive a name→index map, so
//! upstream column additions don't shift our reads. The positional fallbacks
//! are the column positions of the oldest supported layout.

use crate::models::Region;

use super::{
    clamp_mw, clamp_price, field, num_field, ts_field, HeaderIndex, RawRecord,
    TradingPriceRecord, TradingRegionSumRecord,
};

// Fallback positions for I-row-less files (legacy layout):
//   TRADING,PRICE:     4 SETTLEMENTDATE  6 REGIONID  8 RRP
//   TRADING,REGIONSUM: 4 SETTLEMENTDATE  6 REGIONID  9 TOTALDEMAND
//                      10 AVAILABLEGENERATION  11 NETINTERCHANGE
const FALLBACK_SETTLEMENT: usize = 4;
const FALLBACK_REGION: usize = 6;
const FALLBACK_RRP: usize = 8;
const FALLBACK_DEMAND: usize = 9;
const FALLBACK_AVAILGEN: usize = 10;
const FALLBACK_INTERCHANGE: usize = 11;

pub fn parse_price(fields: &[&str], header: &HeaderIndex) -> Option<RawRecord> {
    let region_idx = header.resolve("REGIONID", FALLBACK_REGION);
    let ts_idx = header.resolve("SETTLEMENTDATE", FALLBACK_SETTLEMENT);
    let rrp_idx = header.resolve("RRP", FALLBACK_RRP);

    let region = Region::parse(field(fields, region_idx)?)?;
    let trading_ts = ts_field(fields, ts_idx)?;
    let rrp = clamp_price(num_field(fields, rrp_idx)?, "TRADING.PRICE rrp");

    Some(RawRecord::TradingPrice(TradingPriceRecord {
        region,
        trading_ts,
        rrp,
    }))
}

pub fn parse_regionsum(fields: &[&str], header: &HeaderIndex) -> Option<RawRecord> {
    let region_idx = header.resolve("REGIONID", FALLBACK_REGION);
    let ts_idx = header.resolve("SETTLEMENTDATE", FALLBACK_SETTLEMENT);
    let demand_idx = header.resolve("TOTALDEMAND", FALLBACK_DEMAND);
    let gen_idx = header.resolve("AVAILABLEGENERATION", FALLBACK_AVAILGEN);
    let interchange_idx = header.resolve("NETINTERCHANGE", FALLBACK_INTERCHANGE);

    let region = Region::parse(field(fields, region_idx)?)?;
    let trading_ts = ts_field(fields, ts_idx)?;

    Some(RawRecord::TradingRegionSum(TradingRegionSumRecord {
        region,
        trading_ts,
        total_demand: clamp_mw(num_field(fields, demand_idx)?, "TRADING demand"),
        available_generation: clamp_mw(num_field(fields, gen_idx)?, "TRADING generation"),
        net_interchange: clamp_mw(
            num_field(fields, interchange_idx).unwrap_or(0.0),
            "TRADING interchange",
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{split_fields, ParserRegistry, RawRecord};

    #[test]
    fn header_row_remaps_columns() {
        // RRP deliberately moved to a non-fallback position; the I row wins.
        let csv = "\
I,TRADING,PRICE,2,SETTLEMENTDATE,RUNNO,REGIONID,PERIODID,INVALIDFLAG,RRP,EEP
D,TRADING,PRICE,2,\"2025/08/23 19:30:00\",1,SA1,39,0,88.5,0";
        let outcome = ParserRegistry::standard().parse(csv);
        assert_eq!(outcome.records.len(), 1);
        let RawRecord::TradingPrice(rec) = &outcome.records[0] else {
            panic!("expected trading price");
        };
        assert_eq!(rec.region, Region::SA1);
        assert_eq!(rec.rrp, 88.5);
    }

    #[test]
    fn falls_back_to_positions_without_header() {
        let row = "D,TRADING,PRICE,2,\"2025/08/23 19:30:00\",1,VIC1,39,61.25";
        let fields = split_fields(row);
        let rec = parse_price(&fields, &HeaderIndex::default()).unwrap();
        let RawRecord::TradingPrice(rec) = rec else {
            panic!("expected trading price");
        };
        assert_eq!(rec.region, Region::VIC1);
        assert_eq!(rec.rrp, 61.25);
    }

    #[test]
    fn regionsum_reads_named_columns() {
        let csv = "\
I,TRADING,REGIONSUM,2,SETTLEMENTDATE,RUNNO,REGIONID,PERIODID,TOTALDEMAND,AVAILABLEGENERATION,NETINTERCHANGE
D,TRADING,REGIONSUM,2,\"2025/08/23 19:30:00\",1,QLD1,39,6100.2,8100.0,300.5";
        let outcome = ParserRegistry::standard().parse(csv);
        let RawRecord::TradingRegionSum(rec) = &outcome.records[0] else {
            panic!("expected trading regionsum");
        };
        assert_eq!(rec.total_demand, 6100.2);
        assert_eq!(rec.net_interchange, 300.5);
    }
}
