//! Report-file parsers.
//!
//! Every bundle is one delimited text file mixing comment (`C`), header
//! (`I`) and data (`D`) rows. The first three fields of a data row form the
//! record tag `(family, subtype)`; the rest are positional columns. Parsers
//! are registered per tag and are pure functions over the split fields, so
//! adding a record type is one function plus one registry entry.
//!
//! Two modes coexist: fixed-position parsers (dispatch and the forecast
//! families, where column indexes are hard-coded and documented) and
//! header-mapped parsers (trading, where the `I` row names the columns and
//! data rows are resolved by name with a positional fallback).

pub mod battery;
pub mod dispatch;
pub mod merge;
pub mod p5min;
pub mod predispatch;
pub mod scada;
pub mod stpasa;
pub mod trading;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::models::{
    ConstraintRow, FcasService, GeneratorDispatchRow, InterconnectorFlowRow, P5minRegionForecast,
    P5minUnitForecast, RegionSummaryRow, ScadaRow, StpasaRegionRow, StpasaUnitAvailability,
};
use crate::timemap;

/// Market price cap and floor, $/MWh.
pub const PRICE_FLOOR: f64 = -1_000.0;
pub const PRICE_CAP: f64 = 16_600.0;

/// Sanity range for MW quantities.
pub const MW_FLOOR: f64 = -10_000.0;
pub const MW_CAP: f64 = 50_000.0;

/// A PRICE record before the REGIONSUM merge.
#[derive(Debug, Clone)]
pub struct DispatchPriceRecord {
    pub region: crate::models::Region,
    pub settlement_ts: DateTime<Utc>,
    pub rrp: f64,
    pub rop: f64,
    pub apc_flag: bool,
    pub fcas_prices: BTreeMap<FcasService, f64>,
    pub price_status: Option<String>,
    pub last_changed: Option<DateTime<Utc>>,
}

/// A TRADING PRICE record before the region-sum merge.
#[derive(Debug, Clone)]
pub struct TradingPriceRecord {
    pub region: crate::models::Region,
    pub trading_ts: DateTime<Utc>,
    pub rrp: f64,
}

#[derive(Debug, Clone)]
pub struct TradingRegionSumRecord {
    pub region: crate::models::Region,
    pub trading_ts: DateTime<Utc>,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
}

/// Predispatch REGIONSUM record merged into the region forecast post-pass.
#[derive(Debug, Clone)]
pub struct PredispatchRegionSumRecord {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub region: crate::models::Region,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
}

#[derive(Debug, Clone)]
pub struct PredispatchRegionPriceRecord {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub region: crate::models::Region,
    pub rrp: f64,
}

/// Every record a registry walk can produce. Cross-record merging is an
/// explicit post-pass over these, not embedded in the parsers.
#[derive(Debug, Clone)]
pub enum RawRecord {
    DispatchPrice(DispatchPriceRecord),
    DispatchRegionSum(RegionSummaryRow),
    Interconnector(InterconnectorFlowRow),
    Constraint(ConstraintRow),
    UnitSolution(GeneratorDispatchRow),
    Scada(ScadaRow),
    TradingPrice(TradingPriceRecord),
    TradingRegionSum(TradingRegionSumRecord),
    P5Region(P5minRegionForecast),
    P5Unit(P5minUnitForecast),
    PredispatchRegionPrice(PredispatchRegionPriceRecord),
    PredispatchRegionSum(PredispatchRegionSumRecord),
    PredispatchUnit(crate::models::PredispatchUnitRow),
    PredispatchInterconnector(crate::models::InterconnectorForecast),
    PredispatchConstraint(crate::models::ConstraintForecast),
    StpasaRegion(StpasaRegionRow),
    StpasaUnit(StpasaUnitAvailability),
}

/// Column name → index map built from an `I` row, keyed by subtype.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    by_name: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn from_header_fields(fields: &[&str]) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_ascii_uppercase(), i))
            .collect();
        Self { by_name }
    }

    /// Resolve a column by name, falling back to the fixed position the
    /// field held before the upstream added columns.
    pub fn resolve(&self, name: &str, fallback: usize) -> usize {
        self.by_name
            .get(&name.to_ascii_uppercase())
            .copied()
            .unwrap_or(fallback)
    }
}

pub type FixedParser = fn(&[&str]) -> Option<RawRecord>;
pub type HeaderMappedParser = fn(&[&str], &HeaderIndex) -> Option<RawRecord>;

enum ParserKind {
    Fixed(FixedParser),
    HeaderMapped(HeaderMappedParser),
}

/// Registry from record tag to parser, built once at startup.
pub struct ParserRegistry {
    map: HashMap<(&'static str, &'static str), ParserKind>,
}

/// Result of one registry walk over a bundle.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub records: Vec<RawRecord>,
    /// Data rows skipped because of a bad identifier or unparseable value.
    pub skipped_rows: usize,
    /// Data rows whose tag had no registered parser.
    pub unrecognised_rows: usize,
}

impl ParserRegistry {
    /// The full standard registry covering every report family.
    pub fn standard() -> Self {
        let mut map: HashMap<(&'static str, &'static str), ParserKind> = HashMap::new();

        map.insert(
            ("DISPATCH", "PRICE"),
            ParserKind::Fixed(dispatch::parse_price),
        );
        map.insert(
            ("DISPATCH", "REGIONSUM"),
            ParserKind::Fixed(dispatch::parse_regionsum),
        );
        map.insert(
            ("DISPATCH", "INTERCONNECTORRES"),
            ParserKind::Fixed(dispatch::parse_interconnector),
        );
        map.insert(
            ("DISPATCH", "CONSTRAINT"),
            ParserKind::Fixed(dispatch::parse_constraint),
        );
        map.insert(
            ("DISPATCH", "UNIT_SOLUTION"),
            ParserKind::Fixed(dispatch::parse_unit_solution),
        );
        map.insert(
            ("DISPATCH", "UNIT_SCADA"),
            ParserKind::Fixed(scada::parse_unit_scada),
        );
        map.insert(
            ("TRADING", "PRICE"),
            ParserKind::HeaderMapped(trading::parse_price),
        );
        map.insert(
            ("TRADING", "REGIONSUM"),
            ParserKind::HeaderMapped(trading::parse_regionsum),
        );
        map.insert(
            ("P5MIN", "REGIONSOLUTION"),
            ParserKind::Fixed(p5min::parse_regionsolution),
        );
        map.insert(
            ("P5MIN", "UNITSOLUTION"),
            ParserKind::Fixed(p5min::parse_unitsolution),
        );
        map.insert(
            ("PREDISPATCH", "REGION_PRICES"),
            ParserKind::Fixed(predispatch::parse_region_prices),
        );
        map.insert(
            ("PREDISPATCH", "REGIONSUM"),
            ParserKind::Fixed(predispatch::parse_regionsum),
        );
        map.insert(
            ("PREDISPATCH", "UNIT_SOLUTION"),
            ParserKind::Fixed(predispatch::parse_unit_solution),
        );
        map.insert(
            ("PREDISPATCH", "INTERCONNECTORRES"),
            ParserKind::Fixed(predispatch::parse_interconnector),
        );
        map.insert(
            ("PREDISPATCH", "CONSTRAINT"),
            ParserKind::Fixed(predispatch::parse_constraint),
        );
        map.insert(
            ("STPASA", "REGIONSOLUTION"),
            ParserKind::Fixed(stpasa::parse_regionsolution),
        );
        map.insert(
            ("STPASA", "UNITAVAILABILITY"),
            ParserKind::Fixed(stpasa::parse_unitavailability),
        );

        Self { map }
    }

    /// Walk every row of a bundle. Row-level failures are skipped with a
    /// warning; only the caller decides whether a whole bundle failed.
    pub fn parse(&self, csv: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut headers: HashMap<(String, String), HeaderIndex> = HashMap::new();

        for line in csv.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let fields = split_fields(line);
            match fields.first().copied() {
                Some("C") | None => continue,
                Some("I") => {
                    if fields.len() >= 3 {
                        let key = (
                            fields[1].trim().to_ascii_uppercase(),
                            fields[2].trim().to_ascii_uppercase(),
                        );
                        headers.insert(key, HeaderIndex::from_header_fields(&fields));
                    }
                }
                Some("D") => {
                    if fields.len() < 3 {
                        outcome.skipped_rows += 1;
                        warn!(row = %line, "data row missing record tag");
                        continue;
                    }
                    let family = fields[1].trim().to_ascii_uppercase();
                    let subtype = fields[2].trim().to_ascii_uppercase();

                    let Some(parser) = self.map.get(&(
                        leak_lookup(&family),
                        leak_lookup(&subtype),
                    )) else {
                        outcome.unrecognised_rows += 1;
                        continue;
                    };

                    let parsed = match parser {
                        ParserKind::Fixed(f) => f(&fields),
                        ParserKind::HeaderMapped(f) => {
                            let header = headers
                                .get(&(family.clone(), subtype.clone()))
                                .unwrap_or_else(|| empty_header());
                            f(&fields, header)
                        }
                    };

                    match parsed {
                        Some(rec) => outcome.records.push(rec),
                        None => {
                            outcome.skipped_rows += 1;
                            warn!(family = %family, subtype = %subtype, "skipping unparseable data row");
                        }
                    }
                }
                Some(other) => {
                    debug!(tag = other, "ignoring row with unknown leading tag");
                }
            }
        }

        outcome
    }
}

fn empty_header() -> &'static HeaderIndex {
    static EMPTY: std::sync::OnceLock<HeaderIndex> = std::sync::OnceLock::new();
    EMPTY.get_or_init(HeaderIndex::default)
}

/// Tag lookup keys are 'static in the registry; map a parsed string onto the
/// known set without leaking arbitrary input.
fn leak_lookup(s: &str) -> &'static str {
    const KNOWN: &[&str] = &[
        "DISPATCH",
        "TRADING",
        "P5MIN",
        "PREDISPATCH",
        "STPASA",
        "PRICE",
        "REGIONSUM",
        "INTERCONNECTORRES",
        "CONSTRAINT",
        "UNIT_SOLUTION",
        "UNIT_SCADA",
        "REGIONSOLUTION",
        "UNITSOLUTION",
        "REGION_PRICES",
        "UNITAVAILABILITY",
    ];
    KNOWN.iter().copied().find(|k| *k == s).unwrap_or("")
}

/// Split a delimited row, trimming the quotes AEMO wraps around strings.
pub fn split_fields(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"'))
        .collect()
}

/// Positional field access with range validation.
pub fn field<'a>(fields: &[&'a str], idx: usize) -> Option<&'a str> {
    fields.get(idx).copied()
}

/// Numeric field: empty string maps to 0 per the upstream convention; an
/// unparseable value is a row-level failure.
pub fn num_field(fields: &[&str], idx: usize) -> Option<f64> {
    let raw = field(fields, idx)?;
    if raw.is_empty() {
        return Some(0.0);
    }
    raw.parse::<f64>().ok()
}

/// Timestamp field in market time; `None` on parse failure.
pub fn ts_field(fields: &[&str], idx: usize) -> Option<DateTime<Utc>> {
    let raw = field(fields, idx)?;
    timemap::parse_market_to_utc(raw).ok()
}

/// Clamp a price to the market cap/floor, warning when the clamp bites.
pub fn clamp_price(value: f64, context: &str) -> f64 {
    if value > PRICE_CAP {
        warn!(value, context, cap = PRICE_CAP, "price above market cap, clamping");
        PRICE_CAP
    } else if value < PRICE_FLOOR {
        warn!(value, context, floor = PRICE_FLOOR, "price below market floor, clamping");
        PRICE_FLOOR
    } else {
        value
    }
}

/// Clamp an MW quantity to the sanity range.
pub fn clamp_mw(value: f64, context: &str) -> f64 {
    if value > MW_CAP {
        warn!(value, context, "MW above sanity cap, clamping");
        MW_CAP
    } else if value < MW_FLOOR {
        warn!(value, context, "MW below sanity floor, clamping");
        MW_FLOOR
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fields_strips_quotes() {
        let fields = split_fields(r#"D,DISPATCH,PRICE,5,"2025/08/23 19:05:00",1,NSW1"#);
        assert_eq!(fields[4], "2025/08/23 19:05:00");
        assert_eq!(fields[6], "NSW1");
    }

    #[test]
    fn num_field_empty_is_zero() {
        let fields = vec!["D", "", "1.5", "x"];
        assert_eq!(num_field(&fields, 1), Some(0.0));
        assert_eq!(num_field(&fields, 2), Some(1.5));
        assert_eq!(num_field(&fields, 3), None);
        assert_eq!(num_field(&fields, 9), None);
    }

    #[test]
    fn clamps_apply_at_bounds() {
        assert_eq!(clamp_price(20_000.0, "test"), PRICE_CAP);
        assert_eq!(clamp_price(-2_000.0, "test"), PRICE_FLOOR);
        assert_eq!(clamp_price(134.85637, "test"), 134.85637);
        assert_eq!(clamp_mw(60_000.0, "test"), MW_CAP);
        assert_eq!(clamp_mw(-123.45, "test"), -123.45);
    }

    #[test]
    fn walk_skips_comments_and_counts_unknown_tags() {
        let registry = ParserRegistry::standard();
        let csv = "C,NEMP.WORLD,DISPATCHIS\nD,DISPATCH,NOSUCH,1,foo\nC,END OF REPORT";
        let outcome = registry.parse(csv);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.unrecognised_rows, 1);
        assert_eq!(outcome.skipped_rows, 0);
    }

    #[test]
    fn header_index_resolves_by_name_with_fallback() {
        let fields = split_fields("I,TRADING,PRICE,2,SETTLEMENTDATE,RUNNO,REGIONID,PERIODID,RRP");
        let idx = HeaderIndex::from_header_fields(&fields);
        assert_eq!(idx.resolve("RRP", 99), 8);
        assert_eq!(idx.resolve("rrp", 99), 8);
        assert_eq!(idx.resolve("MISSING", 7), 7);
    }
}
