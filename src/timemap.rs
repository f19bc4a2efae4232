//! Market time handling.
//!
//! AEMO publishes every timestamp in fixed UTC+10 ("market time") and does
//! not observe daylight saving, so all conversions here use a fixed offset.
//! Never swap this for a civil timezone lookup.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Fixed +10:00 offset used by the market operator.
pub const MARKET_OFFSET_SECS: i32 = 10 * 3600;

const MARKET_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

fn market_offset() -> FixedOffset {
    // 10h east is always a valid offset.
    FixedOffset::east_opt(MARKET_OFFSET_SECS).unwrap()
}

/// Parse a `YYYY/MM/DD HH:MM:SS` market-time string into UTC.
///
/// A parse failure means the upstream file is malformed and must surface to
/// the caller; it is never coerced to a default.
pub fn parse_market_to_utc(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), MARKET_FORMAT)
        .with_context(|| format!("invalid market timestamp: {s:?}"))?;
    let local = market_offset()
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| anyhow!("ambiguous market timestamp: {s:?}"))?;
    Ok(local.with_timezone(&Utc))
}

/// Format a UTC instant back into the `YYYY/MM/DD HH:MM:SS` market form.
/// Exact inverse of [`parse_market_to_utc`].
pub fn format_utc_as_market(utc: DateTime<Utc>) -> String {
    utc.with_timezone(&market_offset())
        .format(MARKET_FORMAT)
        .to_string()
}

/// Floor to the enclosing 5-minute dispatch interval boundary.
pub fn align_to_5min(utc: DateTime<Utc>) -> DateTime<Utc> {
    align_to_secs(utc, 300)
}

/// Floor to the enclosing 30-minute trading interval boundary.
pub fn align_to_30min(utc: DateTime<Utc>) -> DateTime<Utc> {
    align_to_secs(utc, 1800)
}

fn align_to_secs(utc: DateTime<Utc>, step: i64) -> DateTime<Utc> {
    let ts = utc.timestamp();
    let floored = ts - ts.rem_euclid(step);
    Utc.timestamp_opt(floored, 0).unwrap()
}

/// The most recent 04:00 market-time boundary at or before `utc`.
/// Trading days run 04:00 → 04:00 market time.
pub fn trading_day_start(utc: DateTime<Utc>) -> DateTime<Utc> {
    let local = utc.with_timezone(&market_offset());
    let four_am = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
    let date = if local.time() >= four_am {
        local.date_naive()
    } else {
        local.date_naive() - Duration::days(1)
    };
    let start_local = market_offset()
        .from_local_datetime(&date.and_time(four_am))
        .single()
        .expect("fixed offset datetimes are unambiguous");
    start_local.with_timezone(&Utc)
}

/// Whole minutes elapsed between `interval` and `now` (negative when the
/// interval is in the future). Used by the freshness checks.
pub fn interval_age_minutes(now: DateTime<Utc>, interval: DateTime<Utc>) -> i64 {
    (now - interval).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_market_time_as_fixed_plus_ten() {
        let utc = parse_market_to_utc("2025/08/23 19:05:00").unwrap();
        assert_eq!(utc.to_rfc3339(), "2025-08-23T09:05:00+00:00");
    }

    #[test]
    fn format_round_trips() {
        for s in [
            "2025/08/23 19:05:00",
            "2025/01/01 00:00:00",
            "2024/12/31 23:59:59",
        ] {
            let utc = parse_market_to_utc(s).unwrap();
            assert_eq!(format_utc_as_market(utc), s);
        }
    }

    #[test]
    fn dst_spring_forward_is_ignored() {
        // 2025-10-05 02:30 does not exist in civil Sydney time (clocks jump
        // 02:00 -> 03:00), but market time is fixed +10 so it must parse and
        // round-trip like any other instant.
        let s = "2025/10/05 02:30:00";
        let utc = parse_market_to_utc(s).unwrap();
        assert_eq!(utc.to_rfc3339(), "2025-10-04T16:30:00+00:00");
        assert_eq!(format_utc_as_market(utc), s);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        assert!(parse_market_to_utc("2025-08-23 19:05:00").is_err());
        assert!(parse_market_to_utc("not a time").is_err());
        assert!(parse_market_to_utc("").is_err());
    }

    #[test]
    fn aligns_to_interval_boundaries() {
        let utc = parse_market_to_utc("2025/08/23 19:07:42").unwrap();
        assert_eq!(
            format_utc_as_market(align_to_5min(utc)),
            "2025/08/23 19:05:00"
        );
        assert_eq!(
            format_utc_as_market(align_to_30min(utc)),
            "2025/08/23 19:00:00"
        );
    }

    #[test]
    fn alignment_is_idempotent_on_boundaries() {
        let utc = parse_market_to_utc("2025/08/23 19:05:00").unwrap();
        assert_eq!(align_to_5min(utc), utc);
    }

    #[test]
    fn trading_day_boundary_at_four_am() {
        let before = parse_market_to_utc("2025/08/23 03:59:00").unwrap();
        let at = parse_market_to_utc("2025/08/23 04:00:00").unwrap();

        assert_eq!(
            format_utc_as_market(trading_day_start(before)),
            "2025/08/22 04:00:00"
        );
        assert_eq!(
            format_utc_as_market(trading_day_start(at)),
            "2025/08/23 04:00:00"
        );
    }

    #[test]
    fn trading_day_across_dst_transition() {
        // Spring-forward morning: fixed offset means the boundary math is
        // unchanged.
        let late = parse_market_to_utc("2025/10/05 03:30:00").unwrap();
        assert_eq!(
            format_utc_as_market(trading_day_start(late)),
            "2025/10/04 04:00:00"
        );
    }
}
