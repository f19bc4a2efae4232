pub mod archive;
pub mod directory;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

pub use archive::{extract_csv, fetch};
pub use directory::DirectoryScanner;

/// The report families published under the reporting site's `Current/` tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportFamily {
    Dispatch,
    P5min,
    Scada,
    NextDayDispatch,
    Trading,
    Predispatch,
    Stpasa,
}

impl ReportFamily {
    pub const ALL: [ReportFamily; 7] = [
        ReportFamily::Dispatch,
        ReportFamily::P5min,
        ReportFamily::Scada,
        ReportFamily::NextDayDispatch,
        ReportFamily::Trading,
        ReportFamily::Predispatch,
        ReportFamily::Stpasa,
    ];

    /// Directory name under the reporting base URL.
    pub fn dir(&self) -> &'static str {
        match self {
            ReportFamily::Dispatch => "DispatchIS_Reports",
            ReportFamily::P5min => "P5_Reports",
            ReportFamily::Scada => "Dispatch_SCADA",
            ReportFamily::NextDayDispatch => "Next_Day_Dispatch",
            ReportFamily::Trading => "TradingIS_Reports",
            ReportFamily::Predispatch => "PredispatchIS_Reports",
            ReportFamily::Stpasa => "STPASA_Reports",
        }
    }

    /// Token embedded in the family's archive filenames.
    pub fn token(&self) -> &'static str {
        match self {
            ReportFamily::Dispatch => "DISPATCHIS",
            ReportFamily::P5min => "P5MIN",
            ReportFamily::Scada => "DISPATCHSCADA",
            ReportFamily::NextDayDispatch => "NEXT_DAY_DISPATCH",
            ReportFamily::Trading => "TRADINGIS",
            ReportFamily::Predispatch => "PREDISPATCHIS",
            ReportFamily::Stpasa => "STPASA",
        }
    }

    /// Lowercase slug for archive keys and structured logs.
    pub fn slug(&self) -> &'static str {
        match self {
            ReportFamily::Dispatch => "dispatch",
            ReportFamily::P5min => "p5min",
            ReportFamily::Scada => "scada",
            ReportFamily::NextDayDispatch => "next_day_dispatch",
            ReportFamily::Trading => "trading",
            ReportFamily::Predispatch => "predispatch",
            ReportFamily::Stpasa => "stpasa",
        }
    }

    /// Family-specific filename regex used as the last extraction strategy
    /// when a truncated page loses its anchor markup.
    pub fn fallback_pattern(&self) -> Option<&'static Regex> {
        static PATTERNS: OnceLock<HashMap<ReportFamily, Regex>> = OnceLock::new();
        let map = PATTERNS.get_or_init(|| {
            Self::ALL
                .iter()
                .map(|family| {
                    let re = Regex::new(&format!(
                        r"PUBLIC_{}_\d{{12}}_[0-9A-Z]+\.zip",
                        regex::escape(family.token())
                    ))
                    .expect("family pattern is a valid regex");
                    (*family, re)
                })
                .collect()
        });
        map.get(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_pattern_matches_family_files() {
        let re = ReportFamily::Scada.fallback_pattern().unwrap();
        assert!(re.is_match("PUBLIC_DISPATCHSCADA_202508231905_0000000471234567.zip"));
        assert!(!re.is_match("PUBLIC_DISPATCHIS_202508231905_0000000471234567.zip"));
    }

    #[test]
    fn every_family_has_distinct_dir_and_token() {
        let dirs: std::collections::HashSet<_> =
            ReportFamily::ALL.iter().map(|f| f.dir()).collect();
        assert_eq!(dirs.len(), ReportFamily::ALL.len());
    }
}
