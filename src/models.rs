use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// NEM pricing regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    NSW1,
    VIC1,
    QLD1,
    SA1,
    TAS1,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::NSW1,
        Region::VIC1,
        Region::QLD1,
        Region::SA1,
        Region::TAS1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::NSW1 => "NSW1",
            Region::VIC1 => "VIC1",
            Region::QLD1 => "QLD1",
            Region::SA1 => "SA1",
            Region::TAS1 => "TAS1",
        }
    }

    pub fn parse(s: &str) -> Option<Region> {
        match s.trim() {
            "NSW1" => Some(Region::NSW1),
            "VIC1" => Some(Region::VIC1),
            "QLD1" => Some(Region::QLD1),
            "SA1" => Some(Region::SA1),
            "TAS1" => Some(Region::TAS1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ten FCAS markets: raise/lower across five response speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FcasService {
    Raise1Sec,
    Lower1Sec,
    Raise6Sec,
    Lower6Sec,
    Raise60Sec,
    Lower60Sec,
    Raise5Min,
    Lower5Min,
    RaiseReg,
    LowerReg,
}

impl FcasService {
    pub const ALL: [FcasService; 10] = [
        FcasService::Raise1Sec,
        FcasService::Lower1Sec,
        FcasService::Raise6Sec,
        FcasService::Lower6Sec,
        FcasService::Raise60Sec,
        FcasService::Lower60Sec,
        FcasService::Raise5Min,
        FcasService::Lower5Min,
        FcasService::RaiseReg,
        FcasService::LowerReg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FcasService::Raise1Sec => "RAISE1SEC",
            FcasService::Lower1Sec => "LOWER1SEC",
            FcasService::Raise6Sec => "RAISE6SEC",
            FcasService::Lower6Sec => "LOWER6SEC",
            FcasService::Raise60Sec => "RAISE60SEC",
            FcasService::Lower60Sec => "LOWER60SEC",
            FcasService::Raise5Min => "RAISE5MIN",
            FcasService::Lower5Min => "LOWER5MIN",
            FcasService::RaiseReg => "RAISEREG",
            FcasService::LowerReg => "LOWERREG",
        }
    }

    pub fn parse(s: &str) -> Option<FcasService> {
        Self::ALL.iter().copied().find(|svc| svc.as_str() == s.trim())
    }
}

impl std::fmt::Display for FcasService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-service price + required MW carried on a dispatch price row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FcasLevel {
    pub price: f64,
    pub required_mw: f64,
}

/// One region's fully merged 5-minute dispatch outcome: the PRICE record
/// supplies energy and FCAS prices, the REGIONSUM record supplies demand,
/// generation, interchange, and required FCAS MW.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPriceRow {
    pub region: Region,
    pub settlement_ts: DateTime<Utc>,
    /// Regional reference price, $/MWh, clamped to the market cap/floor.
    pub rrp: f64,
    /// Regional override price (non-zero during administered pricing).
    pub rop: f64,
    /// True when the administered price cap applied this interval.
    pub apc_flag: bool,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
    pub fcas: BTreeMap<FcasService, FcasLevel>,
    pub price_status: Option<String>,
    pub last_changed: Option<DateTime<Utc>>,
}

/// REGIONSUM record before it is merged into [`DispatchPriceRow`].
#[derive(Debug, Clone)]
pub struct RegionSummaryRow {
    pub region: Region,
    pub settlement_ts: DateTime<Utc>,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
    pub fcas_required_mw: BTreeMap<FcasService, f64>,
}

/// Stored FCAS price point. Only rows with a non-zero price are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcasPriceRow {
    pub region: Region,
    pub service: FcasService,
    pub settlement_ts: DateTime<Utc>,
    pub price: f64,
    pub enablement_min: f64,
    pub enablement_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterconnectorFlowRow {
    pub interconnector_id: String,
    pub settlement_ts: DateTime<Utc>,
    pub from_region: String,
    pub to_region: String,
    pub metered_mw: f64,
    pub mw_flow: f64,
    pub mw_losses: f64,
    pub export_limit: f64,
    pub import_limit: f64,
    pub marginal_value: f64,
    pub violation_degree: f64,
}

/// A binding network constraint (marginal value > 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRow {
    pub constraint_id: String,
    pub settlement_ts: DateTime<Utc>,
    pub rhs: f64,
    pub marginal_value: f64,
    pub violation_degree: f64,
}

/// Per-unit dispatch target. Intervention is part of the key: one interval may
/// carry both a normal and an intervention solution for the same unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorDispatchRow {
    pub duid: String,
    pub settlement_ts: DateTime<Utc>,
    pub intervention: i64,
    pub initial_mw: f64,
    pub total_cleared_mw: f64,
    pub ramp_up_rate: f64,
    pub ramp_down_rate: f64,
    pub availability: f64,
    pub semi_dispatch_cap: bool,
    pub fcas_enabled_mw: BTreeMap<FcasService, f64>,
}

/// Raw SCADA telemetry point. Negative MW is a consuming unit (pumps, charging
/// batteries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScadaRow {
    pub duid: String,
    pub settlement_ts: DateTime<Utc>,
    pub scada_mw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Charging,
    Discharging,
    Standby,
}

/// Battery unit solution with the derived fields the dashboard needs. The
/// cleared MW sign encodes direction (negative = charging).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryDispatchRow {
    pub duid: String,
    pub settlement_ts: DateTime<Utc>,
    pub initial_mw: f64,
    pub total_cleared_mw: f64,
    pub availability: f64,
    pub charge_mw: f64,
    pub discharge_mw: f64,
    pub mode: BatteryMode,
    pub soc_percent: f64,
    pub energy_mwh: f64,
    pub fcas_enabled_mw: BTreeMap<FcasService, f64>,
    pub station_name: Option<String>,
    pub region: Option<Region>,
    pub nameplate_mw: Option<f64>,
    pub max_charge_mw: Option<f64>,
    pub max_discharge_mw: Option<f64>,
    pub participant: Option<String>,
}

/// 5-minute-ahead regional forecast, keyed by (run, interval, region).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P5minRegionForecast {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub region: Region,
    pub rrp: f64,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P5minUnitForecast {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub duid: String,
    pub energy_mw: f64,
    pub availability: f64,
}

/// 30-minute predispatch over the 2-day horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredispatchRegionRow {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub region: Region,
    pub rrp: f64,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredispatchUnitRow {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub duid: String,
    pub energy_mw: f64,
    pub availability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterconnectorForecast {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub interconnector_id: String,
    pub mw_flow: f64,
    pub export_limit: f64,
    pub import_limit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintForecast {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub constraint_id: String,
    pub rhs: f64,
    pub marginal_value: f64,
}

/// 7-day ST PASA adequacy outlook with percentile demand levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StpasaRegionRow {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub region: Region,
    pub demand_10: f64,
    pub demand_50: f64,
    pub demand_90: f64,
    pub aggregate_capacity: f64,
    pub surplus_capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StpasaUnitAvailability {
    pub run_ts: DateTime<Utc>,
    pub interval_ts: DateTime<Utc>,
    pub duid: String,
    pub pasa_availability: f64,
}

/// 30-minute settled trading price with the region sums merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPriceRow {
    pub region: Region,
    pub trading_ts: DateTime<Utc>,
    pub rrp: f64,
    pub total_demand: f64,
    pub available_generation: f64,
    pub net_interchange: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<PositionSide> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Some(PositionSide::Long),
            "SHORT" => Some(PositionSide::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

/// A user's paper position on regional spot price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub user_id: String,
    pub region: Region,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_ts: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub pnl: Option<f64>,
    pub status: PositionStatus,
}

/// Outcome of one validator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub run_ts: DateTime<Utc>,
}

/// The per-region slice of a live price snapshot pushed to the hub and the
/// hot cache. Wire names match the read API's row shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionPrice {
    pub region: Region,
    pub price: f64,
    #[serde(rename = "demand")]
    pub total_demand: f64,
    #[serde(rename = "generation")]
    pub available_generation: f64,
    pub net_interchange: f64,
    #[serde(rename = "settlement_date")]
    pub settlement_ts: DateTime<Utc>,
}

impl RegionPrice {
    pub fn from_dispatch(row: &DispatchPriceRow) -> Self {
        Self {
            region: row.region,
            price: row.rrp,
            total_demand: row.total_demand,
            available_generation: row.available_generation,
            net_interchange: row.net_interchange,
            settlement_ts: row.settlement_ts,
        }
    }
}

/// Everything a single DISPATCHIS bundle yields after the merge pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchBundle {
    pub prices: Vec<DispatchPriceRow>,
    pub fcas: Vec<FcasPriceRow>,
    pub interconnectors: Vec<InterconnectorFlowRow>,
    pub constraints: Vec<ConstraintRow>,
    pub units: Vec<GeneratorDispatchRow>,
}
