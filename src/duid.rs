//! Static registry of dispatchable units.
//!
//! Maps a DUID to its fuel type, station, nameplate capacity, region, and
//! participant so raw telemetry can be enriched without a database round
//! trip. The table is a representative slice of the registered fleet across
//! all five regions; the production list is longer but identical in shape.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::models::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelCategory {
    Coal,
    Gas,
    Hydro,
    Wind,
    Solar,
    Battery,
    Other,
}

impl FuelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelCategory::Coal => "coal",
            FuelCategory::Gas => "gas",
            FuelCategory::Hydro => "hydro",
            FuelCategory::Wind => "wind",
            FuelCategory::Solar => "solar",
            FuelCategory::Battery => "battery",
            FuelCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DuidRecord {
    pub duid: &'static str,
    pub station: &'static str,
    pub fuel_type: &'static str,
    pub category: FuelCategory,
    pub nameplate_mw: f64,
    pub region: Region,
    pub participant: &'static str,
}

use FuelCategory::*;
use Region::*;

macro_rules! unit {
    ($duid:literal, $station:literal, $fuel:literal, $cat:expr, $mw:literal, $region:expr, $participant:literal) => {
        DuidRecord {
            duid: $duid,
            station: $station,
            fuel_type: $fuel,
            category: $cat,
            nameplate_mw: $mw,
            region: $region,
            participant: $participant,
        }
    };
}

static REGISTRY: &[DuidRecord] = &[
    // NSW coal
    unit!("BW01", "Bayswater", "Black Coal", Coal, 660.0, NSW1, "AGL Macquarie"),
    unit!("BW02", "Bayswater", "Black Coal", Coal, 660.0, NSW1, "AGL Macquarie"),
    unit!("BW03", "Bayswater", "Black Coal", Coal, 660.0, NSW1, "AGL Macquarie"),
    unit!("BW04", "Bayswater", "Black Coal", Coal, 660.0, NSW1, "AGL Macquarie"),
    unit!("ER01", "Eraring", "Black Coal", Coal, 720.0, NSW1, "Origin Energy"),
    unit!("ER02", "Eraring", "Black Coal", Coal, 720.0, NSW1, "Origin Energy"),
    unit!("ER03", "Eraring", "Black Coal", Coal, 720.0, NSW1, "Origin Energy"),
    unit!("ER04", "Eraring", "Black Coal", Coal, 720.0, NSW1, "Origin Energy"),
    unit!("MP1", "Mt Piper", "Black Coal", Coal, 700.0, NSW1, "EnergyAustralia"),
    unit!("MP2", "Mt Piper", "Black Coal", Coal, 700.0, NSW1, "EnergyAustralia"),
    unit!("VP5", "Vales Point B", "Black Coal", Coal, 660.0, NSW1, "Delta Electricity"),
    unit!("VP6", "Vales Point B", "Black Coal", Coal, 660.0, NSW1, "Delta Electricity"),
    // VIC coal
    unit!("LYA1", "Loy Yang A", "Brown Coal", Coal, 560.0, VIC1, "AGL Loy Yang"),
    unit!("LYA2", "Loy Yang A", "Brown Coal", Coal, 530.0, VIC1, "AGL Loy Yang"),
    unit!("LYA3", "Loy Yang A", "Brown Coal", Coal, 560.0, VIC1, "AGL Loy Yang"),
    unit!("LYA4", "Loy Yang A", "Brown Coal", Coal, 560.0, VIC1, "AGL Loy Yang"),
    unit!("LOYYB1", "Loy Yang B", "Brown Coal", Coal, 535.0, VIC1, "Alinta Energy"),
    unit!("LOYYB2", "Loy Yang B", "Brown Coal", Coal, 580.0, VIC1, "Alinta Energy"),
    unit!("YWPS1", "Yallourn W", "Brown Coal", Coal, 360.0, VIC1, "EnergyAustralia"),
    unit!("YWPS2", "Yallourn W", "Brown Coal", Coal, 360.0, VIC1, "EnergyAustralia"),
    unit!("YWPS3", "Yallourn W", "Brown Coal", Coal, 380.0, VIC1, "EnergyAustralia"),
    unit!("YWPS4", "Yallourn W", "Brown Coal", Coal, 380.0, VIC1, "EnergyAustralia"),
    // QLD coal
    unit!("CPP_3", "Callide B", "Black Coal", Coal, 350.0, QLD1, "CS Energy"),
    unit!("CPP_4", "Callide C", "Black Coal", Coal, 420.0, QLD1, "CS Energy"),
    unit!("GSTONE1", "Gladstone", "Black Coal", Coal, 280.0, QLD1, "NRG Gladstone"),
    unit!("GSTONE2", "Gladstone", "Black Coal", Coal, 280.0, QLD1, "NRG Gladstone"),
    unit!("GSTONE3", "Gladstone", "Black Coal", Coal, 280.0, QLD1, "NRG Gladstone"),
    unit!("KPP_1", "Kogan Creek", "Black Coal", Coal, 744.0, QLD1, "CS Energy"),
    unit!("MPP_1", "Millmerran", "Black Coal", Coal, 426.0, QLD1, "Millmerran Power"),
    unit!("MPP_2", "Millmerran", "Black Coal", Coal, 426.0, QLD1, "Millmerran Power"),
    unit!("STAN-1", "Stanwell", "Black Coal", Coal, 365.0, QLD1, "Stanwell"),
    unit!("STAN-2", "Stanwell", "Black Coal", Coal, 365.0, QLD1, "Stanwell"),
    unit!("TARONG#1", "Tarong", "Black Coal", Coal, 350.0, QLD1, "Stanwell"),
    unit!("TARONG#2", "Tarong", "Black Coal", Coal, 350.0, QLD1, "Stanwell"),
    unit!("TNPS1", "Tarong North", "Black Coal", Coal, 443.0, QLD1, "Stanwell"),
    // Gas
    unit!("TALWA1", "Tallawarra", "Natural Gas", Gas, 440.0, NSW1, "EnergyAustralia"),
    unit!("URANQ11", "Uranquinty", "Natural Gas", Gas, 166.0, NSW1, "Origin Energy"),
    unit!("URANQ12", "Uranquinty", "Natural Gas", Gas, 166.0, NSW1, "Origin Energy"),
    unit!("CG1", "Colongra", "Natural Gas", Gas, 181.0, NSW1, "Snowy Hydro"),
    unit!("CG2", "Colongra", "Natural Gas", Gas, 181.0, NSW1, "Snowy Hydro"),
    unit!("MORTLK11", "Mortlake", "Natural Gas", Gas, 283.0, VIC1, "Origin Energy"),
    unit!("MORTLK12", "Mortlake", "Natural Gas", Gas, 283.0, VIC1, "Origin Energy"),
    unit!("NPS1", "Newport", "Natural Gas", Gas, 500.0, VIC1, "EnergyAustralia"),
    unit!("JLA01", "Jeeralang A", "Natural Gas", Gas, 53.0, VIC1, "EnergyAustralia"),
    unit!("LAVNORTH", "Laverton North", "Natural Gas", Gas, 320.0, VIC1, "Snowy Hydro"),
    unit!("TORRB1", "Torrens Island B", "Natural Gas", Gas, 200.0, SA1, "AGL SA"),
    unit!("TORRB2", "Torrens Island B", "Natural Gas", Gas, 200.0, SA1, "AGL SA"),
    unit!("TORRB3", "Torrens Island B", "Natural Gas", Gas, 200.0, SA1, "AGL SA"),
    unit!("TORRB4", "Torrens Island B", "Natural Gas", Gas, 200.0, SA1, "AGL SA"),
    unit!("PPCCGT", "Pelican Point", "Natural Gas", Gas, 478.0, SA1, "Engie"),
    unit!("QPS1", "Quarantine", "Natural Gas", Gas, 24.0, SA1, "Origin Energy"),
    unit!("QPS5", "Quarantine", "Natural Gas", Gas, 128.0, SA1, "Origin Energy"),
    unit!("BRAEMAR1", "Braemar", "Natural Gas", Gas, 173.0, QLD1, "Arrow Energy"),
    unit!("BRAEMAR2", "Braemar", "Natural Gas", Gas, 173.0, QLD1, "Arrow Energy"),
    unit!("DDPS1", "Darling Downs", "Natural Gas", Gas, 644.0, QLD1, "Origin Energy"),
    unit!("ROMA_7", "Roma", "Natural Gas", Gas, 40.0, QLD1, "Origin Energy"),
    unit!("SWAN_E", "Swanbank E", "Natural Gas", Gas, 385.0, QLD1, "CleanCo"),
    unit!("TVCC201", "Tamar Valley", "Natural Gas", Gas, 208.0, TAS1, "Hydro Tasmania"),
    // Hydro
    unit!("TUMUT3", "Tumut 3", "Hydro", Hydro, 1800.0, NSW1, "Snowy Hydro"),
    unit!("UPPTUMUT", "Upper Tumut", "Hydro", Hydro, 616.0, NSW1, "Snowy Hydro"),
    unit!("BLOWERNG", "Blowering", "Hydro", Hydro, 80.0, NSW1, "Snowy Hydro"),
    unit!("GUTHEGA", "Guthega", "Hydro", Hydro, 60.0, NSW1, "Snowy Hydro"),
    unit!("MURRAY", "Murray 1 and 2", "Hydro", Hydro, 1500.0, VIC1, "Snowy Hydro"),
    unit!("DARTM1", "Dartmouth", "Hydro", Hydro, 185.0, VIC1, "AGL Hydro"),
    unit!("EILDON1", "Eildon", "Hydro", Hydro, 60.0, VIC1, "AGL Hydro"),
    unit!("EILDON2", "Eildon", "Hydro", Hydro, 60.0, VIC1, "AGL Hydro"),
    unit!("WKIEWA1", "West Kiewa", "Hydro", Hydro, 34.0, VIC1, "AGL Hydro"),
    unit!("BARRON-1", "Barron Gorge", "Hydro", Hydro, 33.0, QLD1, "CleanCo"),
    unit!("KAREEYA1", "Kareeya", "Hydro", Hydro, 21.6, QLD1, "CleanCo"),
    unit!("W/HOE#1", "Wivenhoe", "Hydro", Hydro, 285.0, QLD1, "CS Energy"),
    unit!("W/HOE#2", "Wivenhoe", "Hydro", Hydro, 285.0, QLD1, "CS Energy"),
    unit!("GORDON", "Gordon", "Hydro", Hydro, 432.0, TAS1, "Hydro Tasmania"),
    unit!("POAT110", "Poatina", "Hydro", Hydro, 100.0, TAS1, "Hydro Tasmania"),
    unit!("POAT220", "Poatina", "Hydro", Hydro, 200.0, TAS1, "Hydro Tasmania"),
    unit!("REECE1", "Reece", "Hydro", Hydro, 119.0, TAS1, "Hydro Tasmania"),
    unit!("REECE2", "Reece", "Hydro", Hydro, 119.0, TAS1, "Hydro Tasmania"),
    unit!("JBUTTERS", "John Butters", "Hydro", Hydro, 144.0, TAS1, "Hydro Tasmania"),
    unit!("TREVALLN", "Trevallyn", "Hydro", Hydro, 96.0, TAS1, "Hydro Tasmania"),
    unit!("CETHANA", "Cethana", "Hydro", Hydro, 85.0, TAS1, "Hydro Tasmania"),
    // Wind
    unit!("SAPHWF1", "Sapphire", "Wind", Wind, 270.0, NSW1, "CWP Renewables"),
    unit!("BOCORWF1", "Boco Rock", "Wind", Wind, 113.0, NSW1, "EGCO"),
    unit!("GULLRWF1", "Gullen Range", "Wind", Wind, 165.5, NSW1, "Goldwind"),
    unit!("TARALGA1", "Taralga", "Wind", Wind, 106.8, NSW1, "Pacific Hydro"),
    unit!("MACARTH1", "Macarthur", "Wind", Wind, 420.0, VIC1, "AGL"),
    unit!("ARWF1", "Ararat", "Wind", Wind, 241.0, VIC1, "Ararat Wind Farm"),
    unit!("CROWLWF1", "Crowlands", "Wind", Wind, 79.9, VIC1, "Pacific Hydro"),
    unit!("MTGELWF1", "Mt Gellibrand", "Wind", Wind, 132.0, VIC1, "Acciona"),
    unit!("OAKLAND1", "Oaklands Hill", "Wind", Wind, 67.2, VIC1, "AGL"),
    unit!("SALTCRK1", "Salt Creek", "Wind", Wind, 54.0, VIC1, "Tilt Renewables"),
    unit!("CHALLHWF", "Challicum Hills", "Wind", Wind, 52.5, VIC1, "Pacific Hydro"),
    unit!("YAMBUKWF", "Yambuk", "Wind", Wind, 30.0, VIC1, "Pacific Hydro"),
    unit!("HALLWF1", "Hallett 1", "Wind", Wind, 94.5, SA1, "AGL"),
    unit!("HALLWF2", "Hallett 2", "Wind", Wind, 71.4, SA1, "AGL"),
    unit!("LKBONNY2", "Lake Bonney 2", "Wind", Wind, 159.0, SA1, "Infigen"),
    unit!("LKBONNY3", "Lake Bonney 3", "Wind", Wind, 39.0, SA1, "Infigen"),
    unit!("SNOWTWN1", "Snowtown", "Wind", Wind, 98.7, SA1, "Tilt Renewables"),
    unit!("SNOWNTH1", "Snowtown North", "Wind", Wind, 144.0, SA1, "Tilt Renewables"),
    unit!("SNOWSTH1", "Snowtown South", "Wind", Wind, 126.0, SA1, "Tilt Renewables"),
    unit!("WATERLWF", "Waterloo", "Wind", Wind, 111.0, SA1, "Palisade"),
    unit!("NBHWF1", "North Brown Hill", "Wind", Wind, 132.3, SA1, "AGL"),
    unit!("COOPGWF1", "Coopers Gap", "Wind", Wind, 453.0, QLD1, "AGL"),
    unit!("MEWF1", "Mt Emerald", "Wind", Wind, 180.5, QLD1, "Ratch Australia"),
    unit!("WOOLNTH1", "Woolnorth", "Wind", Wind, 140.0, TAS1, "Hydro Tasmania"),
    unit!("MUSSELR1", "Musselroe", "Wind", Wind, 168.0, TAS1, "Hydro Tasmania"),
    unit!("GRANWF1", "Granville Harbour", "Wind", Wind, 111.6, TAS1, "Palisade"),
    // Solar
    unit!("NYNGAN1", "Nyngan", "Solar", Solar, 102.0, NSW1, "AGL"),
    unit!("BROKENH1", "Broken Hill", "Solar", Solar, 53.0, NSW1, "AGL"),
    unit!("MOREESF1", "Moree", "Solar", Solar, 56.0, NSW1, "FRV"),
    unit!("COLEASF1", "Coleambally", "Solar", Solar, 150.3, NSW1, "Neoen"),
    unit!("DARLSF1", "Darlington Point", "Solar", Solar, 275.0, NSW1, "Edify"),
    unit!("GANNSF1", "Gannawarra", "Solar", Solar, 50.0, VIC1, "Edify"),
    unit!("KARSF1", "Karadoc", "Solar", Solar, 112.0, VIC1, "BayWa"),
    unit!("WEMENSF1", "Wemen", "Solar", Solar, 97.5, VIC1, "Wirsol"),
    unit!("BNGSF1", "Bungala One", "Solar", Solar, 110.0, SA1, "Enel"),
    unit!("BNGSF2", "Bungala Two", "Solar", Solar, 110.0, SA1, "Enel"),
    unit!("TB2SF1", "Tailem Bend", "Solar", Solar, 95.0, SA1, "Vena Energy"),
    unit!("DAYDSF1", "Daydream", "Solar", Solar, 150.0, QLD1, "Edify"),
    unit!("HAYMSF1", "Hayman", "Solar", Solar, 50.0, QLD1, "Edify"),
    unit!("CLARESF1", "Clare", "Solar", Solar, 100.0, QLD1, "FRV"),
    unit!("SMCSF1", "Sun Metals", "Solar", Solar, 124.0, QLD1, "Sun Metals"),
    unit!("RUGBYR1", "Rugby Run", "Solar", Solar, 65.0, QLD1, "Adani"),
    unit!("HAUGHT11", "Haughton", "Solar", Solar, 100.0, QLD1, "Pacific Hydro"),
    // Batteries (gen/load pairs share a station)
    unit!("HPRG1", "Hornsdale Power Reserve", "Battery Storage", Battery, 150.0, SA1, "Neoen"),
    unit!("HPRL1", "Hornsdale Power Reserve", "Battery Storage", Battery, 150.0, SA1, "Neoen"),
    unit!("DALNTH1", "Dalrymple North", "Battery Storage", Battery, 30.0, SA1, "ElectraNet"),
    unit!("DALNTHL1", "Dalrymple North", "Battery Storage", Battery, 30.0, SA1, "ElectraNet"),
    unit!("LBBG1", "Lake Bonney BESS", "Battery Storage", Battery, 25.0, SA1, "Infigen"),
    unit!("LBBL1", "Lake Bonney BESS", "Battery Storage", Battery, 25.0, SA1, "Infigen"),
    unit!("TIBG1", "Torrens Island BESS", "Battery Storage", Battery, 250.0, SA1, "AGL SA"),
    unit!("TIBL1", "Torrens Island BESS", "Battery Storage", Battery, 250.0, SA1, "AGL SA"),
    unit!("VBBG1", "Victorian Big Battery", "Battery Storage", Battery, 300.0, VIC1, "Neoen"),
    unit!("VBBL1", "Victorian Big Battery", "Battery Storage", Battery, 300.0, VIC1, "Neoen"),
    unit!("GANNBG1", "Gannawarra ESS", "Battery Storage", Battery, 25.0, VIC1, "Edify"),
    unit!("GANNBL1", "Gannawarra ESS", "Battery Storage", Battery, 25.0, VIC1, "Edify"),
    unit!("BALBG1", "Ballarat ESS", "Battery Storage", Battery, 30.0, VIC1, "AusNet"),
    unit!("BALBL1", "Ballarat ESS", "Battery Storage", Battery, 30.0, VIC1, "AusNet"),
    unit!("WALGRVG1", "Wallgrove", "Battery Storage", Battery, 50.0, NSW1, "Transgrid"),
    unit!("WALGRVL1", "Wallgrove", "Battery Storage", Battery, 50.0, NSW1, "Transgrid"),
    unit!("RIVNBG1", "Riverina", "Battery Storage", Battery, 60.0, NSW1, "Edify"),
    unit!("RIVNBL1", "Riverina", "Battery Storage", Battery, 60.0, NSW1, "Edify"),
    unit!("WANDBG1", "Wandoan South", "Battery Storage", Battery, 100.0, QLD1, "Vena Energy"),
    unit!("WANDBL1", "Wandoan South", "Battery Storage", Battery, 100.0, QLD1, "Vena Energy"),
];

fn index() -> &'static HashMap<&'static str, &'static DuidRecord> {
    static INDEX: OnceLock<HashMap<&'static str, &'static DuidRecord>> = OnceLock::new();
    INDEX.get_or_init(|| REGISTRY.iter().map(|r| (r.duid, r)).collect())
}

/// Pure lookup by unit id. `None` for unregistered units.
pub fn lookup(duid: &str) -> Option<&'static DuidRecord> {
    index().get(duid.trim()).copied()
}

/// All registered battery units (both gen and load sides).
pub fn battery_units() -> impl Iterator<Item = &'static DuidRecord> {
    REGISTRY
        .iter()
        .filter(|r| r.category == FuelCategory::Battery)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_units() {
        let bw = lookup("BW01").unwrap();
        assert_eq!(bw.station, "Bayswater");
        assert_eq!(bw.category, FuelCategory::Coal);
        assert_eq!(bw.region, Region::NSW1);

        let hpr = lookup("HPRG1").unwrap();
        assert_eq!(hpr.category, FuelCategory::Battery);
        assert_eq!(hpr.region, Region::SA1);
    }

    #[test]
    fn lookup_unknown_is_none() {
        assert!(lookup("NOTAUNIT1").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn duids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for rec in REGISTRY {
            assert!(seen.insert(rec.duid), "duplicate duid {}", rec.duid);
        }
    }

    #[test]
    fn battery_units_cover_multiple_regions() {
        let regions: std::collections::HashSet<_> =
            battery_units().map(|r| r.region).collect();
        assert!(regions.len() >= 3);
    }
}
