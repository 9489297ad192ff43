use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Property type
// ---------------------------------------------------------------------------

/// Stored using the feed codes (`SF`, `CC`, `MF`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "SF")]
    SingleFamily,
    #[serde(rename = "CC")]
    Condo,
    #[serde(rename = "MF")]
    MultiFamily,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::SingleFamily => "SF",
            PropertyType::Condo => "CC",
            PropertyType::MultiFamily => "MF",
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SF" | "SINGLE-FAMILY" | "SINGLE_FAMILY" => Ok(PropertyType::SingleFamily),
            "CC" | "CONDO" => Ok(PropertyType::Condo),
            "MF" | "MULTI-FAMILY" | "MULTI_FAMILY" => Ok(PropertyType::MultiFamily),
            other => Err(format!("unknown property type '{other}'")),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Price band
// ---------------------------------------------------------------------------

/// Coarse list-price bucket used as a baseline grouping key.
/// Lower bound inclusive, upper bound exclusive; `Over2m` is unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceBand {
    #[serde(rename = "0-500k")]
    UpTo500k,
    #[serde(rename = "500k-1m")]
    From500kTo1m,
    #[serde(rename = "1m-2m")]
    From1mTo2m,
    #[serde(rename = "2m+")]
    Over2m,
}

impl PriceBand {
    pub const ALL: [PriceBand; 4] = [
        PriceBand::UpTo500k,
        PriceBand::From500kTo1m,
        PriceBand::From1mTo2m,
        PriceBand::Over2m,
    ];

    pub fn from_price(price: f64) -> Self {
        if price < 500_000.0 {
            PriceBand::UpTo500k
        } else if price < 1_000_000.0 {
            PriceBand::From500kTo1m
        } else if price < 2_000_000.0 {
            PriceBand::From1mTo2m
        } else {
            PriceBand::Over2m
        }
    }

    /// `[min, max)` bounds of the band. `None` means no upper bound.
    pub fn bounds(&self) -> (f64, Option<f64>) {
        match self {
            PriceBand::UpTo500k => (0.0, Some(500_000.0)),
            PriceBand::From500kTo1m => (500_000.0, Some(1_000_000.0)),
            PriceBand::From1mTo2m => (1_000_000.0, Some(2_000_000.0)),
            PriceBand::Over2m => (2_000_000.0, None),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceBand::UpTo500k => "0-500k",
            PriceBand::From500kTo1m => "500k-1m",
            PriceBand::From1mTo2m => "1m-2m",
            PriceBand::Over2m => "2m+",
        }
    }
}

impl FromStr for PriceBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceBand::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("unknown price band '{s}'"))
    }
}

impl std::fmt::Display for PriceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signal type
// ---------------------------------------------------------------------------

/// Declaration order is rule evaluation order, which also breaks score ties
/// when picking the primary signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Stale,
    RecentDrop,
    LikelyCut,
    Underpriced,
    Hot,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Stale => "stale",
            SignalType::RecentDrop => "recent_drop",
            SignalType::LikelyCut => "likely_cut",
            SignalType::Underpriced => "underpriced",
            SignalType::Hot => "hot",
        }
    }
}

impl FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stale" => Ok(SignalType::Stale),
            "recent_drop" => Ok(SignalType::RecentDrop),
            "likely_cut" => Ok(SignalType::LikelyCut),
            "underpriced" => Ok(SignalType::Underpriced),
            "hot" => Ok(SignalType::Hot),
            other => Err(format!("unknown signal type '{other}'")),
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Listings and snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub property_type: Option<PropertyType>,
    pub status: String,
    pub list_price: Option<f64>,
    pub town: Option<String>,
    /// Living area in square feet.
    pub sqft: Option<f64>,
    /// Days on market.
    pub dom: Option<i64>,
    /// Nanosecond UTC epoch of the last ingest write.
    pub updated_at_ns: i64,
}

impl Listing {
    pub fn is_active(&self) -> bool {
        self.status == "Active"
    }

    pub fn is_under_contract(&self) -> bool {
        self.status == "Pending" || self.status == "Under Agreement"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub listing_id: String,
    pub snapshot_date: NaiveDate,
    pub list_price: Option<f64>,
    pub status: Option<String>,
    pub dom: Option<i64>,
}

// ---------------------------------------------------------------------------
// Derived analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub town: String,
    pub property_type: PropertyType,
    pub price_band: PriceBand,
    pub lookback_days: i64,
    /// Lower-median DOM; None when no listing in the cell has DOM data.
    pub median_dom: Option<i64>,
    /// Lower-median list price.
    pub median_list_price: Option<f64>,
    /// Cut events divided by sample size.
    pub price_cut_rate: f64,
    pub sample_size: i64,
    pub computed_at_ns: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub listing_id: String,
    pub signal_type: SignalType,
    /// 0–100, rounded.
    pub score: i64,
    pub is_primary: bool,
    /// The numbers that justified the classification.
    pub metadata: serde_json::Value,
}

/// Medians of the comparison cohort used by the score path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortMedians {
    pub price: Option<f64>,
    pub sqft: Option<f64>,
    pub pps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub pps_component: i64,
    pub price_component: i64,
    pub dom_component: i64,
    pub signal_component: i64,
    /// Rounded sum of the unrounded components.
    pub raw_score: i64,
    /// `raw_score` clamped to 0–100.
    pub final_score: i64,
    pub medians: CohortMedians,
}

/// Outcome of a batch phase: how many units were tried and how they ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: u64,
    /// Rows written (baselines or signals).
    pub written: u64,
    /// Units skipped without error (small cell, missing baseline).
    pub skipped: u64,
    pub failed: u64,
}

pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_band_edges_are_lower_inclusive() {
        assert_eq!(PriceBand::from_price(0.0), PriceBand::UpTo500k);
        assert_eq!(PriceBand::from_price(499_999.0), PriceBand::UpTo500k);
        assert_eq!(PriceBand::from_price(500_000.0), PriceBand::From500kTo1m);
        assert_eq!(PriceBand::from_price(1_000_000.0), PriceBand::From1mTo2m);
        assert_eq!(PriceBand::from_price(2_000_000.0), PriceBand::Over2m);
        assert_eq!(PriceBand::from_price(90_000_000.0), PriceBand::Over2m);
    }

    #[test]
    fn price_band_bounds_agree_with_from_price() {
        for band in PriceBand::ALL {
            let (min, max) = band.bounds();
            assert_eq!(PriceBand::from_price(min), band);
            if let Some(max) = max {
                assert_ne!(PriceBand::from_price(max), band);
            }
        }
    }

    #[test]
    fn string_codes_parse_back() {
        assert_eq!("2m+".parse::<PriceBand>(), Ok(PriceBand::Over2m));
        assert_eq!("cc".parse::<PropertyType>(), Ok(PropertyType::Condo));
        assert_eq!("recent_drop".parse::<SignalType>(), Ok(SignalType::RecentDrop));
        assert!("townhouse".parse::<PropertyType>().is_err());
    }

    #[test]
    fn status_checks_are_exact() {
        let mut l = Listing {
            id: "1".into(),
            property_type: Some(PropertyType::SingleFamily),
            status: "Active".into(),
            list_price: Some(500_000.0),
            town: Some("Newton".into()),
            sqft: None,
            dom: None,
            updated_at_ns: 0,
        };
        assert!(l.is_active());
        l.status = "Under Agreement".into();
        assert!(l.is_under_contract());
        l.status = "active".into();
        assert!(!l.is_active());
    }
}
