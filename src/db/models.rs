/// Database row types for the schema in migrations/0001_initial_schema.sql.
/// Text-coded columns are parsed into domain enums on the way out.
use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::types::{Baseline, CohortMedians, Listing, ScoreComponents, Signal, Snapshot};

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
    pub id: String,
    pub property_type: Option<String>,
    pub status: String,
    pub list_price: Option<f64>,
    pub town: Option<String>,
    pub sqft: Option<f64>,
    pub dom: Option<i64>,
    pub updated_at: i64,
}

impl From<ListingRow> for Listing {
    fn from(r: ListingRow) -> Self {
        Listing {
            id: r.id,
            // Unrecognised codes drop out of every type-keyed cohort.
            property_type: r.property_type.and_then(|t| t.parse().ok()),
            status: r.status,
            list_price: r.list_price,
            town: r.town,
            sqft: r.sqft,
            dom: r.dom,
            updated_at_ns: r.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub listing_id: String,
    pub snapshot_date: NaiveDate,
    pub list_price: Option<f64>,
    pub status: Option<String>,
    pub dom: Option<i64>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(r: SnapshotRow) -> Self {
        Snapshot {
            listing_id: r.listing_id,
            snapshot_date: r.snapshot_date,
            list_price: r.list_price,
            status: r.status,
            dom: r.dom,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BaselineRow {
    pub town: String,
    pub property_type: String,
    pub price_band: String,
    pub lookback_days: i64,
    pub median_dom: Option<i64>,
    pub median_list_price: Option<f64>,
    pub price_cut_rate: f64,
    pub sample_size: i64,
    pub computed_at: i64,
}

impl TryFrom<BaselineRow> for Baseline {
    type Error = AppError;

    fn try_from(r: BaselineRow) -> Result<Self> {
        Ok(Baseline {
            property_type: r.property_type.parse().map_err(AppError::Decode)?,
            price_band: r.price_band.parse().map_err(AppError::Decode)?,
            town: r.town,
            lookback_days: r.lookback_days,
            median_dom: r.median_dom,
            median_list_price: r.median_list_price,
            price_cut_rate: r.price_cut_rate,
            sample_size: r.sample_size,
            computed_at_ns: r.computed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SignalRow {
    pub listing_id: String,
    pub signal_type: String,
    pub signal_score: i64,
    pub is_primary: bool,
    pub metadata: String,
}

impl TryFrom<SignalRow> for Signal {
    type Error = AppError;

    fn try_from(r: SignalRow) -> Result<Self> {
        Ok(Signal {
            signal_type: r.signal_type.parse().map_err(AppError::Decode)?,
            metadata: serde_json::from_str(&r.metadata)?,
            listing_id: r.listing_id,
            score: r.signal_score,
            is_primary: r.is_primary,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoreRow {
    pub score: i64,
    pub pps_component: i64,
    pub price_component: i64,
    pub dom_component: i64,
    pub signal_component: i64,
    pub raw_score: i64,
    pub median_price: Option<f64>,
    pub median_sqft: Option<f64>,
    pub median_pps: Option<f64>,
}

impl From<ScoreRow> for ScoreComponents {
    fn from(r: ScoreRow) -> Self {
        ScoreComponents {
            pps_component: r.pps_component,
            price_component: r.price_component,
            dom_component: r.dom_component,
            signal_component: r.signal_component,
            raw_score: r.raw_score,
            final_score: r.score,
            medians: CohortMedians {
                price: r.median_price,
                sqft: r.median_sqft,
                pps: r.median_pps,
            },
        }
    }
}
