//! Read-side queries over listings, snapshots and derived tables.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::config::validation_ranges::{PPS_MAX, PPS_MIN, PRICE_MAX, PRICE_MIN};
use crate::db::models::{BaselineRow, ListingRow, ScoreRow, SignalRow, SnapshotRow};
use crate::error::Result;
use crate::types::{Baseline, Listing, PriceBand, PropertyType, ScoreComponents, Signal, Snapshot};

const LISTING_COLUMNS: &str =
    "id, property_type, status, list_price, town, sqft, dom, updated_at";

/// A (town, property type, price band) cell restricted to listings updated since `since_ns`.
#[derive(Debug, Clone, Copy)]
pub struct CellKey<'a> {
    pub town: &'a str,
    pub property_type: PropertyType,
    pub band: PriceBand,
    pub since_ns: i64,
}

/// Comparison cohort for the score path. `None` fields are not filtered on.
#[derive(Debug, Clone, Copy)]
pub struct CohortFilter<'a> {
    pub town: &'a str,
    pub property_type: Option<PropertyType>,
    /// Inclusive living-area window.
    pub sqft_range: Option<(f64, f64)>,
}

pub async fn get_listing(pool: &SqlitePool, id: &str) -> Result<Option<Listing>> {
    let row = sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Listing::from))
}

/// Distinct (town, property type) pairs, excluding empty towns.
pub async fn distinct_town_types(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT DISTINCT town, property_type
        FROM listings
        WHERE town IS NOT NULL AND town != '' AND property_type IS NOT NULL
        ORDER BY town, property_type
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn cell_listings(pool: &SqlitePool, cell: CellKey<'_>) -> Result<Vec<Listing>> {
    let (min, max) = cell.band.bounds();
    let rows = sqlx::query_as::<_, ListingRow>(&format!(
        r#"
        SELECT {LISTING_COLUMNS}
        FROM listings
        WHERE town = ?
          AND property_type = ?
          AND list_price >= ?
          AND (? IS NULL OR list_price < ?)
          AND updated_at >= ?
        "#
    ))
    .bind(cell.town)
    .bind(cell.property_type.as_str())
    .bind(min)
    .bind(max)
    .bind(max)
    .bind(cell.since_ns)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Listing::from).collect())
}

/// Counts (earlier, later) snapshot pairs of the same listing where the later
/// price is strictly lower, over every listing in the cell. A listing with
/// several successive cuts contributes one event per qualifying pair.
pub async fn count_price_cuts(pool: &SqlitePool, cell: CellKey<'_>) -> Result<i64> {
    let (min, max) = cell.band.bounds();
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM listing_snapshots s1
        JOIN listing_snapshots s2 ON s1.listing_id = s2.listing_id
        WHERE s1.snapshot_date < s2.snapshot_date
          AND s2.list_price < s1.list_price
          AND s1.listing_id IN (
              SELECT id FROM listings
              WHERE town = ?
                AND property_type = ?
                AND list_price >= ?
                AND (? IS NULL OR list_price < ?)
                AND updated_at >= ?
          )
        "#,
    )
    .bind(cell.town)
    .bind(cell.property_type.as_str())
    .bind(min)
    .bind(max)
    .bind(max)
    .bind(cell.since_ns)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// One page of listings eligible for signal detection (positive price, non-empty
/// town), ordered by id and starting strictly after `after_id`.
pub async fn signal_candidates(
    pool: &SqlitePool,
    after_id: Option<&str>,
    limit: i64,
) -> Result<Vec<Listing>> {
    let rows = sqlx::query_as::<_, ListingRow>(&format!(
        r#"
        SELECT {LISTING_COLUMNS}
        FROM listings
        WHERE list_price IS NOT NULL
          AND list_price > 0
          AND town IS NOT NULL
          AND town != ''
          AND (? IS NULL OR id > ?)
        ORDER BY id
        LIMIT ?
        "#
    ))
    .bind(after_id)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Listing::from).collect())
}

const BASELINE_COLUMNS: &str = "town, property_type, price_band, lookback_days, median_dom, \
     median_list_price, price_cut_rate, sample_size, computed_at";

pub async fn get_baseline(
    pool: &SqlitePool,
    town: &str,
    property_type: PropertyType,
    band: PriceBand,
    lookback_days: i64,
) -> Result<Option<Baseline>> {
    let row = sqlx::query_as::<_, BaselineRow>(&format!(
        r#"
        SELECT {BASELINE_COLUMNS}
        FROM baselines
        WHERE town = ? AND property_type = ? AND price_band = ? AND lookback_days = ?
        "#
    ))
    .bind(town)
    .bind(property_type.as_str())
    .bind(band.as_str())
    .bind(lookback_days)
    .fetch_optional(pool)
    .await?;
    row.map(Baseline::try_from).transpose()
}

pub async fn list_baselines(
    pool: &SqlitePool,
    town: Option<&str>,
    property_type: Option<PropertyType>,
) -> Result<Vec<Baseline>> {
    let property_type = property_type.map(|t| t.as_str());
    let rows = sqlx::query_as::<_, BaselineRow>(&format!(
        r#"
        SELECT {BASELINE_COLUMNS}
        FROM baselines
        WHERE (? IS NULL OR LOWER(town) = LOWER(?))
          AND (? IS NULL OR property_type = ?)
        ORDER BY town, property_type, price_band, lookback_days
        "#
    ))
    .bind(town)
    .bind(town)
    .bind(property_type)
    .bind(property_type)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Baseline::try_from).collect()
}

/// Most recent snapshots on or after `since`, newest first.
pub async fn recent_snapshots(
    pool: &SqlitePool,
    listing_id: &str,
    since: NaiveDate,
    limit: i64,
) -> Result<Vec<Snapshot>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT listing_id, snapshot_date, list_price, status, dom
        FROM listing_snapshots
        WHERE listing_id = ? AND snapshot_date >= ?
        ORDER BY snapshot_date DESC
        LIMIT ?
        "#,
    )
    .bind(listing_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Snapshot::from).collect())
}

/// Current signals for a listing, primary first, then by score.
pub async fn listing_signals(pool: &SqlitePool, listing_id: &str) -> Result<Vec<Signal>> {
    let rows = sqlx::query_as::<_, SignalRow>(
        r#"
        SELECT listing_id, signal_type, signal_score, is_primary, metadata
        FROM listing_signals
        WHERE listing_id = ?
        ORDER BY is_primary DESC, signal_score DESC, signal_type
        "#,
    )
    .bind(listing_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Signal::try_from).collect()
}

pub async fn listings_with_signals(pool: &SqlitePool) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT listing_id FROM listing_signals ORDER BY listing_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// (list_price, sqft) pairs of the cohort, already restricted to the
/// price and price-per-sqft sanity ranges.
pub async fn cohort_prices(pool: &SqlitePool, filter: CohortFilter<'_>) -> Result<Vec<(f64, f64)>> {
    let property_type = filter.property_type.map(|t| t.as_str());
    let (min_sqft, max_sqft) = match filter.sqft_range {
        Some((lo, hi)) => (Some(lo), Some(hi)),
        None => (None, None),
    };
    let rows = sqlx::query_as::<_, (f64, f64)>(
        r#"
        SELECT list_price, sqft
        FROM listings
        WHERE LOWER(town) = LOWER(?)
          AND (? IS NULL OR property_type = ?)
          AND list_price IS NOT NULL
          AND sqft IS NOT NULL
          AND (? IS NULL OR sqft >= ?)
          AND (? IS NULL OR sqft <= ?)
          AND list_price BETWEEN ? AND ?
          AND (list_price / NULLIF(sqft, 0)) BETWEEN ? AND ?
        "#,
    )
    .bind(filter.town)
    .bind(property_type)
    .bind(property_type)
    .bind(min_sqft)
    .bind(min_sqft)
    .bind(max_sqft)
    .bind(max_sqft)
    .bind(PRICE_MIN)
    .bind(PRICE_MAX)
    .bind(PPS_MIN)
    .bind(PPS_MAX)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_score(pool: &SqlitePool, listing_id: &str) -> Result<Option<ScoreComponents>> {
    let row = sqlx::query_as::<_, ScoreRow>(
        r#"
        SELECT score, pps_component, price_component, dom_component, signal_component,
               raw_score, median_price, median_sqft, median_pps
        FROM listing_scores
        WHERE listing_id = ?
        "#,
    )
    .bind(listing_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(ScoreComponents::from))
}
