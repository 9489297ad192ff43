//! Idempotent upserts. Every write is keyed so re-running a phase over
//! unchanged inputs rewrites rows in place instead of adding new ones.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::{Baseline, Listing, PriceBand, PropertyType, ScoreComponents, Signal, Snapshot};

/// Ingest-side upsert of current listing attributes.
pub async fn upsert_listing(pool: &SqlitePool, l: &Listing) -> Result<()> {
    let property_type = l.property_type.map(|t| t.as_str());
    sqlx::query(
        r#"
        INSERT INTO listings (id, property_type, status, list_price, town, sqft, dom, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            property_type = excluded.property_type,
            status = excluded.status,
            list_price = excluded.list_price,
            town = excluded.town,
            sqft = excluded.sqft,
            dom = excluded.dom,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&l.id)
    .bind(property_type)
    .bind(&l.status)
    .bind(l.list_price)
    .bind(&l.town)
    .bind(l.sqft)
    .bind(l.dom)
    .bind(l.updated_at_ns)
    .execute(pool)
    .await?;
    Ok(())
}

/// Ingest-side daily snapshot. A second write on the same day replaces the first.
pub async fn record_snapshot(pool: &SqlitePool, s: &Snapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO listing_snapshots (listing_id, snapshot_date, list_price, status, dom)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(listing_id, snapshot_date) DO UPDATE SET
            list_price = excluded.list_price,
            status = excluded.status,
            dom = excluded.dom
        "#,
    )
    .bind(&s.listing_id)
    .bind(s.snapshot_date)
    .bind(s.list_price)
    .bind(&s.status)
    .bind(s.dom)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_baseline(pool: &SqlitePool, b: &Baseline) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO baselines (
            town, property_type, price_band, lookback_days,
            median_dom, median_list_price, price_cut_rate, sample_size, computed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(town, property_type, price_band, lookback_days) DO UPDATE SET
            median_dom = excluded.median_dom,
            median_list_price = excluded.median_list_price,
            price_cut_rate = excluded.price_cut_rate,
            sample_size = excluded.sample_size,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(&b.town)
    .bind(b.property_type.as_str())
    .bind(b.price_band.as_str())
    .bind(b.lookback_days)
    .bind(b.median_dom)
    .bind(b.median_list_price)
    .bind(b.price_cut_rate)
    .bind(b.sample_size)
    .bind(b.computed_at_ns)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upserts the listing's freshly evaluated signals keyed by (listing, type) and
/// drops any of its rows that this evaluation did not produce, so the listing
/// never keeps a stale primary flag from an earlier run.
pub async fn replace_signals(
    pool: &SqlitePool,
    listing_id: &str,
    signals: &[Signal],
    computed_at_ns: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    for s in signals {
        let metadata = serde_json::to_string(&s.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO listing_signals (
                listing_id, signal_type, signal_score, is_primary, metadata, computed_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(listing_id, signal_type) DO UPDATE SET
                signal_score = excluded.signal_score,
                is_primary = excluded.is_primary,
                metadata = excluded.metadata,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(&s.listing_id)
        .bind(s.signal_type.as_str())
        .bind(s.score)
        .bind(s.is_primary)
        .bind(metadata)
        .bind(computed_at_ns)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM listing_signals WHERE listing_id = ? AND computed_at < ?")
        .bind(listing_id)
        .bind(computed_at_ns)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn upsert_score(
    pool: &SqlitePool,
    listing_id: &str,
    c: &ScoreComponents,
    computed_at_ns: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO listing_scores (
            listing_id, score, pps_component, price_component, dom_component,
            signal_component, raw_score, median_price, median_sqft, median_pps, computed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(listing_id) DO UPDATE SET
            score = excluded.score,
            pps_component = excluded.pps_component,
            price_component = excluded.price_component,
            dom_component = excluded.dom_component,
            signal_component = excluded.signal_component,
            raw_score = excluded.raw_score,
            median_price = excluded.median_price,
            median_sqft = excluded.median_sqft,
            median_pps = excluded.median_pps,
            computed_at = excluded.computed_at
        "#,
    )
    .bind(listing_id)
    .bind(c.final_score)
    .bind(c.pps_component)
    .bind(c.price_component)
    .bind(c.dom_component)
    .bind(c.signal_component)
    .bind(c.raw_score)
    .bind(c.medians.price)
    .bind(c.medians.sqft)
    .bind(c.medians.pps)
    .bind(computed_at_ns)
    .execute(pool)
    .await?;
    Ok(())
}

/// Removes the baseline for a cell that no longer has enough inventory.
pub async fn delete_baseline(
    pool: &SqlitePool,
    town: &str,
    property_type: PropertyType,
    band: PriceBand,
    lookback_days: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM baselines
        WHERE town = ? AND property_type = ? AND price_band = ? AND lookback_days = ?
        "#,
    )
    .bind(town)
    .bind(property_type.as_str())
    .bind(band.as_str())
    .bind(lookback_days)
    .execute(pool)
    .await?;
    Ok(())
}

/// Drops baselines for this lookback that the run stamped at `run_at_ns` did not rewrite.
pub async fn prune_baselines(pool: &SqlitePool, lookback_days: i64, run_at_ns: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM baselines WHERE lookback_days = ? AND computed_at < ?")
        .bind(lookback_days)
        .bind(run_at_ns)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
