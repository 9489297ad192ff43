use futures_util::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::config::validation_ranges::SIZE_WINDOW;
use crate::db::store::{self, CohortFilter};
use crate::db::writer;
use crate::error::{AppError, Result};
use crate::scorer::validation::{validate_pps, validate_price, validate_sqft};
use crate::stats::interpolated_median;
use crate::types::{now_ns, BatchReport, CohortMedians, Listing, ScoreComponents};

/// Computes and persists the 0–100 opportunity score for single listings.
/// Independent of the baseline tables: cohort medians are queried per call.
#[derive(Clone)]
pub struct ScoreEngine {
    pool: SqlitePool,
}

impl ScoreEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bad numeric inputs are dropped, never raised; only storage errors fail.
    pub async fn compute_score(
        &self,
        listing: &Listing,
        has_primary_signal: bool,
        signal_types: &[String],
    ) -> Result<ScoreComponents> {
        let price = validate_price(listing.list_price);
        let sqft = validate_sqft(listing.sqft);
        let medians = self.cohort_medians(listing, sqft).await?;

        let components = compute_components(
            price,
            sqft,
            listing.dom,
            medians,
            has_primary_signal,
            signal_types,
        );
        writer::upsert_score(&self.pool, &listing.id, &components, now_ns()).await?;
        Ok(components)
    }

    /// Scores a stored listing using its current signals.
    pub async fn score_listing(&self, listing_id: &str) -> Result<ScoreComponents> {
        let listing = store::get_listing(&self.pool, listing_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("listing {listing_id}")))?;
        let signals = store::listing_signals(&self.pool, listing_id).await?;
        let has_primary = signals.iter().any(|s| s.is_primary);
        let types: Vec<String> = signals.iter().map(|s| s.signal_type.to_string()).collect();
        self.compute_score(&listing, has_primary, &types).await
    }

    pub async fn persisted_score(&self, listing_id: &str) -> Result<Option<ScoreComponents>> {
        store::get_score(&self.pool, listing_id).await
    }

    /// Rescores every listing that currently has signals, `concurrency` at a time.
    pub async fn backfill(&self, concurrency: usize) -> Result<BatchReport> {
        let ids = store::listings_with_signals(&self.pool).await?;
        let engine = self;

        let results: Vec<(String, Result<ScoreComponents>)> = stream::iter(ids)
            .map(|id| async move {
                let result = engine.score_listing(&id).await;
                (id, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (id, result) in results {
            report.attempted += 1;
            match result {
                Ok(_) => report.written += 1,
                Err(e) => {
                    error!(listing_id = %id, "[SCORE] rescoring failed: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            event = "SCORES_DONE",
            scored = report.written,
            failed = report.failed,
            "[SCORE] rescored {} listings with signals ({} failed)",
            report.written,
            report.failed,
        );
        Ok(report)
    }

    /// Same town, same type and ±25% living area first; if that cohort is
    /// empty, the whole town. No cohort at all yields empty medians.
    async fn cohort_medians(&self, listing: &Listing, sqft: Option<f64>) -> Result<CohortMedians> {
        let town = listing.town.as_deref().unwrap_or("");

        let narrow = match listing.property_type {
            Some(property_type) => {
                self.cohort(CohortFilter {
                    town,
                    property_type: Some(property_type),
                    sqft_range: sqft.map(size_window),
                })
                .await?
            }
            None => None,
        };

        let medians = match narrow {
            Some(m) => Some(m),
            None => {
                self.cohort(CohortFilter {
                    town,
                    property_type: None,
                    sqft_range: None,
                })
                .await?
            }
        };
        Ok(medians.unwrap_or_default())
    }

    async fn cohort(&self, filter: CohortFilter<'_>) -> Result<Option<CohortMedians>> {
        let rows = store::cohort_prices(&self.pool, filter).await?;
        Ok(medians_of(&rows))
    }
}

fn size_window(sqft: f64) -> (f64, f64) {
    (
        (sqft * (1.0 - SIZE_WINDOW)).floor(),
        (sqft * (1.0 + SIZE_WINDOW)).ceil(),
    )
}

/// None for an empty cohort.
fn medians_of(rows: &[(f64, f64)]) -> Option<CohortMedians> {
    if rows.is_empty() {
        return None;
    }
    let prices: Vec<f64> = rows.iter().map(|(p, _)| *p).collect();
    let sqfts: Vec<f64> = rows.iter().map(|(_, s)| *s).collect();
    let pps: Vec<f64> = rows.iter().map(|(p, s)| p / s).collect();
    Some(CohortMedians {
        price: interpolated_median(&prices),
        sqft: interpolated_median(&sqfts),
        pps: interpolated_median(&pps),
    })
}

fn deviation_pct(median: Option<f64>, value: Option<f64>) -> f64 {
    match (median, value) {
        (Some(m), Some(v)) if m != 0.0 => (m - v) / m * 100.0,
        _ => 0.0,
    }
}

/// Weighted components: price-per-sqft 50, price 25, DOM 10, signal 15.
/// Deviation components only reward a listing cheaper than its cohort.
pub fn compute_components(
    price: Option<f64>,
    sqft: Option<f64>,
    dom: Option<i64>,
    medians: CohortMedians,
    has_primary_signal: bool,
    signal_types: &[String],
) -> ScoreComponents {
    let listing_pps = match (price, sqft) {
        (Some(p), Some(s)) => validate_pps(Some(p / s)),
        _ => None,
    };

    let pps_component = deviation_pct(medians.pps, listing_pps).clamp(0.0, 50.0);
    let price_component = deviation_pct(medians.price, price).clamp(0.0, 25.0);

    let dom_component = match dom {
        Some(d) if d >= 90 => 10,
        Some(d) if d >= 45 => 5,
        _ => 0,
    };

    let signal_component = if has_primary_signal {
        15
    } else if signal_types
        .iter()
        .any(|t| t.contains("price_reduction") || t.contains("price-reduction"))
    {
        10
    } else {
        0
    };

    let raw_score =
        (pps_component + price_component + (dom_component + signal_component) as f64).round() as i64;

    ScoreComponents {
        pps_component: pps_component.round() as i64,
        price_component: price_component.round() as i64,
        dom_component,
        signal_component,
        raw_score,
        final_score: raw_score.clamp(0, 100),
        medians,
    }
}
