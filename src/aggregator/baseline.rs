use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::config::MIN_BASELINE_SAMPLE;
use crate::db::store::{self, CellKey};
use crate::db::writer;
use crate::error::Result;
use crate::stats::lower_median;
use crate::types::{now_ns, BatchReport, Baseline, Listing, PriceBand, PropertyType};

pub const NS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Recomputes one baseline row per (town, property type, price band) cell
/// from listings updated inside the lookback window.
pub struct BaselineAggregator {
    pool: SqlitePool,
}

impl BaselineAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Walks every cell sequentially. A failing cell is logged and counted;
    /// the remaining cells still run. Only the initial cell enumeration is fatal.
    pub async fn compute_baselines(&self, lookback_days: i64) -> Result<BatchReport> {
        let run_at_ns = now_ns();
        let since_ns = run_at_ns - lookback_days * NS_PER_DAY;

        let combos = store::distinct_town_types(&self.pool).await?;
        info!(
            "[BASELINE] {} town/type combinations (lookback {}d)",
            combos.len(),
            lookback_days
        );

        let mut report = BatchReport::default();

        for (town, type_code) in &combos {
            let property_type = match type_code.parse::<PropertyType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!(town = %town, "[BASELINE] skipping combination: {e}");
                    continue;
                }
            };

            for band in PriceBand::ALL {
                report.attempted += 1;
                let cell = CellKey {
                    town: town.as_str(),
                    property_type,
                    band,
                    since_ns,
                };
                match self.compute_cell(cell, lookback_days, run_at_ns).await {
                    Ok(Some(b)) => {
                        debug!(
                            town = %b.town,
                            property_type = %b.property_type,
                            band = %b.price_band,
                            sample_size = b.sample_size,
                            "[BASELINE] cell written"
                        );
                        report.written += 1;
                    }
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        error!(
                            town = %town,
                            property_type = %property_type,
                            band = %band,
                            "[BASELINE] cell failed: {e}"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        // Cells whose town/type pair vanished from the store entirely are never
        // visited above. Sweep them only after a clean run so a transient failure
        // cannot erase a still-valid baseline.
        if report.failed == 0 {
            let pruned = writer::prune_baselines(&self.pool, lookback_days, run_at_ns).await?;
            if pruned > 0 {
                info!("[BASELINE] pruned {pruned} baselines not rewritten this run");
            }
        }

        info!(
            event = "BASELINES_DONE",
            attempted = report.attempted,
            written = report.written,
            skipped = report.skipped,
            failed = report.failed,
            "[BASELINE] computed {} baselines ({} cells below sample threshold, {} failed)",
            report.written,
            report.skipped,
            report.failed,
        );
        Ok(report)
    }

    async fn compute_cell(
        &self,
        cell: CellKey<'_>,
        lookback_days: i64,
        run_at_ns: i64,
    ) -> Result<Option<Baseline>> {
        let listings = store::cell_listings(&self.pool, cell).await?;

        if listings.len() < MIN_BASELINE_SAMPLE {
            writer::delete_baseline(&self.pool, cell.town, cell.property_type, cell.band, lookback_days)
                .await?;
            return Ok(None);
        }

        let cut_events = store::count_price_cuts(&self.pool, cell).await?;
        let baseline = summarize_cell(cell, &listings, cut_events, lookback_days, run_at_ns);
        writer::upsert_baseline(&self.pool, &baseline).await?;
        Ok(Some(baseline))
    }
}

/// Lower-median DOM and list price plus cut rate for a cell that already
/// met the sample threshold.
fn summarize_cell(
    cell: CellKey<'_>,
    listings: &[Listing],
    cut_events: i64,
    lookback_days: i64,
    run_at_ns: i64,
) -> Baseline {
    let doms: Vec<i64> = listings.iter().filter_map(|l| l.dom).collect();
    let prices: Vec<f64> = listings
        .iter()
        .filter_map(|l| l.list_price)
        .filter(|p| *p > 0.0)
        .collect();

    let sample_size = listings.len() as i64;
    let price_cut_rate = if sample_size > 0 {
        cut_events as f64 / sample_size as f64
    } else {
        0.0
    };

    Baseline {
        town: cell.town.to_string(),
        property_type: cell.property_type,
        price_band: cell.band,
        lookback_days,
        median_dom: lower_median(&doms),
        median_list_price: lower_median(&prices),
        price_cut_rate,
        sample_size,
        computed_at_ns: run_at_ns,
    }
}
