use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::config::RECENT_DROP_WINDOW_DAYS;
use crate::db::{store, writer};
use crate::detector::rules;
use crate::error::Result;
use crate::types::{now_ns, BatchReport, Listing, PriceBand};

/// Which listings a signal run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope {
    /// Every qualifying listing, fetched in keyset pages of `page_size`.
    All { page_size: i64 },
    /// At most this many listings, lowest ids first.
    Limit(i64),
}

/// Evaluates the signal rules for listings against the baselines written by
/// the last aggregation run with the same lookback window.
pub struct SignalDetector {
    pool: SqlitePool,
    lookback_days: i64,
}

impl SignalDetector {
    pub fn new(pool: SqlitePool, lookback_days: i64) -> Self {
        Self { pool, lookback_days }
    }

    /// `written` in the report counts signal rows; `attempted`, `skipped` and
    /// `failed` count listings.
    pub async fn compute_signals(&self, scope: SignalScope) -> Result<BatchReport> {
        let run_at_ns = now_ns();
        let drop_window_start = Utc::now().date_naive() - Duration::days(RECENT_DROP_WINDOW_DAYS);
        let mut report = BatchReport::default();

        let (page_size, single_page) = match scope {
            SignalScope::All { page_size } => (page_size.max(1), false),
            SignalScope::Limit(n) => (n.max(1), true),
        };

        let mut after_id: Option<String> = None;
        loop {
            let page = store::signal_candidates(&self.pool, after_id.as_deref(), page_size).await?;
            let page_len = page.len() as i64;

            for listing in &page {
                report.attempted += 1;
                match self.process_listing(listing, run_at_ns, drop_window_start).await {
                    Ok(Some(n)) => report.written += n as u64,
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        error!(listing_id = %listing.id, "[SIGNALS] listing failed: {e}");
                        report.failed += 1;
                    }
                }
            }

            after_id = page.last().map(|l| l.id.clone());
            if single_page || page_len < page_size || after_id.is_none() {
                break;
            }
        }

        info!(
            event = "SIGNALS_DONE",
            listings = report.attempted,
            signals = report.written,
            skipped = report.skipped,
            failed = report.failed,
            "[SIGNALS] computed {} signals over {} listings ({} without baseline, {} failed)",
            report.written,
            report.attempted,
            report.skipped,
            report.failed,
        );
        Ok(report)
    }

    /// Returns the number of signals written, or None when the listing's cell
    /// has no baseline. A skipped listing loses whatever signals it carried
    /// from earlier runs.
    async fn process_listing(
        &self,
        listing: &Listing,
        run_at_ns: i64,
        drop_window_start: chrono::NaiveDate,
    ) -> Result<Option<usize>> {
        let (Some(price), Some(town), Some(property_type)) =
            (listing.list_price, listing.town.as_deref(), listing.property_type)
        else {
            writer::replace_signals(&self.pool, &listing.id, &[], run_at_ns).await?;
            return Ok(None);
        };

        let band = PriceBand::from_price(price);
        let Some(baseline) =
            store::get_baseline(&self.pool, town, property_type, band, self.lookback_days).await?
        else {
            debug!(listing_id = %listing.id, band = %band, "[SIGNALS] no baseline for cell");
            writer::replace_signals(&self.pool, &listing.id, &[], run_at_ns).await?;
            return Ok(None);
        };

        let snapshots = store::recent_snapshots(&self.pool, &listing.id, drop_window_start, 2).await?;
        let drop = rules::recent_drop(&snapshots);

        let signals = rules::evaluate(listing, price, &baseline, drop.as_ref());
        writer::replace_signals(&self.pool, &listing.id, &signals, run_at_ns).await?;
        Ok(Some(signals.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::BaselineAggregator;
    use crate::db::fixtures::{insert_all, listing, snapshot};
    use crate::db::test_pool;
    use crate::types::{PropertyType, SignalType};

    /// Five comparable Newton single-families (median DOM 20, median price 400k)
    /// plus whatever subjects the test adds.
    async fn seeded(subjects: &[Listing]) -> SqlitePool {
        let pool = test_pool().await;
        let comps: Vec<Listing> = [(380_000.0, 10), (390_000.0, 15), (400_000.0, 20), (410_000.0, 25), (420_000.0, 30)]
            .iter()
            .enumerate()
            .map(|(i, (p, d))| listing(&format!("C{i}"), "Newton", PropertyType::SingleFamily, *p, *d))
            .collect();
        insert_all(&pool, &comps).await;
        insert_all(&pool, subjects).await;
        BaselineAggregator::new(pool.clone()).compute_baselines(180).await.unwrap();
        pool
    }

    async fn signal_rows(pool: &SqlitePool, listing_id: &str, signal_type: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM listing_signals WHERE listing_id = ? AND signal_type = ?")
            .bind(listing_id)
            .bind(signal_type)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stale_listing_gets_primary_signal() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 60);
        let pool = seeded(&[subject]).await;

        let report = SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::All { page_size: 2 })
            .await
            .unwrap();
        assert_eq!(report.attempted, 6);
        assert_eq!(report.failed, 0);

        let signals = store::listing_signals(&pool, "S1").await.unwrap();
        assert_eq!(signals[0].signal_type, SignalType::Stale);
        assert!(signals[0].is_primary);
        assert_eq!(signals.iter().filter(|s| s.is_primary).count(), 1);
    }

    #[tokio::test]
    async fn rerun_does_not_duplicate_rows() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 450_000.0, 60);
        let pool = seeded(&[subject]).await;
        let detector = SignalDetector::new(pool.clone(), 180);

        let first = detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        let second = detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        assert_eq!(first.written, second.written);
        assert_eq!(signal_rows(&pool, "S1", "stale").await, 1);
        assert_eq!(signal_rows(&pool, "S1", "likely_cut").await, 1);
    }

    #[tokio::test]
    async fn signals_that_stop_triggering_are_removed() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 60);
        let pool = seeded(&[subject.clone()]).await;
        let detector = SignalDetector::new(pool.clone(), 180);
        detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        assert_eq!(signal_rows(&pool, "S1", "stale").await, 1);

        let mut fresh = subject;
        fresh.dom = Some(18);
        insert_all(&pool, &[fresh]).await;
        detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        assert_eq!(signal_rows(&pool, "S1", "stale").await, 0);
    }

    #[tokio::test]
    async fn listing_without_baseline_is_skipped() {
        let pool = seeded(&[]).await;
        let lonely = listing("X1", "Acton", PropertyType::Condo, 400_000.0, 90);
        insert_all(&pool, &[lonely]).await;

        let report = SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::All { page_size: 100 })
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert!(store::listing_signals(&pool, "X1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_lookback_window_has_no_baseline() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 60);
        let pool = seeded(&[subject]).await;
        let report = SignalDetector::new(pool.clone(), 90)
            .compute_signals(SignalScope::All { page_size: 100 })
            .await
            .unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped, 6);
    }

    #[tokio::test]
    async fn recent_drop_from_snapshots() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 20);
        let pool = seeded(&[subject]).await;
        let today = Utc::now().date_naive();
        snapshot(&pool, "S1", today - Duration::days(1), 420_000.0).await;
        snapshot(&pool, "S1", today, 400_000.0).await;

        SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::All { page_size: 100 })
            .await
            .unwrap();
        let signals = store::listing_signals(&pool, "S1").await.unwrap();
        let drop = signals
            .iter()
            .find(|s| s.signal_type == SignalType::RecentDrop)
            .expect("recent_drop signal");
        // 20k / 420k = 4.76% -> 23.8
        assert_eq!(drop.score, 24);
        assert_eq!(drop.metadata["previous_price"], 420_000.0);
    }

    #[tokio::test]
    async fn snapshots_outside_window_are_ignored() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 20);
        let pool = seeded(&[subject]).await;
        let today = Utc::now().date_naive();
        snapshot(&pool, "S1", today - Duration::days(30), 500_000.0).await;
        snapshot(&pool, "S1", today, 400_000.0).await;

        SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::All { page_size: 100 })
            .await
            .unwrap();
        assert_eq!(signal_rows(&pool, "S1", "recent_drop").await, 0);
    }

    #[tokio::test]
    async fn losing_the_baseline_clears_old_signals() {
        let subject = listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 60);
        let pool = seeded(&[subject]).await;
        let detector = SignalDetector::new(pool.clone(), 180);
        detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        assert_eq!(signal_rows(&pool, "S1", "stale").await, 1);

        // Three comparables move up a band; the 0-500k cell drops to three listings.
        let moved: Vec<Listing> = (0..3)
            .map(|i| listing(&format!("C{i}"), "Newton", PropertyType::SingleFamily, 700_000.0, 20))
            .collect();
        insert_all(&pool, &moved).await;
        let baselines = BaselineAggregator::new(pool.clone()).compute_baselines(180).await.unwrap();
        assert_eq!(baselines.written, 0);

        let report = detector.compute_signals(SignalScope::All { page_size: 100 }).await.unwrap();
        assert_eq!(report.skipped, 6);
        assert!(store::listing_signals(&pool, "S1").await.unwrap().is_empty());
        assert!(store::listings_with_signals(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_listing_is_counted_and_others_continue() {
        let pool = seeded(&[
            listing("S1", "Newton", PropertyType::SingleFamily, 400_000.0, 60),
            listing("S2", "Newton", PropertyType::SingleFamily, 400_000.0, 60),
        ])
        .await;
        sqlx::query(
            "CREATE TRIGGER reject_s1 BEFORE INSERT ON listing_signals \
             WHEN NEW.listing_id = 'S1' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::All { page_size: 2 })
            .await
            .unwrap();
        assert_eq!(report.attempted, 7);
        assert_eq!(report.failed, 1);
        assert!(store::listing_signals(&pool, "S1").await.unwrap().is_empty());
        assert_eq!(signal_rows(&pool, "S2", "stale").await, 1);
    }

    #[tokio::test]
    async fn bounded_batch_stops_at_limit() {
        let pool = seeded(&[]).await;
        let report = SignalDetector::new(pool.clone(), 180)
            .compute_signals(SignalScope::Limit(3))
            .await
            .unwrap();
        assert_eq!(report.attempted, 3);
    }
}
