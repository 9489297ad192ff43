use serde::Serialize;
use serde_json::json;

use crate::config::{DEFAULT_MEDIAN_DOM, RECENT_DROP_MIN_PCT};
use crate::types::{Baseline, Listing, Signal, SignalType, Snapshot};

/// Price move between the two latest snapshots in the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDrop {
    pub drop_amount: f64,
    pub drop_percentage: f64,
    pub previous_price: f64,
    pub current_price: f64,
}

/// Compares only the two newest snapshots (input is newest first). A larger
/// drop further back in the window is not considered.
pub fn recent_drop(snapshots: &[Snapshot]) -> Option<RecentDrop> {
    if snapshots.len() < 2 {
        return None;
    }
    let latest = snapshots[0].list_price?;
    let earlier = snapshots[1].list_price?;
    if earlier <= 0.0 || latest >= earlier {
        return None;
    }

    let drop_amount = earlier - latest;
    let drop_percentage = drop_amount / earlier * 100.0;
    (drop_percentage >= RECENT_DROP_MIN_PCT).then_some(RecentDrop {
        drop_amount,
        drop_percentage,
        previous_price: earlier,
        current_price: latest,
    })
}

/// Median DOM and price the rules compare against. Missing or zero baseline
/// values fall back to 21 days and to the listing's own price.
fn reference_values(baseline: &Baseline, price: f64) -> (f64, f64) {
    let median_dom = baseline
        .median_dom
        .filter(|d| *d > 0)
        .map(|d| d as f64)
        .unwrap_or(DEFAULT_MEDIAN_DOM);
    let median_price = baseline
        .median_list_price
        .filter(|p| *p > 0.0)
        .unwrap_or(price);
    (median_dom, median_price)
}

fn capped(score: f64) -> i64 {
    score.round().min(100.0) as i64
}

/// Runs the five rules independently and flags the highest score as primary.
/// Ties keep rule order (stale, recent_drop, likely_cut, underpriced, hot)
/// because the sort is stable. A missing DOM compares as zero days.
pub fn evaluate(
    listing: &Listing,
    price: f64,
    baseline: &Baseline,
    drop: Option<&RecentDrop>,
) -> Vec<Signal> {
    let (median_dom, median_price) = reference_values(baseline, price);
    let dom = listing.dom.unwrap_or(0) as f64;
    let mut signals = Vec::new();

    let mut push = |signal_type: SignalType, score: i64, metadata: serde_json::Value| {
        signals.push(Signal {
            listing_id: listing.id.clone(),
            signal_type,
            score,
            is_primary: false,
            metadata,
        });
    };

    if dom >= f64::max(21.0, 1.5 * median_dom) {
        let staleness = (dom - median_dom) / median_dom;
        push(
            SignalType::Stale,
            capped(staleness * 50.0 + 50.0),
            json!({ "dom": listing.dom, "median_dom": median_dom }),
        );
    }

    if let Some(drop) = drop {
        push(
            SignalType::RecentDrop,
            capped(drop.drop_percentage * 5.0),
            json!(drop),
        );
    }

    if listing.is_active() && dom >= 1.25 * median_dom && price >= 1.03 * median_price {
        let overprice_ratio = (price - median_price) / median_price;
        let dom_ratio = (dom - median_dom) / median_dom;
        push(
            SignalType::LikelyCut,
            capped((overprice_ratio + dom_ratio) * 30.0),
            json!({
                "dom": listing.dom,
                "median_dom": median_dom,
                "price_vs_median": overprice_ratio,
            }),
        );
    }

    if price <= 0.97 * median_price && dom <= median_dom {
        let underprice_ratio = (median_price - price) / median_price;
        push(
            SignalType::Underpriced,
            capped(underprice_ratio * 200.0),
            json!({ "list_price": price, "median_price": median_price }),
        );
    }

    if listing.is_under_contract() && dom <= f64::min(7.0, 0.5 * median_dom) {
        let speed_ratio = median_dom / dom.max(1.0);
        push(
            SignalType::Hot,
            capped(speed_ratio * 30.0),
            json!({ "dom": listing.dom, "median_dom": median_dom, "status": listing.status }),
        );
    }

    signals.sort_by(|a, b| b.score.cmp(&a.score));
    if let Some(first) = signals.first_mut() {
        first.is_primary = true;
    }
    signals
}
