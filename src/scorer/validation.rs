//! Data-quality guards for the score path. Out-of-range or non-finite inputs
//! become `None`; nothing here returns an error.

use crate::config::validation_ranges::{
    PPS_MAX, PPS_MIN, PRICE_MAX, PRICE_MIN, SQFT_MAX, SQFT_MIN,
};

fn in_range(value: Option<f64>, min: f64, max: f64) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= min && *v <= max)
}

/// List price in [20k, 50M], rounded to whole dollars.
pub fn validate_price(price: Option<f64>) -> Option<f64> {
    in_range(price, PRICE_MIN, PRICE_MAX).map(f64::round)
}

/// Living area in [100, 20000] sqft, rounded.
pub fn validate_sqft(sqft: Option<f64>) -> Option<f64> {
    in_range(sqft, SQFT_MIN, SQFT_MAX).map(f64::round)
}

/// Price per sqft in [5, 5000].
pub fn validate_pps(pps: Option<f64>) -> Option<f64> {
    in_range(pps, PPS_MIN, PPS_MAX)
}
