//! Median helpers shared by the baseline and score paths.
//!
//! Baselines use the lower median (element at `floor(n/2)` of the sorted
//! values). The score cohort uses the interpolated median, matching a
//! `percentile_cont(0.5)` aggregate.

/// Element at index `floor(n/2)` after an ascending sort. Not averaged for even n.
pub fn lower_median<T: PartialOrd + Copy>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(sorted[sorted.len() / 2])
}

/// Continuous median: mean of the two middle elements when n is even.
pub fn interpolated_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_median_odd_count() {
        let prices = [300_000.0, 100_000.0, 500_000.0, 200_000.0, 400_000.0];
        assert_eq!(lower_median(&prices), Some(300_000.0));
    }

    #[test]
    fn lower_median_even_count_takes_upper_middle_index() {
        let prices = [400_000.0, 100_000.0, 300_000.0, 200_000.0];
        // floor(4/2) = index 2 of the sorted values
        assert_eq!(lower_median(&prices), Some(300_000.0));
    }

    #[test]
    fn lower_median_integers_and_empty() {
        assert_eq!(lower_median(&[12i64, 3, 40]), Some(12));
        assert_eq!(lower_median::<i64>(&[]), None);
    }

    #[test]
    fn interpolated_median_averages_middle_pair() {
        assert_eq!(interpolated_median(&[1.0, 4.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(interpolated_median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(interpolated_median(&[]), None);
    }
}
