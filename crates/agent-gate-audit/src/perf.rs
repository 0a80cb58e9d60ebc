/// Throughput in assets per second; 0 when either input is not positive.
#[must_use]
pub fn assets_per_second(asset_count: usize, duration_ms: f64) -> f64 {
    if asset_count == 0 || duration_ms <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = asset_count as f64;
    count * 1000.0 / duration_ms
}

/// Nearest-rank percentile of `samples`, with `percentile` clamped to 0..=100.
#[must_use]
pub fn percentile_nearest_rank(samples: &[f64], percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let clamped = percentile.clamp(0.0, 100.0);
    if clamped <= 0.0 {
        return sorted[0];
    }

    #[allow(clippy::cast_precision_loss)]
    let len = sorted.len() as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = ((clamped / 100.0) * len).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn assets_per_second_guards_non_positive_inputs() {
        assert!((assets_per_second(500, 250.0) - 2000.0).abs() < 1e-9);
        assert!(assets_per_second(0, 250.0).abs() < f64::EPSILON);
        assert!(assets_per_second(10, 0.0).abs() < f64::EPSILON);
        assert!(assets_per_second(10, -3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nearest_rank_examples() {
        let samples = [15.0, 20.0, 35.0, 40.0, 50.0];
        assert!(percentile_nearest_rank(&[], 50.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 0.0) - 15.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 30.0) - 20.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 40.0) - 20.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 50.0) - 35.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 100.0) - 50.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&samples, 250.0) - 50.0).abs() < f64::EPSILON);
        assert!((percentile_nearest_rank(&[40.0, 10.0], -5.0) - 10.0).abs() < f64::EPSILON);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_percentile_is_a_sample_within_bounds(
            samples in prop::collection::vec(0.0f64..10_000.0, 1..40),
            percentile in -20.0f64..140.0,
        ) {
            let value = percentile_nearest_rank(&samples, percentile);
            prop_assert!(samples.iter().any(|sample| (sample - value).abs() < f64::EPSILON));
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(value >= min && value <= max);
        }
    }
}
