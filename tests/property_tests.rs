//! Property Tests
//!
//! Scaler, threshold and metric invariants over generated inputs.

use cpu_anomaly::{classify, derive_threshold, f1, ScalerState, StandardScaler};
use proptest::prelude::*;

/// Series with a guaranteed spread so the scaler never sees a degenerate feature.
fn spread_series() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1000.0f64..1000.0, 2..200).prop_map(|mut v| {
        v[0] = -2000.0;
        v[1] = 2000.0;
        v
    })
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_scaled_reference_is_standardised(values in spread_series()) {
        let mut scaler = StandardScaler::new(1);
        let scaled = scaler.fit_transform(&values).unwrap();
        let (mean, std) = mean_std(&scaled);
        prop_assert!(mean.abs() < 1e-9, "mean {}", mean);
        prop_assert!((std - 1.0).abs() < 1e-9, "std {}", std);
    }

    #[test]
    fn prop_scaler_fit_is_deterministic(values in spread_series()) {
        let a = ScalerState::fit(&values, 1).unwrap();
        let b = ScalerState::fit(&values, 1).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_threshold_monotone_in_multiplier(
        errors in prop::collection::vec(0.0f64..10.0, 1..100),
        probe in prop::collection::vec(0.0f64..20.0, 1..100),
        a in 0.0f64..6.0,
        b in 0.0f64..6.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let t_lo = derive_threshold(&errors, lo).unwrap();
        let t_hi = derive_threshold(&errors, hi).unwrap();
        prop_assert!(t_lo.value <= t_hi.value);

        let flagged = |labels: Vec<u8>| labels.iter().filter(|&&l| l == 1).count();
        prop_assert!(flagged(classify(&probe, &t_hi)) <= flagged(classify(&probe, &t_lo)));
    }

    #[test]
    fn prop_classifier_boundary_is_strict(errors in prop::collection::vec(0.001f64..10.0, 1..50)) {
        let t = derive_threshold(&errors, 3.0).unwrap();
        let above = f64::from_bits(t.value.to_bits() + 1);
        prop_assert_eq!(classify(&[t.value, above], &t), vec![0, 1]);
    }

    #[test]
    fn prop_f1_bounded_and_perfect_on_self(truth in prop::collection::vec(0u8..2, 1..100),
                                          pred in prop::collection::vec(0u8..2, 1..100)) {
        prop_assert_eq!(f1(&truth, &truth).unwrap(), 1.0);
        if truth.len() == pred.len() {
            let score = f1(&truth, &pred).unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
        } else {
            prop_assert!(f1(&truth, &pred).is_err());
        }
    }

    #[test]
    fn prop_f1_zero_when_all_wrong(truth in prop::collection::vec(0u8..2, 1..100)) {
        prop_assume!(truth.contains(&1));
        let inverted: Vec<u8> = truth.iter().map(|&l| 1 - l).collect();
        prop_assert_eq!(f1(&truth, &inverted).unwrap(), 0.0);
    }
}
