use proptest::prelude::*;
use syncplot_common::Timestamp;
use syncplot_data_model::TimeSeries;
use syncplot_signal_core::signal::{magnitude, resample};
use syncplot_signal_core::{compute_offset, Interpolation};

const RATE: f64 = 100.0;
const REFERENCE_LEN: usize = 2000;
const MAX_SHIFT: usize = 300;

/// Three channels of Gaussian bumps at pseudo-random times plus slow drift.
fn bumpy_signal(seed: u64, len: usize) -> Vec<Vec<f64>> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };
    let bumps: Vec<[f64; 4]> = (0..24)
        .map(|_| [next() * len as f64 / RATE, next() * 2.0 + 0.5, next(), next()])
        .collect();

    (0..len)
        .map(|i| {
            let t = i as f64 / RATE;
            let mut row = vec![0.2 * (0.3 * t).sin(), 0.1 * (0.5 * t).cos(), 0.0];
            for [center, height, wx, wy] in &bumps {
                let g = height * (-(t - center).powi(2) / (2.0 * 0.08f64.powi(2))).exp();
                row[0] += g * wx;
                row[1] += g * wy;
                row[2] += g;
            }
            row
        })
        .collect()
}

fn to_series(rows: &[Vec<f64>]) -> TimeSeries {
    let index = (0..rows.len())
        .map(|i| Timestamp::from_secs_f64(i as f64 / RATE))
        .collect();
    TimeSeries::from_rows(index, vec!["x".into(), "y".into(), "z".into()], rows).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_recovers_known_shift(seed in any::<u64>(), shift in 1usize..MAX_SHIFT) {
        let reference = bumpy_signal(seed, REFERENCE_LEN);
        let target = reference[shift..shift + REFERENCE_LEN - MAX_SHIFT].to_vec();

        let offset = compute_offset(&to_series(&reference), &to_series(&target), false).unwrap();
        let offset_secs = offset.num_nanoseconds().unwrap() as f64 / 1e9;
        let expected = shift as f64 / RATE;
        prop_assert!(
            (offset_secs - expected).abs() <= 1.0 / RATE + 1e-9,
            "expected {expected}s, got {offset_secs}s"
        );
    }

    #[test]
    fn prop_resample_count_and_endpoints(
        len in 8usize..200,
        rate_in in 10u32..200,
        rate_out in 10u32..200,
    ) {
        let rows: Vec<Vec<f64>> = (0..len)
            .map(|i| {
                let t = i as f64 / rate_in as f64;
                vec![(2.0 * t).sin(), t]
            })
            .collect();
        let duration = (len - 1) as f64 / rate_in as f64;
        let expected = (duration * rate_out as f64).floor() as usize;
        prop_assume!(expected >= 1);

        let out = resample(&rows, rate_in as f64, rate_out as f64, Interpolation::Cubic).unwrap();
        prop_assert_eq!(out.len(), expected);
        prop_assert!((out[0][0] - rows[0][0]).abs() < 1e-9);
        if expected > 1 {
            prop_assert!((out[expected - 1][1] - rows[len - 1][1]).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_magnitude_is_euclidean(x in -1e3f64..1e3, y in -1e3f64..1e3, z in -1e3f64..1e3) {
        let m = magnitude(&[vec![x, y, z]]).unwrap()[0];
        prop_assert!((m * m - (x * x + y * y + z * z)).abs() <= 1e-6 * (1.0 + m * m));
    }
}

#[test]
fn test_negative_shift_when_target_starts_earlier() {
    let base = bumpy_signal(7, REFERENCE_LEN + 50);
    let reference = base[50..].to_vec();
    let target = base[..REFERENCE_LEN - MAX_SHIFT].to_vec();

    let offset = compute_offset(&to_series(&reference), &to_series(&target), false).unwrap();
    let offset_secs = offset.num_nanoseconds().unwrap() as f64 / 1e9;
    assert!((offset_secs + 0.5).abs() <= 1.0 / RATE + 1e-9, "got {offset_secs}");
}

#[test]
fn test_second_derivative_aligns_positions_to_accelerations() {
    // Reference: positions at 50 Hz. Target: accelerations at 100 Hz, 1 s later.
    let positions = bumpy_signal(11, 1000);
    let reference_rate = 50.0;
    let reference_index = (0..positions.len())
        .map(|i| Timestamp::from_secs_f64(i as f64 / reference_rate))
        .collect();
    let reference = TimeSeries::from_rows(
        reference_index,
        vec!["x".into(), "y".into(), "z".into()],
        &positions,
    )
    .unwrap();

    let first = syncplot_signal_core::signal::gradient(&positions).unwrap();
    let accelerations = syncplot_signal_core::signal::gradient(&first).unwrap();
    let upsampled = resample(&accelerations, reference_rate, RATE, Interpolation::Cubic).unwrap();
    let target = to_series(&upsampled[100..1500]);

    let offset = compute_offset(&reference, &target, true).unwrap();
    let offset_secs = offset.num_nanoseconds().unwrap() as f64 / 1e9;
    assert!((offset_secs - 1.0).abs() <= 2.0 / RATE + 1e-9, "got {offset_secs}");
}
