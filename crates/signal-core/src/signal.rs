//! Signal primitives used by the synchronizer.
//!
//! Multi-channel signals are row-major: `rows[sample][channel]`.

use crate::interpolate::{Interpolation, Interpolator};
use syncplot_common::{SyncplotError, SyncplotResult, Timestamp};

fn channel_count(rows: &[Vec<f64>]) -> SyncplotResult<usize> {
    let first = rows
        .first()
        .ok_or_else(|| SyncplotError::data("signal is empty"))?;
    let width = first.len();
    if width == 0 {
        return Err(SyncplotError::data("signal has no channels"));
    }
    if let Some(r) = rows.iter().position(|row| row.len() != width) {
        return Err(SyncplotError::data(format!(
            "signal row {r} has {} channels, expected {width}",
            rows[r].len()
        )));
    }
    Ok(width)
}

/// Zero mean and unit standard deviation, using statistics over every value.
///
/// Fails on a degenerate signal (zero or non-finite standard deviation).
pub fn normalize(rows: &[Vec<f64>]) -> SyncplotResult<Vec<Vec<f64>>> {
    channel_count(rows)?;
    let count = rows.iter().map(Vec::len).sum::<usize>() as f64;
    let mean = rows.iter().flatten().sum::<f64>() / count;
    let variance = rows.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let std = variance.sqrt();
    if !std.is_finite() || std == 0.0 {
        return Err(SyncplotError::data(format!(
            "cannot normalize a degenerate signal (std = {std})"
        )));
    }
    Ok(rows
        .iter()
        .map(|row| row.iter().map(|v| (v - mean) / std).collect())
        .collect())
}

/// Resample a uniformly sampled signal from `rate_in` to `rate_out` Hz.
///
/// Sample `i` of the input sits at `i / rate_in`. The output holds
/// `floor(duration * rate_out)` samples spread evenly from the first to the
/// last input time, both included.
pub fn resample(
    rows: &[Vec<f64>],
    rate_in: f64,
    rate_out: f64,
    kind: Interpolation,
) -> SyncplotResult<Vec<Vec<f64>>> {
    let channels = channel_count(rows)?;
    if !(rate_in > 0.0 && rate_out > 0.0) {
        return Err(SyncplotError::data(format!(
            "sampling rates must be positive (got {rate_in} -> {rate_out})"
        )));
    }
    if rows.len() < kind.min_points() {
        return Err(SyncplotError::data(format!(
            "{kind:?} resampling needs at least {} samples, got {}",
            kind.min_points(),
            rows.len()
        )));
    }

    let xs: Vec<f64> = (0..rows.len()).map(|i| i as f64 / rate_in).collect();
    let start = xs[0];
    let end = xs[xs.len() - 1];
    let count = ((end - start) * rate_out).floor() as usize;
    if count == 0 {
        return Err(SyncplotError::data(format!(
            "resampling {} samples to {rate_out} Hz yields no samples",
            rows.len()
        )));
    }
    let grid: Vec<f64> = if count == 1 {
        vec![start]
    } else {
        let step = (end - start) / (count - 1) as f64;
        (0..count).map(|k| start + k as f64 * step).collect()
    };

    let mut out = vec![Vec::with_capacity(channels); count];
    for c in 0..channels {
        let ys: Vec<f64> = rows.iter().map(|row| row[c]).collect();
        let f = Interpolator::new(&xs, &ys, kind)?;
        for (row, &x) in out.iter_mut().zip(&grid) {
            row.push(f.evaluate(x));
        }
    }
    Ok(out)
}

/// Per-sample Euclidean norm of a 3-channel signal.
pub fn magnitude(rows: &[Vec<f64>]) -> SyncplotResult<Vec<f64>> {
    let channels = channel_count(rows)?;
    if channels != 3 {
        return Err(SyncplotError::data(format!(
            "magnitude needs exactly 3 channels, got {channels}"
        )));
    }
    Ok(rows
        .iter()
        .map(|r| (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt())
        .collect())
}

/// Discrete derivative along time with unit sample spacing.
///
/// Central differences inside, one-sided first-order differences at both ends.
pub fn gradient(rows: &[Vec<f64>]) -> SyncplotResult<Vec<Vec<f64>>> {
    let channels = channel_count(rows)?;
    let n = rows.len();
    if n < 2 {
        return Err(SyncplotError::data(format!(
            "gradient needs at least 2 samples, got {n}"
        )));
    }
    Ok((0..n)
        .map(|i| {
            (0..channels)
                .map(|c| match i {
                    0 => rows[1][c] - rows[0][c],
                    i if i == n - 1 => rows[n - 1][c] - rows[n - 2][c],
                    i => (rows[i + 1][c] - rows[i - 1][c]) / 2.0,
                })
                .collect()
        })
        .collect())
}

/// Nominal sampling rate in Hz: the reciprocal of the mean step, rounded.
pub fn sampling_rate(index: &[Timestamp]) -> SyncplotResult<u32> {
    let (Some(first), Some(last)) = (index.first(), index.last()) else {
        return Err(SyncplotError::data("cannot infer a sampling rate from an empty index"));
    };
    if index.len() < 2 {
        return Err(SyncplotError::data(
            "cannot infer a sampling rate from a single timestamp",
        ));
    }
    // The mean of consecutive deltas telescopes to span / steps.
    let span = (last.as_nanos() - first.as_nanos()) as f64 / 1e9;
    let mean_delta = span / (index.len() - 1) as f64;
    if !(mean_delta > 0.0) {
        return Err(SyncplotError::data(format!(
            "cannot infer a sampling rate from a mean step of {mean_delta}s"
        )));
    }
    let rate = (1.0 / mean_delta).round();
    if rate < 1.0 || rate > u32::MAX as f64 {
        return Err(SyncplotError::data(format!(
            "inferred sampling rate {rate} Hz is out of range"
        )));
    }
    Ok(rate as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[[f64; 3]]) -> Vec<Vec<f64>> {
        values.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn test_normalize_zero_mean_unit_std() {
        let input = rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let out = normalize(&input).unwrap();
        let flat: Vec<f64> = out.iter().flatten().copied().collect();
        let mean = flat.iter().sum::<f64>() / flat.len() as f64;
        let var = flat.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / flat.len() as f64;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_constant_signal_fails() {
        let err = normalize(&rows(&[[2.0, 2.0, 2.0], [2.0, 2.0, 2.0]])).unwrap_err();
        assert!(matches!(err, SyncplotError::Data { .. }));
    }

    #[test]
    fn test_normalize_rejects_ragged_rows() {
        assert!(normalize(&[vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(normalize(&[]).is_err());
    }

    #[test]
    fn test_magnitude_three_four_zero() {
        assert_eq!(magnitude(&rows(&[[3.0, 4.0, 0.0]])).unwrap(), vec![5.0]);
    }

    #[test]
    fn test_magnitude_rejects_wrong_width() {
        assert!(magnitude(&[vec![3.0, 4.0]]).is_err());
        assert!(magnitude(&[vec![3.0, 4.0, 0.0, 1.0]]).is_err());
    }

    #[test]
    fn test_resample_count_and_endpoints() {
        // 101 samples at 100 Hz span 1.0 s; at 50 Hz that is 50 samples.
        let input: Vec<Vec<f64>> = (0..101)
            .map(|i| {
                let t = i as f64 / 100.0;
                vec![t.sin(), t * t]
            })
            .collect();
        let out = resample(&input, 100.0, 50.0, Interpolation::Cubic).unwrap();
        assert_eq!(out.len(), 50);
        assert!((out[0][0] - input[0][0]).abs() < 1e-9);
        assert!((out[49][0] - input[100][0]).abs() < 1e-9);
        assert!((out[49][1] - input[100][1]).abs() < 1e-9);
    }

    #[test]
    fn test_resample_upsample_linear() {
        let input = vec![vec![0.0], vec![1.0], vec![2.0]];
        // span 2 s at 1 Hz -> 4 samples at 2 Hz, spaced 2/3 s apart.
        let out = resample(&input, 1.0, 2.0, Interpolation::Linear).unwrap();
        assert_eq!(out.len(), 4);
        assert!((out[1][0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((out[3][0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_resample_too_short() {
        let input = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert!(resample(&input, 100.0, 100.0, Interpolation::Cubic).is_err());
        assert!(resample(&input, 0.0, 100.0, Interpolation::Linear).is_err());
    }

    #[test]
    fn test_gradient_of_quadratic() {
        let input: Vec<Vec<f64>> = (0..6).map(|i| vec![(i * i) as f64]).collect();
        let g = gradient(&input).unwrap();
        let values: Vec<f64> = g.iter().map(|r| r[0]).collect();
        assert_eq!(values, vec![1.0, 2.0, 4.0, 6.0, 8.0, 9.0]);
    }

    #[test]
    fn test_sampling_rate() {
        let index: Vec<Timestamp> = (0..11).map(|i| Timestamp::from_nanos(i * 10_000_000)).collect();
        assert_eq!(sampling_rate(&index).unwrap(), 100);
        let jittered = vec![
            Timestamp::from_nanos(0),
            Timestamp::from_nanos(9_000_000),
            Timestamp::from_nanos(20_000_000),
            Timestamp::from_nanos(30_000_000),
        ];
        assert_eq!(sampling_rate(&jittered).unwrap(), 100);
    }

    #[test]
    fn test_sampling_rate_degenerate() {
        assert!(sampling_rate(&[Timestamp::ZERO]).is_err());
        assert!(sampling_rate(&[Timestamp::ZERO, Timestamp::ZERO]).is_err());
    }
}
