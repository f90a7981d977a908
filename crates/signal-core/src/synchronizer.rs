//! Cross-correlation based stream synchronization.
//!
//! The reference is the signal recorded alongside the video (camera IMU or
//! skeleton joint positions); the target is the sensor stream that should be
//! moved onto the video clock. Both series must start at the same epoch.

use crate::correlation::{correlation_peak, CorrelationPeak};
use crate::interpolate::Interpolation;
use crate::signal::{gradient, magnitude, normalize, resample, sampling_rate};
use chrono::TimeDelta;
use syncplot_common::{offset_from_secs, SyncplotError, SyncplotResult};
use syncplot_data_model::TimeSeries;

/// Outcome of a synchronization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Offset to add to the target's timestamps.
    pub offset: TimeDelta,
    pub reference_rate: u32,
    pub target_rate: u32,
    /// Length of the reference magnitude signal after resampling.
    pub reference_len: usize,
    pub target_len: usize,
    pub peak: CorrelationPeak,
}

impl SyncReport {
    pub fn offset_secs(&self) -> f64 {
        syncplot_common::offset_as_secs(self.offset)
    }
}

/// Offset that moves `target` onto the clock of `reference`.
///
/// With `use_second_derivative` the reference is differentiated twice first,
/// turning positions into accelerations.
pub fn compute_offset(
    reference: &TimeSeries,
    target: &TimeSeries,
    use_second_derivative: bool,
) -> SyncplotResult<TimeDelta> {
    compute_offset_report(reference, target, use_second_derivative).map(|r| r.offset)
}

/// Like [`compute_offset`], returning the intermediate measurements too.
pub fn compute_offset_report(
    reference: &TimeSeries,
    target: &TimeSeries,
    use_second_derivative: bool,
) -> SyncplotResult<SyncReport> {
    let reference_rate = sampling_rate(reference.index())
        .map_err(|e| SyncplotError::data(format!("reference: {e}")))?;
    let target_rate =
        sampling_rate(target.index()).map_err(|e| SyncplotError::data(format!("target: {e}")))?;

    let mut reference_rows = reference.to_rows();
    if use_second_derivative {
        reference_rows = gradient(&gradient(&reference_rows)?)?;
    }
    let reference_rows = resample(
        &reference_rows,
        reference_rate as f64,
        target_rate as f64,
        Interpolation::Cubic,
    )?;

    let reference_signal = magnitude(&normalize(&reference_rows)?)?;
    let target_signal = magnitude(&normalize(&target.to_rows())?)?;

    let peak = correlation_peak(&reference_signal, &target_signal)?;
    let offset = offset_from_secs(peak.lag as f64 / target_rate as f64);

    let report = SyncReport {
        offset,
        reference_rate,
        target_rate,
        reference_len: reference_signal.len(),
        target_len: target_signal.len(),
        peak,
    };
    tracing::debug!(
        reference_rate,
        target_rate,
        reference_len = report.reference_len,
        target_len = report.target_len,
        peak_index = peak.index,
        peak_value = peak.value,
        offset_secs = report.offset_secs(),
        "Cross-correlation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncplot_common::Timestamp;

    fn series(rate: f64, rows: Vec<Vec<f64>>) -> TimeSeries {
        let index = (0..rows.len())
            .map(|i| Timestamp::from_secs_f64(i as f64 / rate))
            .collect();
        TimeSeries::from_rows(index, vec!["x".into(), "y".into(), "z".into()], &rows).unwrap()
    }

    #[test]
    fn test_zero_offset_for_identical_streams() {
        let rows: Vec<Vec<f64>> = (0..400)
            .map(|i| {
                let t = i as f64 / 50.0;
                vec![(1.3 * t).sin(), (0.7 * t).cos(), (t * t * 0.1).sin()]
            })
            .collect();
        let a = series(50.0, rows.clone());
        let b = series(50.0, rows);
        let report = compute_offset_report(&a, &b, false).unwrap();
        assert_eq!(report.reference_rate, 50);
        assert!(report.offset_secs().abs() <= 1.0 / 50.0 + 1e-9);
    }

    #[test]
    fn test_wrong_width_fails() {
        let index: Vec<Timestamp> = (0..10).map(|i| Timestamp::from_nanos(i * 10_000_000)).collect();
        let two = TimeSeries::new(
            index,
            vec!["a".into(), "b".into()],
            vec![(0..10).map(f64::from).collect(), vec![1.0; 10]],
        )
        .unwrap();
        let err = compute_offset(&two, &two, false).unwrap_err();
        assert!(matches!(err, SyncplotError::Data { .. }));
    }

    #[test]
    fn test_single_sample_target_fails() {
        let a = series(10.0, (0..20).map(|i| vec![i as f64, 0.0, 1.0]).collect());
        let b = series(10.0, vec![vec![1.0, 2.0, 3.0]]);
        assert!(compute_offset(&a, &b, false).is_err());
    }
}
