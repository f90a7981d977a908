//! Full cross-correlation and lag estimation.

use rustfft::{num_complex::Complex, FftPlanner};
use syncplot_common::{SyncplotError, SyncplotResult};

/// Above this many multiply-adds the FFT path is used.
const DIRECT_WORK_LIMIT: usize = 1 << 20;

/// FFT entries this close to the maximum, relative to the signal energy,
/// are rescored exactly.
const RESCORE_TOLERANCE: f64 = 1e-9;

/// Full cross-correlation of `reference` against `target`.
///
/// Output index `k` holds `sum_i reference[i + k - (m - 1)] * target[i]`
/// for `m = target.len()`, so the result has `n + m - 1` entries and index
/// `m - 1` is zero lag.
pub fn cross_correlation(reference: &[f64], target: &[f64]) -> Vec<f64> {
    if reference.is_empty() || target.is_empty() {
        return Vec::new();
    }
    if uses_fft(reference, target) {
        correlate_fft(reference, target)
    } else {
        correlate_direct(reference, target)
    }
}

fn uses_fft(reference: &[f64], target: &[f64]) -> bool {
    reference.len().saturating_mul(target.len()) > DIRECT_WORK_LIMIT
}

fn correlate_direct(reference: &[f64], target: &[f64]) -> Vec<f64> {
    (0..reference.len() + target.len() - 1)
        .map(|k| correlate_at(reference, target, k))
        .collect()
}

/// Single entry `k` of the full cross-correlation, summed directly.
fn correlate_at(reference: &[f64], target: &[f64], k: usize) -> f64 {
    let n = reference.len() as isize;
    let m = target.len() as isize;
    let lag = k as isize - (m - 1);
    let start = (-lag).max(0);
    let end = m.min(n - lag);
    (start..end)
        .map(|i| reference[(i + lag) as usize] * target[i as usize])
        .sum()
}

fn correlate_fft(reference: &[f64], target: &[f64]) -> Vec<f64> {
    let full = reference.len() + target.len() - 1;
    let size = full.next_power_of_two();

    let mut a: Vec<Complex<f64>> = reference
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    // Convolving with the reversed target is correlation.
    let mut b: Vec<Complex<f64>> = target
        .iter()
        .rev()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(size).process(&mut a);
    planner.plan_fft_forward(size).process(&mut b);
    for (x, y) in a.iter_mut().zip(&b) {
        *x *= *y;
    }
    planner.plan_fft_inverse(size).process(&mut a);

    let scale = size as f64;
    a.iter().take(full).map(|c| c.re / scale).collect()
}

/// Index of the first maximum.
fn first_argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// First maximum of an FFT correlation, robust to rounding.
///
/// FFT output carries rounding noise, so exactly equal peaks come out
/// unequal. Every entry within a tolerance of the maximum is rescored with
/// the direct sum and the first exact maximum wins.
fn first_argmax_fft(reference: &[f64], target: &[f64], corr: &[f64]) -> Option<(usize, f64)> {
    let max = corr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let energy = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>().sqrt();
    // Cauchy-Schwarz bound on any correlation entry.
    let bound = energy(reference) * energy(target);
    if bound == 0.0 {
        return Some((0, 0.0));
    }
    let threshold = max - RESCORE_TOLERANCE * bound;

    let mut best: Option<(usize, f64)> = None;
    for (k, _) in corr.iter().enumerate().filter(|(_, &v)| v >= threshold) {
        let exact = correlate_at(reference, target, k);
        if best.map_or(true, |(_, b)| exact > b) {
            best = Some((k, exact));
        }
    }
    best
}

/// Peak of a cross-correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Index into the full correlation output.
    pub index: usize,
    /// Correlation value at the peak.
    pub value: f64,
    /// Lag in samples: `index - (target.len() - 1)`.
    pub lag: i64,
}

/// Locate the correlation peak; the first maximum wins ties.
pub fn correlation_peak(reference: &[f64], target: &[f64]) -> SyncplotResult<CorrelationPeak> {
    if reference.is_empty() || target.is_empty() {
        return Err(SyncplotError::data(format!(
            "cannot correlate empty signals (reference {}, target {})",
            reference.len(),
            target.len()
        )));
    }
    if reference.iter().chain(target).any(|v| !v.is_finite()) {
        return Err(SyncplotError::data(
            "cannot correlate signals containing NaN or infinite values",
        ));
    }
    let corr = cross_correlation(reference, target);
    let peak = if uses_fft(reference, target) {
        first_argmax_fft(reference, target, &corr)
    } else {
        first_argmax(&corr).map(|i| (i, corr[i]))
    };
    let (index, value) =
        peak.ok_or_else(|| SyncplotError::data("cross-correlation produced no values"))?;
    Ok(CorrelationPeak {
        index,
        value,
        lag: index as i64 - (target.len() as i64 - 1),
    })
}

/// Offset in seconds of `target` relative to `reference`.
///
/// A positive result means the target's samples happen later on the
/// reference clock than on their own: `target[j] == reference[j + lag]`.
pub fn cross_correlation_offset(
    reference: &[f64],
    target: &[f64],
    sample_rate: f64,
) -> SyncplotResult<f64> {
    if !(sample_rate > 0.0) {
        return Err(SyncplotError::data(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }
    let peak = correlation_peak(reference, target)?;
    Ok(peak.lag as f64 / sample_rate)
}
