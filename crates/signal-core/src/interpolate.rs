//! One-dimensional interpolation over a sorted grid.

use syncplot_common::{SyncplotError, SyncplotResult};

/// Interpolation kind used when resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Piecewise linear; needs at least 2 points.
    Linear,
    /// Cubic spline with not-a-knot ends; needs at least 4 points.
    #[default]
    Cubic,
}

impl Interpolation {
    pub fn min_points(&self) -> usize {
        match self {
            Interpolation::Linear => 2,
            Interpolation::Cubic => 4,
        }
    }
}

/// Interpolant over strictly increasing `xs`.
#[derive(Debug, Clone)]
pub struct Interpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots (cubic only).
    second: Option<Vec<f64>>,
}

impl Interpolator {
    pub fn new(xs: &[f64], ys: &[f64], kind: Interpolation) -> SyncplotResult<Self> {
        if xs.len() != ys.len() {
            return Err(SyncplotError::data(format!(
                "interpolation grid has {} points but {} values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < kind.min_points() {
            return Err(SyncplotError::data(format!(
                "{kind:?} interpolation needs at least {} points, got {}",
                kind.min_points(),
                xs.len()
            )));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SyncplotError::data(
                "interpolation grid must be strictly increasing",
            ));
        }
        let second = match kind {
            Interpolation::Linear => None,
            Interpolation::Cubic => Some(not_a_knot_second_derivatives(xs, ys)),
        };
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            second,
        })
    }

    /// Value at `x`; points outside the grid use the outermost segment.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let i = self
            .xs
            .partition_point(|&k| k <= x)
            .saturating_sub(1)
            .min(n - 2);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let h = x1 - x0;

        match &self.second {
            None => y0 + (y1 - y0) * (x - x0) / h,
            Some(m) => {
                let a = x1 - x;
                let b = x - x0;
                m[i] * a.powi(3) / (6.0 * h)
                    + m[i + 1] * b.powi(3) / (6.0 * h)
                    + (y0 / h - m[i] * h / 6.0) * a
                    + (y1 / h - m[i + 1] * h / 6.0) * b
            }
        }
    }
}

/// Second derivatives of a not-a-knot spline.
///
/// The third derivative is continuous across the second and the second-last
/// knot, so the first two and the last two segments each share one cubic.
/// Eliminating the end curvatures keeps the system tridiagonal.
fn not_a_knot_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    if n < 4 {
        return m;
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let inner = n - 2;
    let mut lower = vec![0.0; inner];
    let mut diag = vec![0.0; inner];
    let mut upper = vec![0.0; inner];
    let mut rhs = vec![0.0; inner];
    for k in 0..inner {
        let i = k + 1;
        lower[k] = h[i - 1];
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        upper[k] = h[i];
        rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
    }

    // m[0] = ((h0 + h1) m[1] - h0 m[2]) / h1
    let (h0, h1) = (h[0], h[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    upper[0] = (h1 * h1 - h0 * h0) / h1;
    lower[0] = 0.0;
    // m[n-1] = ((a + b) m[n-2] - b m[n-3]) / a
    let (a, b) = (h[n - 3], h[n - 2]);
    let last = inner - 1;
    diag[last] = (a + b) * (2.0 * a + b) / a;
    lower[last] = (a * a - b * b) / a;
    upper[last] = 0.0;

    // Thomas algorithm.
    for k in 1..inner {
        let w = lower[k] / diag[k - 1];
        diag[k] -= w * upper[k - 1];
        rhs[k] -= w * rhs[k - 1];
    }
    m[inner] = rhs[last] / diag[last];
    for k in (0..last).rev() {
        m[k + 1] = (rhs[k] - upper[k] * m[k + 2]) / diag[k];
    }

    m[0] = ((h0 + h1) * m[1] - h0 * m[2]) / h1;
    m[n - 1] = ((a + b) * m[n - 2] - b * m[n - 3]) / a;
    m
}
