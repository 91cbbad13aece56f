//! Exact line search on the concave piecewise-linear dual objective.
//!
//! Moving the duals by `α·direction` changes the dual objective by
//!
//! ```text
//! φ(α) = -α·(direction·b) + Σ_j min((c̄_j + α·dA_j)·u_j, (c̄_j + α·dA_j)·l_j)
//! ```
//!
//! where `dA = directionᵗA`. Each term is linear on both sides of its
//! breakpoint `α_j = -c̄_j / dA_j`, with the larger of `dA_j·u_j, dA_j·l_j` as
//! slope on the left and the smaller on the right. Sorting the breakpoints and
//! accumulating those slopes gives the derivative of `φ` on every interval.

use sprs::CsMat;

use crate::rng::SplitMix64;

/// `dA` restricted to its nonzero columns, together with `direction·b`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDirection {
    pub columns: Vec<usize>,
    pub slopes: Vec<f64>,
    pub rhs: f64,
}

impl SearchDirection {
    /// `weightsᵗA` over a CSR matrix, with `rhs = weights·b`.
    ///
    /// Columns whose combined coefficient cancels to zero are left out.
    pub fn along(weights: &[f64], a: &CsMat<f64>, b: &[f64]) -> Self {
        let n = a.cols();
        let mut combined = vec![0.0; n];
        let mut touched = vec![false; n];
        let mut rhs = 0.0;
        for ((row, &w), &bi) in a.outer_iterator().zip(weights).zip(b) {
            if w == 0.0 {
                continue;
            }
            rhs += w * bi;
            for (j, &aij) in row.iter() {
                combined[j] += w * aij;
                touched[j] = true;
            }
        }
        let columns: Vec<usize> = (0..n).filter(|&j| touched[j] && combined[j] != 0.0).collect();
        let slopes = columns.iter().map(|&j| combined[j]).collect();
        Self { columns, slopes, rhs }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn profile(&self, c_bar: &[f64], lower: &[f64], upper: &[f64]) -> BreakpointProfile {
        BreakpointProfile::new(&self.columns, &self.slopes, self.rhs, c_bar, lower, upper)
    }
}

/// Sorted breakpoints of `φ` and its derivative on each interval between them.
///
/// `derivatives[k]` is the slope of `φ` on `(breakpoints[k-1], breakpoints[k])`,
/// with the first and last entries covering the two unbounded intervals, so
/// there is one more derivative than breakpoints. For a concave `φ` the
/// derivatives are non-increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointProfile {
    pub breakpoints: Vec<f64>,
    pub derivatives: Vec<f64>,
}

impl BreakpointProfile {
    /// `columns[i]` carries coefficient `slopes[i]` in `dA`; zero slopes are ignored.
    pub fn new(
        columns: &[usize],
        slopes: &[f64],
        rhs: f64,
        c_bar: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Self {
        let mut points: Vec<(f64, f64, f64)> = columns
            .iter()
            .zip(slopes)
            .filter(|&(_, &d)| d != 0.0)
            .map(|(&j, &d)| {
                let at_upper = d * upper[j];
                let at_lower = d * lower[j];
                (-c_bar[j] / d, at_upper.max(at_lower), at_upper.min(at_lower))
            })
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = points.len();
        let mut derivatives = vec![-rhs; k + 1];
        let mut left_slopes = 0.0;
        for i in (0..k).rev() {
            left_slopes += points[i].1;
            derivatives[i] += left_slopes;
        }
        let mut right_slopes = 0.0;
        for i in 0..k {
            right_slopes += points[i].2;
            derivatives[i + 1] += right_slopes;
        }
        // +inf meets -inf where terms of both kinds are unbounded: φ is -inf there
        for d in derivatives.iter_mut().filter(|d| d.is_nan()) {
            *d = f64::NEG_INFINITY;
        }

        Self {
            breakpoints: points.into_iter().map(|p| p.0).collect(),
            derivatives,
        }
    }

    /// Step maximizing `φ`.
    ///
    /// A zero derivative between two breakpoints means every step in that
    /// interval is optimal; a uniform point of it is drawn from `rng` so
    /// repeated sweeps do not cycle between the endpoints. Returns `±inf` when
    /// `φ` grows without bound in that direction.
    pub fn maximizer(&self, rng: &mut SplitMix64) -> f64 {
        let n = self.breakpoints.len();
        let k = self.derivatives.partition_point(|&d| d > 0.0);
        if k > n {
            return f64::INFINITY;
        }
        if k == 0 {
            return if self.derivatives[0] == 0.0 {
                self.breakpoints.first().copied().unwrap_or(0.0)
            } else {
                f64::NEG_INFINITY
            };
        }
        if self.derivatives[k] == 0.0 && k < n {
            // lo + t·(hi - lo) stays exactly on coincident breakpoints
            let (lo, hi) = (self.breakpoints[k - 1], self.breakpoints[k]);
            return lo + rng.next_f64() * (hi - lo);
        }
        self.breakpoints[k - 1]
    }
}

/// Exact maximizing step of `φ` along the sparse direction `(columns, slopes)`.
///
/// For coordinate ascent the direction is a single constraint row and `rhs`
/// its right-hand side. The caller applies any sign constraint of the dual
/// it updates.
pub fn exact_line_search(
    columns: &[usize],
    slopes: &[f64],
    rhs: f64,
    c_bar: &[f64],
    lower: &[f64],
    upper: &[f64],
    rng: &mut SplitMix64,
) -> f64 {
    BreakpointProfile::new(columns, slopes, rhs, c_bar, lower, upper).maximizer(rng)
}
