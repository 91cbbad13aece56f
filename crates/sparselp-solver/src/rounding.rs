//! Rounding a fractional primal point to a feasible one.

use std::collections::VecDeque;

use crate::problem::OneSidedLp;

/// Outcome of a rounding attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundedPoint {
    pub x: Vec<f64>,
    /// Whether `x` satisfies every bound and constraint
    pub valid: bool,
}

/// Turns a fractional primal point into a (hopefully) feasible one.
///
/// `order` lists the variables in the order they should be decided,
/// `fixed[j]` marks variables whose value in `x` must be kept, and
/// `max_iterations` bounds the propagation work per decision.
pub trait Rounder {
    fn round(
        &self,
        x: &[f64],
        lp: &OneSidedLp,
        order: &[usize],
        fixed: &[bool],
        max_iterations: usize,
    ) -> RoundedPoint;
}

/// Greedy dive with bound propagation.
///
/// Variables are visited in `order`; each one is set to the cheapest of its
/// rounded values and box bounds that keeps the propagated domains
/// non-empty. Constraint activities then tighten the remaining domains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreedyRounder {
    pub tolerance: f64,
}

impl Default for GreedyRounder {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

impl GreedyRounder {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Values to try for one variable, cheapest first.
    fn candidates(&self, xj: f64, cost: f64, lo: f64, hi: f64) -> Vec<f64> {
        let clamp = |v: f64| v.max(lo).min(hi);
        let mut values: Vec<f64> = [xj.floor(), xj.ceil(), lo, hi]
            .into_iter()
            .filter(|v| v.is_finite())
            .map(clamp)
            .collect();
        if values.is_empty() {
            values.push(if xj.is_finite() { clamp(xj) } else { 0.0 });
        }
        values.sort_by(|a, b| {
            (cost * a)
                .total_cmp(&(cost * b))
                .then_with(|| (a - xj).abs().total_cmp(&(b - xj).abs()))
        });
        values.dedup();
        values
    }
}

impl Rounder for GreedyRounder {
    fn round(
        &self,
        x: &[f64],
        lp: &OneSidedLp,
        order: &[usize],
        fixed: &[bool],
        max_iterations: usize,
    ) -> RoundedPoint {
        let propagator = Propagator::new(lp, self.tolerance, max_iterations);
        let mut lo = lp.lower_bounds().to_vec();
        let mut hi = lp.upper_bounds().to_vec();
        for (j, &is_fixed) in fixed.iter().enumerate() {
            if is_fixed {
                lo[j] = x[j];
                hi[j] = x[j];
            }
        }

        let all_rows: Vec<usize> = (0..propagator.rows.len()).collect();
        let mut consistent = propagator.propagate(&mut lo, &mut hi, &all_rows);
        if !consistent {
            log::debug!("fixed variables already conflict with the constraints");
        }

        for &j in order {
            if fixed[j] || lo[j] == hi[j] {
                continue;
            }
            let candidates = self.candidates(x[j], lp.costs()[j], lo[j], hi[j]);
            let mut chosen = false;
            for &value in &candidates {
                let (mut trial_lo, mut trial_hi) = (lo.clone(), hi.clone());
                trial_lo[j] = value;
                trial_hi[j] = value;
                if propagator.propagate(&mut trial_lo, &mut trial_hi, &propagator.col_rows[j]) {
                    lo = trial_lo;
                    hi = trial_hi;
                    chosen = true;
                    break;
                }
            }
            if !chosen {
                log::debug!("no value of x[{}] is consistent; keeping {}", j, candidates[0]);
                lo[j] = candidates[0];
                hi[j] = candidates[0];
                consistent = false;
            }
        }

        let rounded: Vec<f64> = x
            .iter()
            .zip(lo.iter().zip(&hi))
            .map(|(&xj, (&l, &h))| if l == h { l } else { xj.max(l).min(h) })
            .collect();
        let valid = lp.check_solution(&rounded, self.tolerance);
        if consistent && !valid {
            log::debug!("propagation succeeded but the rounded point violates the constraints");
        }
        RoundedPoint { x: rounded, valid }
    }
}

/// `Σ a_j x_j <= rhs` rows: the inequalities, plus both directions of each equality.
struct Propagator {
    rows: Vec<(Vec<(usize, f64)>, f64)>,
    col_rows: Vec<Vec<usize>>,
    tolerance: f64,
    max_visits: usize,
}

impl Propagator {
    fn new(lp: &OneSidedLp, tolerance: f64, max_iterations: usize) -> Self {
        let capacity = lp.num_inequalities() + 2 * lp.num_equalities();
        let mut rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::with_capacity(capacity);
        for (row, &b) in lp.inequality_matrix().outer_iterator().zip(lp.inequality_rhs()) {
            rows.push((row.iter().map(|(j, &a)| (j, a)).collect(), b));
        }
        for (row, &b) in lp.equality_matrix().outer_iterator().zip(lp.equality_rhs()) {
            rows.push((row.iter().map(|(j, &a)| (j, a)).collect(), b));
            rows.push((row.iter().map(|(j, &a)| (j, -a)).collect(), -b));
        }
        let mut col_rows = vec![Vec::new(); lp.num_variables()];
        for (r, (entries, _)) in rows.iter().enumerate() {
            for &(j, _) in entries {
                col_rows[j].push(r);
            }
        }
        let max_visits = max_iterations.max(1) * rows.len().max(1);
        Self {
            rows,
            col_rows,
            tolerance,
            max_visits,
        }
    }

    /// Tighten `lo`/`hi` starting from `start` rows. Returns `false` on a conflict.
    fn propagate(&self, lo: &mut [f64], hi: &mut [f64], start: &[usize]) -> bool {
        let mut queued = vec![false; self.rows.len()];
        let mut queue: VecDeque<usize> = VecDeque::new();
        for &r in start {
            if !queued[r] {
                queued[r] = true;
                queue.push_back(r);
            }
        }
        let mut changed = Vec::new();
        let mut visits = 0;
        while let Some(r) = queue.pop_front() {
            queued[r] = false;
            visits += 1;
            if visits > self.max_visits {
                break;
            }
            changed.clear();
            if !self.tighten_row(r, lo, hi, &mut changed) {
                return false;
            }
            for &j in &changed {
                for &other in &self.col_rows[j] {
                    if other != r && !queued[other] {
                        queued[other] = true;
                        queue.push_back(other);
                    }
                }
            }
        }
        true
    }

    fn tighten_row(&self, r: usize, lo: &mut [f64], hi: &mut [f64], changed: &mut Vec<usize>) -> bool {
        let (entries, rhs) = &self.rows[r];
        let contribution = |j: usize, a: f64, lo: &[f64], hi: &[f64]| if a > 0.0 { a * lo[j] } else { a * hi[j] };

        let mut finite = 0.0;
        let mut unbounded = 0;
        for &(j, a) in entries {
            let c = contribution(j, a, lo, hi);
            if c.is_finite() {
                finite += c;
            } else {
                unbounded += 1;
            }
        }
        if unbounded == 0 && finite > rhs + self.tolerance {
            return false;
        }
        if unbounded > 1 {
            return true;
        }

        for &(j, a) in entries {
            let c = contribution(j, a, lo, hi);
            let rest = if c.is_finite() {
                if unbounded > 0 {
                    continue;
                }
                finite - c
            } else {
                finite
            };
            let bound = (rhs - rest) / a;
            if a > 0.0 && bound < hi[j] - self.tolerance {
                hi[j] = bound;
                changed.push(j);
            } else if a < 0.0 && bound > lo[j] + self.tolerance {
                lo[j] = bound;
                changed.push(j);
            }
            if lo[j] > hi[j] + self.tolerance {
                return false;
            }
            if lo[j] > hi[j] {
                let mid = 0.5 * (lo[j] + hi[j]);
                lo[j] = mid;
                hi[j] = mid;
            }
        }
        true
    }
}
