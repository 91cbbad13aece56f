//! Primal recovery and dual objective evaluation.
//!
//! For fixed duals the Lagrangian separates per variable:
//! `x_j` minimizes `c̄_j·x_j` over `[l_j, u_j]`, so it sits on the lower bound
//! when `c̄_j > 0`, on the upper bound when `c̄_j < 0`, and anywhere in the box
//! when `c̄_j == 0`. The dual objective does not depend on that last choice.

use std::time::Duration;

use crate::problem::OneSidedLp;
use crate::rng::SplitMix64;
use crate::settings::TieMethod;
use crate::solution::{DualSolution, SolveStatus};
use crate::sparse;

/// Read-only view of the LP the dual solvers iterate on.
#[derive(Debug, Clone, Copy)]
pub struct DualContext<'a> {
    lp: &'a OneSidedLp,
}

impl<'a> DualContext<'a> {
    pub fn new(lp: &'a OneSidedLp) -> Self {
        Self { lp }
    }

    pub fn lp(&self) -> &'a OneSidedLp {
        self.lp
    }

    /// `c̄ = c + y_eqᵗAeq + y_ineqᵗAineq`
    pub fn linearized_cost(&self, y_eq: &[f64], y_ineq: &[f64]) -> Vec<f64> {
        let mut c_bar = self.lp.costs().to_vec();
        sparse::add_transposed_product(self.lp.equality_matrix(), y_eq, &mut c_bar);
        sparse::add_transposed_product(self.lp.inequality_matrix(), y_ineq, &mut c_bar);
        c_bar
    }

    /// Box minimizer of `c̄ᵗx`, filling ties according to `tie`.
    pub fn primal_from_cost(&self, c_bar: &[f64], tie: TieMethod, rng: &mut SplitMix64) -> Vec<f64> {
        let lower = self.lp.lower_bounds();
        let upper = self.lp.upper_bounds();
        c_bar
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(&c, (&l, &u))| {
                if c > 0.0 {
                    l
                } else if c < 0.0 {
                    u
                } else {
                    tied_value(l, u, tie, rng)
                }
            })
            .collect()
    }

    /// `(c̄, x)` for the given duals.
    pub fn get_optim_x(
        &self,
        y_eq: &[f64],
        y_ineq: &[f64],
        tie: TieMethod,
        rng: &mut SplitMix64,
    ) -> (Vec<f64>, Vec<f64>) {
        let c_bar = self.linearized_cost(y_eq, y_ineq);
        let x = self.primal_from_cost(&c_bar, tie, rng);
        (c_bar, x)
    }

    /// Dual objective `-y_eq·beq - y_ineq·bupper + Σ_{c̄_j≠0} min(c̄_j·u_j, c̄_j·l_j)`.
    ///
    /// `-inf` when some variable with a nonzero reduced cost is unbounded in
    /// the direction that cost favours.
    pub fn evaluate(&self, y_eq: &[f64], y_ineq: &[f64]) -> f64 {
        let c_bar = self.linearized_cost(y_eq, y_ineq);
        self.dual_objective(y_eq, y_ineq, &c_bar)
    }

    /// Same as [`evaluate`](Self::evaluate) with `c̄` already at hand.
    pub fn dual_objective(&self, y_eq: &[f64], y_ineq: &[f64], c_bar: &[f64]) -> f64 {
        let box_term: f64 = c_bar
            .iter()
            .zip(self.lp.lower_bounds().iter().zip(self.lp.upper_bounds()))
            .filter(|&(&c, _)| c != 0.0)
            .map(|(&c, (&l, &u))| (c * u).min(c * l))
            .sum();
        box_term - sparse::dot(y_eq, self.lp.equality_rhs()) - sparse::dot(y_ineq, self.lp.inequality_rhs())
    }

    /// Starting point for rounding: the midpoint rule, with tied variables of
    /// finite box pushed by `nudge·sign(c_j)` away from the exact centre.
    ///
    /// The offset is not clipped: a box narrower than `2·nudge` yields a start
    /// outside it.
    pub fn rounding_start(&self, c_bar: &[f64], nudge: f64, rng: &mut SplitMix64) -> Vec<f64> {
        let mut x = self.primal_from_cost(c_bar, TieMethod::Center, rng);
        let lp = self.lp;
        for (j, xj) in x.iter_mut().enumerate() {
            let (l, u) = (lp.lower_bounds()[j], lp.upper_bounds()[j]);
            if c_bar[j] == 0.0 && l.is_finite() && u.is_finite() {
                *xj = 0.5 * (l + u) + nudge * sign(lp.costs()[j]);
            }
        }
        x
    }
}

fn tied_value(l: f64, u: f64, tie: TieMethod, rng: &mut SplitMix64) -> f64 {
    match (l.is_finite(), u.is_finite()) {
        (true, true) => match tie {
            TieMethod::Round => rng.next_range(l, u),
            TieMethod::Center => 0.5 * (l + u),
        },
        (false, true) => u,
        (true, false) => l,
        // any value is optimal
        (false, false) => 0.0,
    }
}

/// Sign with `sign(0) == 0`.
pub(crate) fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Dual vectors and the linearized cost they induce.
#[derive(Debug, Clone)]
pub struct DualState {
    pub y_eq: Vec<f64>,
    pub y_ineq: Vec<f64>,
    pub c_bar: Vec<f64>,
}

impl DualState {
    pub fn new(ctx: &DualContext<'_>, y_eq: Vec<f64>, y_ineq: Vec<f64>) -> Self {
        let c_bar = ctx.linearized_cost(&y_eq, &y_ineq);
        Self { y_eq, y_ineq, c_bar }
    }

    /// Recompute `c̄` from scratch, dropping any drift from incremental updates.
    pub fn refresh(&mut self, ctx: &DualContext<'_>) {
        self.c_bar = ctx.linearized_cost(&self.y_eq, &self.y_ineq);
    }

    pub fn dual_objective(&self, ctx: &DualContext<'_>) -> f64 {
        ctx.dual_objective(&self.y_eq, &self.y_ineq, &self.c_bar)
    }

    /// `y_eq[i] += alpha`, patching `c̄` over row `i`.
    pub fn step_equality(&mut self, ctx: &DualContext<'_>, i: usize, alpha: f64) {
        let previous = self.y_eq[i];
        self.y_eq[i] += alpha;
        let delta = self.y_eq[i] - previous;
        if let Some(row) = ctx.lp().equality_matrix().outer_view(i) {
            for (j, &aij) in row.iter() {
                self.c_bar[j] += delta * aij;
            }
        }
    }

    /// `y_ineq[i] = max(y_ineq[i] + alpha, 0)`, patching `c̄` over row `i`.
    /// Returns the change actually applied.
    pub fn step_inequality(&mut self, ctx: &DualContext<'_>, i: usize, alpha: f64) -> f64 {
        let previous = self.y_ineq[i];
        self.y_ineq[i] = (self.y_ineq[i] + alpha).max(0.0);
        let delta = self.y_ineq[i] - previous;
        if let Some(row) = ctx.lp().inequality_matrix().outer_view(i) {
            for (j, &aij) in row.iter() {
                self.c_bar[j] += delta * aij;
            }
        }
        delta
    }

    /// Final result for `x` at the current duals.
    pub(crate) fn into_solution(
        mut self,
        ctx: &DualContext<'_>,
        status: SolveStatus,
        x: Vec<f64>,
        iterations: usize,
        elapsed: Duration,
        monotonicity_warnings: usize,
    ) -> DualSolution {
        self.refresh(ctx);
        let lp = ctx.lp();
        DualSolution {
            status,
            dual_objective: self.dual_objective(ctx),
            primal_objective: lp.objective(&x),
            max_violation: lp.max_constraint_violation(&x),
            sum_violation: lp.sum_constraint_violation(&x),
            x,
            y_eq: self.y_eq,
            y_ineq: self.y_ineq,
            iterations,
            elapsed,
            monotonicity_warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::SparseLp;
    use crate::random::RandomLp;
    use approx::assert_abs_diff_eq;

    fn small_lp() -> OneSidedLp {
        // min x0 - x1 + 0 x2, x0 in [0, 2], x1 in [-1, 1], x2 free
        // x0 + x1 == 1, x1 + x2 <= 3
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, -1.0, f64::NEG_INFINITY], &[2.0, 1.0, f64::INFINITY], &[1.0, -1.0, 0.0])
            .unwrap();
        lp.add_equality(&[(0, 1.0), (1, 1.0)], 1.0).unwrap();
        lp.add_inequality(&[(1, 1.0), (2, 1.0)], f64::NEG_INFINITY, 3.0).unwrap();
        lp.to_one_sided()
    }

    #[test]
    fn test_linearized_cost_and_primal() {
        let lp = small_lp();
        let ctx = DualContext::new(&lp);
        let mut rng = SplitMix64::new(1);

        let (c_bar, x) = ctx.get_optim_x(&[0.5], &[0.0], TieMethod::Round, &mut rng);
        assert_eq!(c_bar, vec![1.5, -0.5, 0.0]);
        // x2 has both bounds infinite and c̄ == 0
        assert_eq!(x, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_evaluate_matches_hand_computation() {
        let lp = small_lp();
        let ctx = DualContext::new(&lp);
        // c̄ = (1.5, -0.5, 0): min terms 0 and -0.5; -0.5·1 from the equality
        assert_abs_diff_eq!(ctx.evaluate(&[0.5], &[0.0]), -1.0);
        // the free variable with c̄ == 0 contributes nothing
        let with_free = ctx.evaluate(&[0.5], &[0.0]);
        assert!(with_free.is_finite());
        // a nonzero reduced cost on the free variable is unbounded below
        assert_eq!(ctx.evaluate(&[0.5], &[1.0]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_tie_rules() {
        let mut lp = SparseLp::new();
        lp.add_variables(
            &[0.0, f64::NEG_INFINITY, 1.0, f64::NEG_INFINITY],
            &[4.0, 2.0, f64::INFINITY, f64::INFINITY],
            &[0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let lp = lp.to_one_sided();
        let ctx = DualContext::new(&lp);
        let mut rng = SplitMix64::new(9);

        let centered = ctx.primal_from_cost(&[0.0; 4], TieMethod::Center, &mut rng);
        assert_eq!(centered, vec![2.0, 2.0, 1.0, 0.0]);

        let drawn = ctx.primal_from_cost(&[0.0; 4], TieMethod::Round, &mut rng);
        assert!((0.0..=4.0).contains(&drawn[0]));
        assert_eq!(&drawn[1..], &[2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_get_optim_x_is_reproducible() {
        let (lp, _) = RandomLp::new(20, 2, 10, 0.3).generate(4).unwrap();
        let lp = lp.to_one_sided();
        let ctx = DualContext::new(&lp);
        let y_eq = vec![0.0; lp.num_equalities()];
        let y_ineq = vec![0.0; lp.num_inequalities()];
        // zero costs everywhere so every variable is a tie
        let zero = vec![0.0; lp.num_variables()];
        let a = ctx.primal_from_cost(&zero, TieMethod::Round, &mut SplitMix64::new(3));
        let b = ctx.primal_from_cost(&zero, TieMethod::Round, &mut SplitMix64::new(3));
        assert_eq!(a, b);

        let (c1, x1) = ctx.get_optim_x(&y_eq, &y_ineq, TieMethod::Round, &mut SplitMix64::new(3));
        let (c2, x2) = ctx.get_optim_x(&y_eq, &y_ineq, TieMethod::Round, &mut SplitMix64::new(3));
        assert_eq!(c1, c2);
        assert_eq!(x1, x2);
    }

    #[test]
    fn test_rounding_start_nudges_ties() {
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &[-3.0, 2.0, 0.0]).unwrap();
        let lp = lp.to_one_sided();
        let ctx = DualContext::new(&lp);
        let x = ctx.rounding_start(&[0.0, 0.0, 0.0], 0.1, &mut SplitMix64::new(0));
        assert_abs_diff_eq!(x[0], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.6, epsilon = 1e-12);
        assert_eq!(x[2], 0.5);
    }

    #[test]
    fn test_rounding_start_nudge_is_not_clipped() {
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 2.0, f64::NEG_INFINITY], &[0.1, 2.0, 1.0], &[1.0, -1.0, 1.0]).unwrap();
        let lp = lp.to_one_sided();
        let ctx = DualContext::new(&lp);
        let x = ctx.rounding_start(&[0.0, 0.0, 0.0], 0.1, &mut SplitMix64::new(0));
        assert_abs_diff_eq!(x[0], 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.9, epsilon = 1e-12);
        // half-infinite boxes keep their finite bound
        assert_eq!(x[2], 1.0);
    }

    #[test]
    fn test_incremental_updates_match_recomputation() {
        let (lp, _) = RandomLp::new(15, 2, 8, 0.4).generate(21).unwrap();
        let lp = lp.to_one_sided();
        let ctx = DualContext::new(&lp);
        let mut state = DualState::new(&ctx, vec![0.0; lp.num_equalities()], vec![0.0; lp.num_inequalities()]);
        for i in 0..lp.num_equalities() {
            state.step_equality(&ctx, i, 0.25 * (i as f64 + 1.0));
        }
        for i in 0..lp.num_inequalities() {
            let applied = state.step_inequality(&ctx, i, if i % 2 == 0 { 0.5 } else { -0.5 });
            assert!(applied == 0.5 || applied == 0.0);
        }
        assert!(state.y_ineq.iter().all(|&y| y >= 0.0));
        let fresh = ctx.linearized_cost(&state.y_eq, &state.y_ineq);
        for (a, b) in state.c_bar.iter().zip(&fresh) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_weak_duality_on_random_lps() {
        for seed in 0..10 {
            let (lp, feasible) = RandomLp::new(30, 1, 30, 0.2).generate(seed).unwrap();
            let lp = lp.to_one_sided();
            let ctx = DualContext::new(&lp);
            let primal = lp.objective(&feasible);
            let mut rng = SplitMix64::new(seed + 100);
            for _ in 0..20 {
                let y_eq: Vec<f64> = (0..lp.num_equalities()).map(|_| rng.next_normal()).collect();
                let y_ineq: Vec<f64> = (0..lp.num_inequalities()).map(|_| rng.next_f64() * 2.0).collect();
                let dual = ctx.evaluate(&y_eq, &y_ineq);
                assert!(dual <= primal + 1e-9, "seed {}: dual {} > primal {}", seed, dual, primal);
            }
        }
    }
}
