//! Dual gradient ascent baseline.
//!
//! One step per outer iteration along the (gated) constraint residuals, with
//! an exact line search for the step length. Slower than coordinate ascent;
//! kept as a reference point for it.

use std::time::Duration;

use crate::error::SolverResult;
use crate::line_search::SearchDirection;
use crate::problem::{OneSidedLp, SparseLp};
use crate::recovery::{DualContext, DualState};
use crate::rng::SplitMix64;
use crate::settings::{Deadline, DualAscentSettings};
use crate::solution::{DualSolution, Progress, SolveStatus, WarmStart};

/// Dual gradient ascent solver
#[derive(Debug, Clone)]
pub struct DualGradientAscent {
    settings: DualAscentSettings,
}

impl Default for DualGradientAscent {
    fn default() -> Self {
        Self::new()
    }
}

impl DualGradientAscent {
    pub fn new() -> Self {
        Self {
            settings: DualAscentSettings::gradient(),
        }
    }

    pub fn with_settings(mut self, settings: DualAscentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.settings.max_iterations = max;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.settings.max_time = Some(max_time);
        self
    }

    pub fn settings(&self) -> &DualAscentSettings {
        &self.settings
    }

    /// Solve from a random dual point drawn from the seeded generator.
    pub fn solve(&self, lp: &SparseLp) -> SolverResult<DualSolution> {
        self.solve_with(lp, WarmStart::default(), None)
    }

    pub fn solve_with(
        &self,
        lp: &SparseLp,
        warm_start: WarmStart,
        callback: Option<&mut dyn FnMut(&Progress<'_>)>,
    ) -> SolverResult<DualSolution> {
        self.solve_one_sided(&lp.to_one_sided(), warm_start, callback)
    }

    pub fn solve_one_sided(
        &self,
        lp: &OneSidedLp,
        warm_start: WarmStart,
        mut callback: Option<&mut dyn FnMut(&Progress<'_>)>,
    ) -> SolverResult<DualSolution> {
        let settings = &self.settings;
        settings.validate()?;
        let warm_start = warm_start.validate(lp)?;
        let deadline = Deadline::start(settings.max_time);

        let ctx = DualContext::new(lp);
        let mut rng = SplitMix64::new(settings.seed);
        let y_eq = warm_start
            .y_eq
            .unwrap_or_else(|| (0..lp.num_equalities()).map(|_| -rng.next_f64()).collect());
        let y_ineq = warm_start
            .y_ineq
            .unwrap_or_else(|| (0..lp.num_inequalities()).map(|_| rng.next_f64()).collect());
        let mut state = DualState::new(&ctx, y_eq, y_ineq);

        let mut energy = state.dual_objective(&ctx);
        log::info!("iter 0 dual objective {:.6}", energy);
        if energy == f64::NEG_INFINITY {
            log::warn!("initial dual point has objective -inf; bound the variables or supply finite duals");
            let x = ctx.primal_from_cost(&state.c_bar, settings.tie_method, &mut rng);
            return Ok(state.into_solution(&ctx, SolveStatus::InfeasibleStart, x, 0, deadline.elapsed(), 0));
        }

        let mut status = SolveStatus::IterationLimit;
        let mut iterations = 0;
        let mut warnings = 0;
        let lower = lp.lower_bounds();
        let upper = lp.upper_bounds();

        for iteration in 0..settings.max_iterations {
            let x = ctx.primal_from_cost(&state.c_bar, settings.tie_method, &mut rng);

            if lp.num_inequalities() > 0 {
                let mut g = lp.inequality_residual(&x);
                for (gi, &y) in g.iter_mut().zip(&state.y_ineq) {
                    if y <= 0.0 {
                        *gi = gi.max(0.0);
                    }
                }
                // ascend only when some dual can decrease
                if g.iter().any(|&gi| gi < 0.0) {
                    let direction = SearchDirection::along(&g, lp.inequality_matrix(), lp.inequality_rhs());
                    let alpha = direction.profile(&state.c_bar, lower, upper).maximizer(&mut rng);
                    // largest step keeping every dual nonnegative
                    let max_step = g
                        .iter()
                        .zip(&state.y_ineq)
                        .filter(|&(&gi, _)| gi < 0.0)
                        .map(|(&gi, &y)| y / -gi)
                        .fold(f64::INFINITY, f64::min);
                    let step = alpha.max(0.0).min(max_step);
                    if step.is_finite() {
                        for (y, &gi) in state.y_ineq.iter_mut().zip(&g) {
                            *y = (*y + step * gi).max(0.0);
                        }
                    } else {
                        log::warn!("unbounded inequality step at iteration {}, skipping", iteration);
                    }
                    log::debug!("inequality step {} (line search {}, cap {})", step, alpha, max_step);
                }
            }

            if lp.num_equalities() > 0 {
                let h = lp.equality_residual(&x);
                if h.iter().any(|&hi| hi != 0.0) {
                    state.refresh(&ctx);
                    let direction = SearchDirection::along(&h, lp.equality_matrix(), lp.equality_rhs());
                    let alpha = direction.profile(&state.c_bar, lower, upper).maximizer(&mut rng);
                    if alpha.is_finite() {
                        for (y, &hi) in state.y_eq.iter_mut().zip(&h) {
                            *y += alpha * hi;
                        }
                    } else {
                        log::warn!("unbounded equality step {} at iteration {}, skipping", alpha, iteration);
                    }
                }
            }

            state.refresh(&ctx);
            let new_energy = state.dual_objective(&ctx);
            if new_energy + settings.monotonicity_tolerance < energy {
                log::warn!("dual objective decreased: {} -> {}", energy, new_energy);
                warnings += 1;
            }
            energy = new_energy;
            iterations = iteration + 1;

            if iteration % settings.report_every == 0 {
                log::info!(
                    "iter {} time {:.1}s dual objective {:.6} max violation {:.3e} sum violation {:.3e}",
                    iteration,
                    deadline.elapsed().as_secs_f64(),
                    energy,
                    lp.max_constraint_violation(&x),
                    lp.sum_constraint_violation(&x)
                );
                if let Some(callback) = callback.as_deref_mut() {
                    callback(&Progress {
                        iteration,
                        x: &x,
                        elapsed: deadline.elapsed(),
                        dual_objective: energy,
                    });
                }
            }
            if deadline.expired() {
                status = SolveStatus::TimeLimit;
                break;
            }
        }

        let x = ctx.primal_from_cost(&state.c_bar, settings.tie_method, &mut rng);
        Ok(state.into_solution(&ctx, status, x, iterations, deadline.elapsed(), warnings))
    }
}

/// Run dual gradient ascent with default settings apart from the arguments.
pub fn solve_dual_gradient_ascent(
    lp: &SparseLp,
    max_iterations: usize,
    callback: Option<&mut dyn FnMut(&Progress<'_>)>,
    y_eq0: Option<Vec<f64>>,
    y_ineq0: Option<Vec<f64>>,
    max_time: Option<Duration>,
) -> SolverResult<DualSolution> {
    let settings = DualAscentSettings {
        max_iterations,
        max_time,
        ..DualAscentSettings::gradient()
    };
    let warm_start = WarmStart {
        y_eq: y_eq0,
        y_ineq: y_ineq0,
    };
    DualGradientAscent::new()
        .with_settings(settings)
        .solve_with(lp, warm_start, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::random::RandomLp;
    use approx::assert_abs_diff_eq;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_unbounded_variable_gives_infeasible_start() {
        // x1 has no lower bound and a positive cost outside every constraint
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, f64::NEG_INFINITY], &[1.0, 1.0], &[-1.0, 1.0]).unwrap();
        lp.add_inequality(&[(0, 1.0)], f64::NEG_INFINITY, 0.5).unwrap();

        let solution = DualGradientAscent::new().solve(&lp).unwrap();
        assert_eq!(solution.status, SolveStatus::InfeasibleStart);
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.dual_objective, f64::NEG_INFINITY);
        assert!(solution.y_ineq[0] >= 0.0 && solution.y_ineq[0] < 1.0);
    }

    #[test]
    fn test_single_inequality_reaches_the_optimum() {
        // min -x0 - x1 over [0, 1]^2 with x0 + x1 <= 1, starting from y = 3
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0], &[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        lp.add_inequality(&[(0, 1.0), (1, 1.0)], f64::NEG_INFINITY, 1.0).unwrap();

        let solution = DualGradientAscent::new()
            .with_max_iterations(5)
            .solve_with(&lp, WarmStart::new().with_y_ineq(vec![3.0]), None)
            .unwrap();
        assert_eq!(solution.status, SolveStatus::IterationLimit);
        assert_eq!(solution.iterations, 5);
        assert_abs_diff_eq!(solution.y_ineq[0], 1.0);
        assert_abs_diff_eq!(solution.dual_objective, -1.0);
        assert_eq!(solution.monotonicity_warnings, 0);
    }

    #[test]
    fn test_nonnegative_gradient_leaves_inequality_duals_alone() {
        // x = (1, 1) overshoots x0 + x1 <= 1 but y = 0 has no decreasing direction
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0], &[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        lp.add_inequality(&[(0, 1.0), (1, 1.0)], f64::NEG_INFINITY, 1.0).unwrap();

        for y0 in [0.0, 0.25] {
            let solution = DualGradientAscent::new()
                .with_max_iterations(1)
                .solve_with(&lp, WarmStart::new().with_y_ineq(vec![y0]), None)
                .unwrap();
            assert_eq!(solution.iterations, 1);
            assert_eq!(solution.y_ineq, vec![y0]);
        }
    }

    #[test]
    fn test_equality_step() {
        // min x0 + 2 x1 over [0, 1]^2 with x0 + x1 == 1
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0], &[1.0, 1.0], &[1.0, 2.0]).unwrap();
        lp.add_equality(&[(0, 1.0), (1, 1.0)], 1.0).unwrap();

        let solution = DualGradientAscent::new()
            .with_max_iterations(3)
            .solve_with(&lp, WarmStart::new().with_y_eq(vec![0.0]), None)
            .unwrap();
        assert_abs_diff_eq!(solution.dual_objective, 1.0, epsilon = 1e-12);
        assert!(solution.y_eq[0] >= -2.0 && solution.y_eq[0] <= -1.0);
    }

    #[test]
    fn test_random_lps_ascend_monotonically() {
        init_logger();
        for seed in 0..5 {
            let (lp, feasible) = RandomLp::new(30, 1, 30, 0.2).generate(seed).unwrap();
            let settings = DualAscentSettings::gradient().with_max_iterations(60).with_report_every(1);
            let mut duals = Vec::new();
            let solution = DualGradientAscent::new()
                .with_settings(settings)
                .solve_with(&lp, WarmStart::default(), Some(&mut |p| duals.push(p.dual_objective)))
                .unwrap();

            assert_eq!(solution.status, SolveStatus::IterationLimit);
            assert_eq!(solution.iterations, 60);
            assert_eq!(duals.len(), 60);
            assert!(solution.y_ineq.iter().all(|&y| y >= 0.0));
            for w in duals.windows(2) {
                assert!(w[1] >= w[0] - 1e-6, "seed {}: dual went from {} to {}", seed, w[0], w[1]);
            }
            assert!(solution.dual_objective <= lp.objective(&feasible) + 1e-9);
        }
    }

    #[test]
    fn test_callback_cadence() {
        let (lp, _) = RandomLp::new(10, 1, 8, 0.5).generate(2).unwrap();
        let mut reported = Vec::new();
        DualGradientAscent::new()
            .with_max_iterations(250)
            .solve_with(&lp, WarmStart::default(), Some(&mut |p| reported.push(p.iteration)))
            .unwrap();
        assert_eq!(reported, vec![0, 100, 200]);
    }

    #[test]
    fn test_rejects_negative_duals() {
        let (lp, _) = RandomLp::new(10, 0, 8, 0.5).generate(2).unwrap();
        let n_ineq = lp.to_one_sided().num_inequalities();
        let mut y = vec![0.0; n_ineq];
        y[0] = -0.1;
        let result = solve_dual_gradient_ascent(&lp, 10, None, None, Some(y), None);
        assert_eq!(result.unwrap_err(), SolverError::NegativeInequalityDual { index: 0, value: -0.1 });
    }

    #[test]
    fn test_zero_time_budget_stops_after_first_iteration() {
        let (lp, _) = RandomLp::new(10, 1, 8, 0.5).generate(5).unwrap();
        let solution = solve_dual_gradient_ascent(&lp, 1000, None, None, None, Some(Duration::ZERO)).unwrap();
        assert_eq!(solution.status, SolveStatus::TimeLimit);
        assert_eq!(solution.iterations, 1);
    }
}
