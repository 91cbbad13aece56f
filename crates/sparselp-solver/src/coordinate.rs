//! Dual coordinate ascent.
//!
//! Each outer iteration sweeps the equality rows and then the violated
//! inequality rows, moving one dual at a time to the exact maximizer of the
//! dual objective along that coordinate. When an inequality sweep no longer
//! improves the dual, the recovered primal point is handed to a [`Rounder`]
//! to look for a feasible primal certificate.

use std::time::Duration;

use crate::error::SolverResult;
use crate::line_search::exact_line_search;
use crate::problem::{OneSidedLp, SparseLp};
use crate::recovery::{DualContext, DualState};
use crate::rng::SplitMix64;
use crate::rounding::{GreedyRounder, Rounder};
use crate::settings::{Deadline, DualAscentSettings};
use crate::solution::{DualSolution, Progress, SolveStatus, WarmStart};

/// Dual coordinate ascent solver
#[derive(Debug, Clone)]
pub struct DualCoordinateAscent<R = GreedyRounder> {
    settings: DualAscentSettings,
    rounder: R,
}

impl Default for DualCoordinateAscent {
    fn default() -> Self {
        Self::new()
    }
}

impl DualCoordinateAscent {
    pub fn new() -> Self {
        Self {
            settings: DualAscentSettings::default(),
            rounder: GreedyRounder::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Completed,
    TimedOut,
}

impl<R: Rounder> DualCoordinateAscent<R> {
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

    /// Replace the rounder used to recover feasible primal points.
    pub fn with_rounder<S: Rounder>(self, rounder: S) -> DualCoordinateAscent<S> {
        DualCoordinateAscent {
            settings: self.settings,
            rounder,
        }
    }

    pub fn settings(&self) -> &DualAscentSettings {
        &self.settings
    }

    /// Solve from zero duals.
    pub fn solve(&self, lp: &SparseLp) -> SolverResult<DualSolution> {
        self.solve_with(lp, WarmStart::default(), None)
    }

    /// Solve from the given duals, reporting progress once per outer iteration.
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
        let y_eq = warm_start.y_eq.unwrap_or_else(|| vec![0.0; lp.num_equalities()]);
        let y_ineq = warm_start.y_ineq.unwrap_or_else(|| vec![0.0; lp.num_inequalities()]);
        let mut state = DualState::new(&ctx, y_eq, y_ineq);

        let mut energy = state.dual_objective(&ctx);
        log::info!("iter 0 dual objective {:.6}", energy);
        let mut x = ctx.primal_from_cost(&state.c_bar, settings.tie_method, &mut rng);

        let mut status = SolveStatus::IterationLimit;
        let mut iterations = 0;
        let mut warnings = 0;

        for iteration in 0..settings.max_iterations {
            state.refresh(&ctx);
            let residual = lp.equality_residual(&x);
            if self.sweep_equalities(&ctx, &mut state, &residual, &deadline, &mut rng) == Sweep::TimedOut {
                status = SolveStatus::TimeLimit;
                break;
            }

            state.refresh(&ctx);
            let after_equalities = state.dual_objective(&ctx);
            if after_equalities + settings.monotonicity_tolerance < energy {
                log::warn!(
                    "dual objective decreased during equality sweep: {} -> {}",
                    energy,
                    after_equalities
                );
                warnings += 1;
            }
            energy = after_equalities;

            let sweep_start = ctx.primal_from_cost(&state.c_bar, settings.tie_method, &mut rng);
            let mut residual = lp.inequality_residual(&sweep_start);
            for (r, &y) in residual.iter_mut().zip(&state.y_ineq) {
                // a zero dual can only grow
                if y <= 0.0 {
                    *r = r.max(0.0);
                }
            }
            if self.sweep_inequalities(&ctx, &mut state, &residual, &deadline, &mut rng) == Sweep::TimedOut {
                status = SolveStatus::TimeLimit;
                break;
            }

            state.refresh(&ctx);
            let new_energy = state.dual_objective(&ctx);
            if new_energy + settings.monotonicity_tolerance < energy {
                log::warn!(
                    "dual objective decreased during inequality sweep: {} -> {}",
                    energy,
                    new_energy
                );
                warnings += 1;
            }

            x = ctx.rounding_start(&state.c_bar, settings.tie_nudge, &mut rng);
            let stalled = new_energy < energy + settings.monotonicity_tolerance;
            if stalled {
                let order = rounding_order(&x);
                let fixed: Vec<bool> = state.c_bar.iter().map(|&c| c != 0.0).collect();
                let rounded = self.rounder.round(&x, lp, &order, &fixed, settings.rounding_passes);
                log::debug!("rounding at iteration {} valid: {}", iteration, rounded.valid);
                x = rounded.x;
            }
            iterations = iteration + 1;

            let mut finished = None;
            if iteration % settings.report_every == 0 {
                let primal = lp.objective(&x);
                let max_violation = lp.max_constraint_violation(&x);
                log::info!(
                    "iter {} time {:.1}s dual objective {:.6} primal {:.6} max violation {:.3e} sum violation {:.3e}",
                    iteration,
                    deadline.elapsed().as_secs_f64(),
                    new_energy,
                    primal,
                    max_violation,
                    lp.sum_constraint_violation(&x)
                );
                if lp.check_solution(&x, settings.feasibility_tolerance) {
                    log::info!("feasible primal solution with objective {:.6}", primal);
                    if (primal - new_energy).abs() <= settings.optimality_tolerance {
                        log::info!("primal and dual objectives match, stopping");
                        finished = Some(SolveStatus::Optimal);
                    } else if stalled {
                        log::info!("dual objective stalled, stopping");
                        finished = Some(SolveStatus::Stalled);
                    }
                    if primal < new_energy - settings.optimality_tolerance {
                        log::warn!("primal objective {} below dual objective {}", primal, new_energy);
                    }
                }
            }

            energy = new_energy;
            if let Some(callback) = callback.as_deref_mut() {
                callback(&Progress {
                    iteration,
                    x: &x,
                    elapsed: deadline.elapsed(),
                    dual_objective: energy,
                });
            }
            if let Some(done) = finished {
                status = done;
                break;
            }
            if deadline.expired() {
                status = SolveStatus::TimeLimit;
                break;
            }
        }

        Ok(state.into_solution(&ctx, status, x, iterations, deadline.elapsed(), warnings))
    }

    fn sweep_equalities(
        &self,
        ctx: &DualContext<'_>,
        state: &mut DualState,
        residual: &[f64],
        deadline: &Deadline,
        rng: &mut SplitMix64,
    ) -> Sweep {
        let lp = ctx.lp();
        for (i, &r) in residual.iter().enumerate() {
            if r == 0.0 {
                continue;
            }
            if i % self.settings.time_check_every == 0 && deadline.expired() {
                return Sweep::TimedOut;
            }
            let Some(row) = lp.equality_matrix().outer_view(i) else {
                continue;
            };
            let alpha = exact_line_search(
                row.indices(),
                row.data(),
                lp.equality_rhs()[i],
                &state.c_bar,
                lp.lower_bounds(),
                lp.upper_bounds(),
                rng,
            );
            if !alpha.is_finite() {
                log::warn!("unbounded step {} on equality row {}, skipping", alpha, i);
                continue;
            }
            state.step_equality(ctx, i, alpha);
        }
        Sweep::Completed
    }

    fn sweep_inequalities(
        &self,
        ctx: &DualContext<'_>,
        state: &mut DualState,
        residual: &[f64],
        deadline: &Deadline,
        rng: &mut SplitMix64,
    ) -> Sweep {
        let lp = ctx.lp();
        for (i, &r) in residual.iter().enumerate() {
            if r == 0.0 {
                continue;
            }
            if i % self.settings.time_check_every == 0 && deadline.expired() {
                return Sweep::TimedOut;
            }
            let Some(row) = lp.inequality_matrix().outer_view(i) else {
                continue;
            };
            let alpha = exact_line_search(
                row.indices(),
                row.data(),
                lp.inequality_rhs()[i],
                &state.c_bar,
                lp.lower_bounds(),
                lp.upper_bounds(),
                rng,
            );
            // -inf only pushes the dual down to zero
            if alpha.is_nan() || alpha == f64::INFINITY {
                log::warn!("unbounded step {} on inequality row {}, skipping", alpha, i);
                continue;
            }
            let applied = state.step_inequality(ctx, i, alpha);
            log::trace!("inequality row {}: step {} applied {}", i, alpha, applied);
        }
        Sweep::Completed
    }
}

/// Variables closest to a 0/1 decision first.
fn rounding_order(x: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..x.len()).collect();
    order.sort_by(|&a, &b| (x[a] - 0.5).abs().total_cmp(&(x[b] - 0.5).abs()));
    order
}

/// Run dual coordinate ascent with default settings apart from the arguments.
pub fn solve_dual_coordinate_ascent(
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
        ..DualAscentSettings::default()
    };
    let warm_start = WarmStart {
        y_eq: y_eq0,
        y_ineq: y_ineq0,
    };
    DualCoordinateAscent::new()
        .with_settings(settings)
        .solve_with(lp, warm_start, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::random::RandomLp;
    use crate::rounding::RoundedPoint;
    use approx::assert_abs_diff_eq;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// min x0 + 2 x1, x in [0, 1]^2, x0 + x1 == 1
    fn cheapest_of_two() -> SparseLp {
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0], &[1.0, 1.0], &[1.0, 2.0]).unwrap();
        lp.add_equality(&[(0, 1.0), (1, 1.0)], 1.0).unwrap();
        lp
    }

    /// min -x0 - x1, x in [0, 1]^2, x0 + x1 <= 1
    fn pick_one() -> SparseLp {
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0, 0.0], &[1.0, 1.0], &[-1.0, -1.0]).unwrap();
        lp.add_inequality(&[(0, 1.0), (1, 1.0)], f64::NEG_INFINITY, 1.0).unwrap();
        lp
    }

    #[test]
    fn test_equality_instance_is_certified_in_one_iteration() {
        init_logger();
        let solution = DualCoordinateAscent::new().solve(&cheapest_of_two()).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.x, vec![1.0, 0.0]);
        assert_eq!(solution.primal_objective, 1.0);
        assert!((solution.dual_objective - 1.0).abs() <= 1e-9);
        assert!(solution.y_eq[0] >= -2.0 && solution.y_eq[0] < -1.0);
    }

    #[test]
    fn test_inequality_instance_needs_rounding() {
        init_logger();
        let mut seen = Vec::new();
        let solution = DualCoordinateAscent::new()
            .solve_with(
                &pick_one(),
                WarmStart::default(),
                Some(&mut |p| seen.push((p.iteration, p.x.to_vec(), p.dual_objective))),
            )
            .unwrap();

        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.iterations, 2);
        assert_eq!(solution.x, vec![1.0, 0.0]);
        assert_eq!(solution.y_ineq, vec![1.0]);
        assert_eq!(solution.dual_objective, -1.0);
        assert_eq!(solution.primal_objective, -1.0);

        assert_eq!(seen.len(), 2);
        // first iteration: fractional midpoint nudged towards the cheaper side
        assert_eq!(seen[0].0, 0);
        for &v in &seen[0].1 {
            assert!((v - 0.4).abs() < 1e-12);
        }
        assert_eq!(seen[0].2, -1.0);
        assert_eq!(seen[1].1, vec![1.0, 0.0]);
    }

    #[test]
    fn test_iteration_limit() {
        let solution = DualCoordinateAscent::new()
            .with_max_iterations(1)
            .solve(&pick_one())
            .unwrap();
        assert_eq!(solution.status, SolveStatus::IterationLimit);
        assert_eq!(solution.iterations, 1);
        assert_eq!(solution.y_ineq, vec![1.0]);

        let untouched = DualCoordinateAscent::new().with_max_iterations(0).solve(&pick_one()).unwrap();
        assert_eq!(untouched.status, SolveStatus::IterationLimit);
        assert_eq!(untouched.iterations, 0);
        assert_eq!(untouched.y_ineq, vec![0.0]);
        assert_eq!(untouched.dual_objective, -2.0);
    }

    #[test]
    fn test_zero_time_budget() {
        let solution = DualCoordinateAscent::new()
            .with_max_time(Duration::ZERO)
            .solve(&cheapest_of_two())
            .unwrap();
        assert_eq!(solution.status, SolveStatus::TimeLimit);
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.y_eq, vec![0.0]);
    }

    #[test]
    fn test_rejects_bad_warm_starts() {
        let solver = DualCoordinateAscent::new();
        let negative = solver.solve_with(&pick_one(), WarmStart::new().with_y_ineq(vec![-1.0]), None);
        assert_eq!(
            negative.unwrap_err(),
            SolverError::NegativeInequalityDual { index: 0, value: -1.0 }
        );

        let wrong_length = solver.solve_with(&pick_one(), WarmStart::new().with_y_ineq(vec![0.0, 0.0]), None);
        assert!(matches!(
            wrong_length,
            Err(SolverError::DimensionMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_warm_start_at_optimal_duals() {
        let solution = DualCoordinateAscent::new()
            .solve_with(&pick_one(), WarmStart::new().with_y_ineq(vec![1.0]), None)
            .unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.primal_objective, -1.0);
    }

    struct KeepAsIs;

    impl Rounder for KeepAsIs {
        fn round(&self, x: &[f64], _: &OneSidedLp, _: &[usize], _: &[bool], _: usize) -> RoundedPoint {
            RoundedPoint {
                x: x.to_vec(),
                valid: false,
            }
        }
    }

    #[test]
    fn test_custom_rounder_without_certificate_stalls() {
        // (0.4, 0.4) is feasible but never matches the dual objective
        let solution = DualCoordinateAscent::new()
            .with_rounder(KeepAsIs)
            .solve(&pick_one())
            .unwrap();
        assert_eq!(solution.status, SolveStatus::Stalled);
        assert_eq!(solution.iterations, 2);
        assert!((solution.primal_objective + 0.8).abs() < 1e-12);
        assert!(solution.gap() > 0.0);
    }

    #[test]
    fn test_narrow_box_start_is_not_accepted_until_rounded() {
        // x0 in [0, 0.1] with x0 == 0.05: the nudged start 0.15 leaves the box
        let mut lp = SparseLp::new();
        lp.add_variable(0.0, 0.1, 1.0).unwrap();
        lp.add_equality(&[(0, 1.0)], 0.05).unwrap();

        let mut starts = Vec::new();
        let solution = DualCoordinateAscent::new()
            .solve_with(&lp, WarmStart::default(), Some(&mut |p| starts.push(p.x[0])))
            .unwrap();
        assert_abs_diff_eq!(starts[0], 0.15, epsilon = 1e-12);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.iterations, 2);
        assert_eq!(solution.x, vec![0.05]);
        assert_abs_diff_eq!(solution.dual_objective, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_assignment_instance() {
        // two workers, two tasks; each worker takes one task, each task at most one worker
        // cost [[1, 3], [2, 5]], optimum 5 with worker 0 -> task 1, worker 1 -> task 0
        let mut lp = SparseLp::new();
        lp.add_variables(&[0.0; 4], &[1.0; 4], &[1.0, 3.0, 2.0, 5.0]).unwrap();
        lp.add_equality(&[(0, 1.0), (1, 1.0)], 1.0).unwrap();
        lp.add_equality(&[(2, 1.0), (3, 1.0)], 1.0).unwrap();
        lp.add_inequality(&[(0, 1.0), (2, 1.0)], f64::NEG_INFINITY, 1.0).unwrap();
        lp.add_inequality(&[(1, 1.0), (3, 1.0)], f64::NEG_INFINITY, 1.0).unwrap();

        let solution = DualCoordinateAscent::new().with_max_iterations(50).solve(&lp).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.x, vec![0.0, 1.0, 1.0, 0.0]);
        assert!(lp.check_solution(&solution.x, 1e-9));
        assert_abs_diff_eq!(solution.primal_objective, 5.0, epsilon = 1e-8);
        assert_abs_diff_eq!(solution.dual_objective, 5.0, epsilon = 1e-8);
        assert!(solution.y_ineq.iter().all(|&y| y >= 0.0));
    }

    #[test]
    fn test_random_lps() {
        init_logger();
        for seed in 0..5 {
            let (lp, feasible) = RandomLp::new(30, 1, 30, 0.2).generate(seed).unwrap();
            let mut duals = Vec::new();
            let solution = DualCoordinateAscent::new()
                .solve_with(&lp, WarmStart::default(), Some(&mut |p| duals.push(p.dual_objective)))
                .unwrap();

            // greedy rounding rarely certifies these continuous boxes within 20 iterations,
            // so only the properties every run must satisfy are checked here
            assert!(solution.iterations <= 20);
            assert_eq!(duals.len(), solution.iterations);
            if solution.status == SolveStatus::IterationLimit {
                assert_eq!(solution.iterations, 20);
            }
            assert!(solution.y_ineq.iter().all(|&y| y >= 0.0));
            for w in duals.windows(2) {
                assert!(w[1] >= w[0] - 1e-6, "seed {}: dual went from {} to {}", seed, w[0], w[1]);
            }
            assert!(solution.dual_objective <= lp.objective(&feasible) + 1e-9);
            assert_eq!(solution.primal_objective, lp.objective(&solution.x));
            assert_eq!(solution.max_violation, lp.to_one_sided().max_constraint_violation(&solution.x));
            if solution.status == SolveStatus::Optimal {
                assert!(solution.max_violation <= 1e-9);
                assert!(solution.gap().abs() <= 1e-8);
            }
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let (lp, _) = RandomLp::new(20, 2, 15, 0.3).generate(9).unwrap();
        let a = DualCoordinateAscent::new().solve(&lp).unwrap();
        let b = DualCoordinateAscent::new().solve(&lp).unwrap();
        assert_eq!(a.y_eq, b.y_eq);
        assert_eq!(a.y_ineq, b.y_ineq);
        assert_eq!(a.x, b.x);
        assert_eq!(a.status, b.status);
    }

    #[test]
    fn test_free_function() {
        let solution = solve_dual_coordinate_ascent(&pick_one(), 20, None, None, None, None).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
    }
}
