use std::time::Duration;

use crate::error::{SolverError, SolverResult};
use crate::problem::{OneSidedLp, check_dimension};

/// The result of a dual ascent solve
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct DualSolution {
    /// Why the solver stopped
    pub status: SolveStatus,
    /// Primal point at termination (rounded for coordinate ascent, fractional for gradient ascent)
    pub x: Vec<f64>,
    /// Equality duals
    pub y_eq: Vec<f64>,
    /// Inequality duals (all >= 0)
    pub y_ineq: Vec<f64>,
    /// Dual objective at `(y_eq, y_ineq)`
    pub dual_objective: f64,
    /// `c·x`
    pub primal_objective: f64,
    /// Largest violation of the one-sided constraints by `x`
    pub max_violation: f64,
    /// Summed violation of the one-sided constraints by `x`
    pub sum_violation: f64,
    /// Completed outer iterations
    pub iterations: usize,
    /// Wall-clock time spent
    pub elapsed: Duration,
    /// Number of times the dual objective went down by more than the tolerance
    pub monotonicity_warnings: usize,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A feasible primal point matches the dual objective
    Optimal,
    /// A feasible primal point was found but the dual objective stopped improving
    Stalled,
    /// The iteration budget ran out
    IterationLimit,
    /// The wall-clock budget ran out
    TimeLimit,
    /// The starting dual point has objective -inf (some unbounded variable has a nonzero reduced cost)
    InfeasibleStart,
}

impl SolveStatus {
    pub fn is_optimal(self) -> bool {
        self == SolveStatus::Optimal
    }
}

impl DualSolution {
    /// Gap between the primal objective of `x` and the dual objective.
    pub fn gap(&self) -> f64 {
        self.primal_objective - self.dual_objective
    }
}

/// Snapshot handed to progress callbacks once per outer iteration.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub iteration: usize,
    pub x: &'a [f64],
    pub elapsed: Duration,
    pub dual_objective: f64,
}

/// Information about a violated constraint
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ConstraintViolation {
    /// Constraint name (`eq[i]` or `ineq[i]`)
    pub constraint: String,
    /// The bound the row activity should respect
    pub required: f64,
    /// Actual row activity
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

/// Optional starting duals for a solve.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmStart {
    pub y_eq: Option<Vec<f64>>,
    pub y_ineq: Option<Vec<f64>>,
}

impl WarmStart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_y_eq(mut self, y_eq: Vec<f64>) -> Self {
        self.y_eq = Some(y_eq);
        self
    }

    pub fn with_y_ineq(mut self, y_ineq: Vec<f64>) -> Self {
        self.y_ineq = Some(y_ineq);
        self
    }

    /// Check the supplied vectors against the one-sided LP.
    pub(crate) fn validate(self, lp: &OneSidedLp) -> SolverResult<Self> {
        if let Some(y_eq) = &self.y_eq {
            check_dimension("equality duals", lp.num_equalities(), y_eq.len())?;
        }
        if let Some(y_ineq) = &self.y_ineq {
            check_dimension("inequality duals", lp.num_inequalities(), y_ineq.len())?;
            if let Some((index, &value)) = y_ineq.iter().enumerate().find(|&(_, &v)| v.is_nan() || v < 0.0) {
                return Err(SolverError::NegativeInequalityDual { index, value });
            }
        }
        Ok(self)
    }
}
