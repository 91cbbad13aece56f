use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::{SolverError, SolverResult};

/// How primal recovery fills a variable whose linearized cost is exactly zero.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieMethod {
    /// Uniform draw in `[l, u]` from the solver's seeded generator
    #[default]
    Round,
    /// Midpoint of `[l, u]`
    Center,
}

impl FromStr for TieMethod {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round" => Ok(TieMethod::Round),
            "center" => Ok(TieMethod::Center),
            other => Err(SolverError::UnknownTieMethod(other.to_string())),
        }
    }
}

impl fmt::Display for TieMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieMethod::Round => f.write_str("round"),
            TieMethod::Center => f.write_str("center"),
        }
    }
}

/// Configuration shared by the dual coordinate and dual gradient ascent solvers.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DualAscentSettings {
    /// Maximum outer iterations
    pub max_iterations: usize,
    /// Wall-clock budget, checked cooperatively
    pub max_time: Option<Duration>,
    /// Seed of the tie-breaking generator
    pub seed: u64,
    /// Logging / termination-check cadence in outer iterations
    pub report_every: usize,
    /// Rows processed between wall-clock checks inside a sweep
    pub time_check_every: usize,
    /// Allowed decrease of the dual objective before warning
    pub monotonicity_tolerance: f64,
    /// Maximum violation accepted as feasible
    pub feasibility_tolerance: f64,
    /// Maximum primal/dual gap accepted as optimal
    pub optimality_tolerance: f64,
    /// Tie rule used when recovering the primal point for the inequality sweep
    pub tie_method: TieMethod,
    /// Offset `nudge * sign(c_j)` applied to tied variables before rounding
    pub tie_nudge: f64,
    /// Propagation passes granted to the rounder
    pub rounding_passes: usize,
}

impl Default for DualAscentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_time: None,
            seed: 1,
            report_every: 1,
            time_check_every: 100,
            monotonicity_tolerance: 1e-10,
            feasibility_tolerance: 1e-9,
            optimality_tolerance: 1e-9,
            tie_method: TieMethod::Round,
            tie_nudge: 0.1,
            rounding_passes: 30,
        }
    }
}

impl DualAscentSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the gradient ascent baseline: more, cheaper iterations.
    pub fn gradient() -> Self {
        Self {
            max_iterations: 1000,
            seed: 0,
            report_every: 100,
            tie_method: TieMethod::Center,
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_report_every(mut self, every: usize) -> Self {
        self.report_every = every;
        self
    }

    pub fn with_tie_method(mut self, tie_method: TieMethod) -> Self {
        self.tie_method = tie_method;
        self
    }

    pub fn with_feasibility_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    pub fn with_optimality_tolerance(mut self, tol: f64) -> Self {
        self.optimality_tolerance = tol;
        self
    }

    pub fn validate(&self) -> SolverResult<()> {
        if self.report_every == 0 {
            return Err(SolverError::InvalidSetting("report_every must be at least 1".into()));
        }
        if self.time_check_every == 0 {
            return Err(SolverError::InvalidSetting("time_check_every must be at least 1".into()));
        }
        let tolerances = [
            ("monotonicity_tolerance", self.monotonicity_tolerance),
            ("feasibility_tolerance", self.feasibility_tolerance),
            ("optimality_tolerance", self.optimality_tolerance),
        ];
        for (name, value) in tolerances {
            if value.is_nan() || value < 0.0 {
                return Err(SolverError::InvalidSetting(format!("{} must be nonnegative, got {}", name, value)));
            }
        }
        if !self.tie_nudge.is_finite() {
            return Err(SolverError::InvalidSetting("tie_nudge must be finite".into()));
        }
        Ok(())
    }
}

/// Cooperative wall-clock budget of one solve.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub(crate) fn start(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// A zero budget is expired from the start.
    pub(crate) fn expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.start.elapsed() >= budget)
    }
}
