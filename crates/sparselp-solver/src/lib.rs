mod coordinate;
mod error;
mod gradient;
mod line_search;
mod problem;
mod random;
mod recovery;
mod rng;
mod rounding;
mod settings;
mod solution;
mod sparse;

pub use coordinate::{DualCoordinateAscent, solve_dual_coordinate_ascent};
pub use error::{SolverError, SolverResult};
pub use gradient::{DualGradientAscent, solve_dual_gradient_ascent};
pub use line_search::{BreakpointProfile, SearchDirection, exact_line_search};
pub use problem::{OneSidedLp, SparseLp};
pub use random::RandomLp;
pub use recovery::{DualContext, DualState};
pub use rng::SplitMix64;
pub use rounding::{GreedyRounder, RoundedPoint, Rounder};
pub use settings::{DualAscentSettings, TieMethod};
pub use solution::{ConstraintViolation, DualSolution, Progress, SolveStatus, WarmStart};
