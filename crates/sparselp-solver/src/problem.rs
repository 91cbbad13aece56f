use sprs::CsMat;

use crate::error::{SolverError, SolverResult};
use crate::solution::ConstraintViolation;
use crate::sparse;

/// A sparse linear program in builder form.
///
/// ```text
/// min_x  c'x
/// st     Aeq x == beq
///        lower <= Aineq x <= upper
///        l <= x <= u
/// ```
///
/// Rows are collected as triplets; CSR matrices are assembled on demand, when
/// a solver takes its private copy through [`SparseLp::to_one_sided`] or a
/// violation report is requested.
#[derive(Debug, Clone, Default)]
pub struct SparseLp {
    costs: Vec<f64>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
    eq_entries: Vec<(usize, usize, f64)>,
    b_eq: Vec<f64>,
    ineq_entries: Vec<(usize, usize, f64)>,
    b_lower: Vec<f64>,
    b_upper: Vec<f64>,
}

impl SparseLp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block of variables, returning the index of the first one.
    pub fn add_variables(&mut self, lower: &[f64], upper: &[f64], costs: &[f64]) -> SolverResult<usize> {
        let count = costs.len();
        check_dimension("lower bounds", count, lower.len())?;
        check_dimension("upper bounds", count, upper.len())?;
        let first = self.costs.len();
        for (k, (&l, &u)) in lower.iter().zip(upper).enumerate() {
            if l.is_nan() || u.is_nan() || l > u || l == f64::INFINITY || u == f64::NEG_INFINITY {
                return Err(SolverError::InvalidBounds { index: first + k, lower: l, upper: u });
            }
        }
        self.costs.extend_from_slice(costs);
        self.lower_bounds.extend_from_slice(lower);
        self.upper_bounds.extend_from_slice(upper);
        Ok(first)
    }

    pub fn add_variable(&mut self, lower: f64, upper: f64, cost: f64) -> SolverResult<usize> {
        self.add_variables(&[lower], &[upper], &[cost])
    }

    /// Add the equality `row · x == rhs`, returning its row index.
    pub fn add_equality(&mut self, row: &[(usize, f64)], rhs: f64) -> SolverResult<usize> {
        self.check_columns(row.iter().map(|&(j, _)| j))?;
        let index = self.b_eq.len();
        self.b_eq.push(rhs);
        self.eq_entries.extend(row.iter().map(|&(j, v)| (index, j, v)));
        Ok(index)
    }

    /// Add a block of equalities `a x == rhs` (CSR or CSC input).
    pub fn add_equalities(&mut self, a: &CsMat<f64>, rhs: &[f64]) -> SolverResult<()> {
        check_dimension("equality columns", self.num_variables(), a.cols())?;
        check_dimension("equality right-hand side", a.rows(), rhs.len())?;
        let offset = self.b_eq.len();
        self.b_eq.extend_from_slice(rhs);
        self.eq_entries.extend(sparse::triplets(a).map(|(i, j, v)| (offset + i, j, v)));
        Ok(())
    }

    /// Add the inequality `lower <= row · x <= upper`, returning its row index.
    ///
    /// Either side may be infinite.
    pub fn add_inequality(&mut self, row: &[(usize, f64)], lower: f64, upper: f64) -> SolverResult<usize> {
        self.check_columns(row.iter().map(|&(j, _)| j))?;
        let index = self.b_upper.len();
        check_row_bounds(index, lower, upper)?;
        self.b_lower.push(lower);
        self.b_upper.push(upper);
        self.ineq_entries.extend(row.iter().map(|&(j, v)| (index, j, v)));
        Ok(index)
    }

    /// Add a block of inequalities `lower <= a x <= upper`.
    ///
    /// A missing side is treated as unbounded.
    pub fn add_inequalities(
        &mut self,
        a: &CsMat<f64>,
        lower: Option<&[f64]>,
        upper: Option<&[f64]>,
    ) -> SolverResult<()> {
        check_dimension("inequality columns", self.num_variables(), a.cols())?;
        let rows = a.rows();
        let lower = lower.map_or_else(|| vec![f64::NEG_INFINITY; rows], <[f64]>::to_vec);
        let upper = upper.map_or_else(|| vec![f64::INFINITY; rows], <[f64]>::to_vec);
        check_dimension("inequality lower side", rows, lower.len())?;
        check_dimension("inequality upper side", rows, upper.len())?;
        let offset = self.b_upper.len();
        for (k, (&lo, &up)) in lower.iter().zip(&upper).enumerate() {
            check_row_bounds(offset + k, lo, up)?;
        }
        self.b_lower.extend(lower);
        self.b_upper.extend(upper);
        self.ineq_entries.extend(sparse::triplets(a).map(|(i, j, v)| (offset + i, j, v)));
        Ok(())
    }

    /// Equality block as a CSR matrix.
    pub fn equality_matrix(&self) -> CsMat<f64> {
        sparse::assemble((self.b_eq.len(), self.num_variables()), self.eq_entries.iter().copied())
    }

    /// Two-sided inequality block as a CSR matrix.
    pub fn inequality_matrix(&self) -> CsMat<f64> {
        sparse::assemble((self.b_upper.len(), self.num_variables()), self.ineq_entries.iter().copied())
    }

    pub fn num_variables(&self) -> usize {
        self.costs.len()
    }

    pub fn num_equalities(&self) -> usize {
        self.b_eq.len()
    }

    pub fn num_inequalities(&self) -> usize {
        self.b_upper.len()
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        sparse::dot(&self.costs, x)
    }

    /// Deep copy with every inequality rewritten as `Aᵢ x <= bᵢ`.
    ///
    /// Rows with a finite upper side keep `(Aᵢ, upperᵢ)`, rows with a finite
    /// lower side contribute `(-Aᵢ, -lowerᵢ)`, free rows are dropped.
    pub fn to_one_sided(&self) -> OneSidedLp {
        let n = self.num_variables();
        let a_ineq = self.inequality_matrix();
        let mut entries = Vec::with_capacity(2 * a_ineq.nnz());
        let mut b_upper = Vec::with_capacity(self.b_upper.len());
        for (i, row) in a_ineq.outer_iterator().enumerate() {
            if self.b_upper[i].is_finite() {
                let r = b_upper.len();
                entries.extend(row.iter().map(|(j, &v)| (r, j, v)));
                b_upper.push(self.b_upper[i]);
            }
            if self.b_lower[i].is_finite() {
                let r = b_upper.len();
                entries.extend(row.iter().map(|(j, &v)| (r, j, -v)));
                b_upper.push(-self.b_lower[i]);
            }
        }
        OneSidedLp {
            costs: self.costs.clone(),
            lower_bounds: self.lower_bounds.clone(),
            upper_bounds: self.upper_bounds.clone(),
            a_eq: self.equality_matrix(),
            b_eq: self.b_eq.clone(),
            a_ineq: sparse::assemble((b_upper.len(), n), entries),
            b_upper,
        }
    }

    /// Largest constraint violation of `x` (0 when every constraint holds).
    pub fn max_constraint_violation(&self, x: &[f64]) -> f64 {
        self.row_violations(x)
            .into_iter()
            .fold(0.0, |acc, (_, _, _, v)| acc.max(v))
    }

    /// Whether `x` satisfies bounds and constraints up to `tolerance`.
    pub fn check_solution(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.num_variables()
            && within_bounds(x, &self.lower_bounds, &self.upper_bounds, tolerance)
            && self.max_constraint_violation(x) <= tolerance
    }

    /// Rows violated by more than `tolerance`, worst first.
    pub fn violations(&self, x: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations: Vec<ConstraintViolation> = self
            .row_violations(x)
            .into_iter()
            .filter(|&(_, _, _, amount)| amount > tolerance)
            .map(|(name, required, actual, violation_amount)| {
                let description = format!("{} is off its bound {:.4} by {:.4}", name, required, violation_amount);
                ConstraintViolation {
                    constraint: name,
                    required,
                    actual,
                    violation_amount,
                    description,
                }
            })
            .collect();
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }

    /// `(name, violated bound, activity, amount)` for every row.
    fn row_violations(&self, x: &[f64]) -> Vec<(String, f64, f64, f64)> {
        let a_eq = self.equality_matrix();
        let a_ineq = self.inequality_matrix();
        let eq_rows = a_eq.outer_iterator().zip(&self.b_eq).enumerate().map(|(i, (row, &b))| {
            let activity = sparse::row_dot(row, x);
            (format!("eq[{}]", i), b, activity, (activity - b).abs())
        });
        let ineq_rows = a_ineq
            .outer_iterator()
            .zip(self.b_lower.iter().zip(&self.b_upper))
            .enumerate()
            .map(|(i, (row, (&lo, &up)))| {
                let activity = sparse::row_dot(row, x);
                if activity > up {
                    (format!("ineq[{}]", i), up, activity, activity - up)
                } else if activity < lo {
                    (format!("ineq[{}]", i), lo, activity, lo - activity)
                } else {
                    (format!("ineq[{}]", i), up, activity, 0.0)
                }
            });
        eq_rows.chain(ineq_rows).collect()
    }

    fn check_columns(&self, columns: impl IntoIterator<Item = usize>) -> SolverResult<()> {
        let n = self.num_variables();
        match columns.into_iter().find(|&j| j >= n) {
            Some(column) => Err(SolverError::ColumnOutOfRange { column, num_variables: n }),
            None => Ok(()),
        }
    }
}

/// An LP whose inequalities are all of the form `Aineq x <= bupper`.
///
/// This is the read-only view both dual solvers iterate on.
#[derive(Debug, Clone)]
pub struct OneSidedLp {
    costs: Vec<f64>,
    lower_bounds: Vec<f64>,
    upper_bounds: Vec<f64>,
    a_eq: CsMat<f64>,
    b_eq: Vec<f64>,
    a_ineq: CsMat<f64>,
    b_upper: Vec<f64>,
}

impl OneSidedLp {
    /// Build directly from one-sided data. Matrices may be CSR or CSC.
    pub fn new(
        costs: Vec<f64>,
        lower_bounds: Vec<f64>,
        upper_bounds: Vec<f64>,
        (a_eq, b_eq): (&CsMat<f64>, Vec<f64>),
        (a_ineq, b_upper): (&CsMat<f64>, Vec<f64>),
    ) -> SolverResult<Self> {
        let mut lp = SparseLp::new();
        lp.add_variables(&lower_bounds, &upper_bounds, &costs)?;
        lp.add_equalities(a_eq, &b_eq)?;
        check_dimension("inequality columns", costs.len(), a_ineq.cols())?;
        check_dimension("inequality right-hand side", a_ineq.rows(), b_upper.len())?;
        Ok(Self {
            costs,
            lower_bounds,
            upper_bounds,
            a_eq: lp.equality_matrix(),
            b_eq,
            a_ineq: sparse::assemble((b_upper.len(), lp.costs.len()), sparse::triplets(a_ineq)),
            b_upper,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.costs.len()
    }

    pub fn num_equalities(&self) -> usize {
        self.b_eq.len()
    }

    pub fn num_inequalities(&self) -> usize {
        self.b_upper.len()
    }

    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    pub fn lower_bounds(&self) -> &[f64] {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// Equality matrix (CSR).
    pub fn equality_matrix(&self) -> &CsMat<f64> {
        &self.a_eq
    }

    pub fn equality_rhs(&self) -> &[f64] {
        &self.b_eq
    }

    /// Inequality matrix (CSR).
    pub fn inequality_matrix(&self) -> &CsMat<f64> {
        &self.a_ineq
    }

    pub fn inequality_rhs(&self) -> &[f64] {
        &self.b_upper
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        sparse::dot(&self.costs, x)
    }

    /// `Aeq x - beq`
    pub fn equality_residual(&self, x: &[f64]) -> Vec<f64> {
        sparse::residual(&self.a_eq, x, &self.b_eq)
    }

    /// `Aineq x - bupper`
    pub fn inequality_residual(&self, x: &[f64]) -> Vec<f64> {
        sparse::residual(&self.a_ineq, x, &self.b_upper)
    }

    /// `max(0, max_i (Aineq x - b)_i, sum_i |Aeq x - beq|_i)`
    pub fn max_constraint_violation(&self, x: &[f64]) -> f64 {
        let ineq = self.inequality_residual(x).into_iter().fold(0.0, f64::max);
        let eq: f64 = self.equality_residual(x).iter().map(|r| r.abs()).sum();
        ineq.max(eq)
    }

    /// `sum_i max(0, (Aineq x - b)_i) + sum_i |Aeq x - beq|_i`
    pub fn sum_constraint_violation(&self, x: &[f64]) -> f64 {
        let ineq: f64 = self.inequality_residual(x).iter().map(|r| r.max(0.0)).sum();
        let eq: f64 = self.equality_residual(x).iter().map(|r| r.abs()).sum();
        ineq + eq
    }

    pub fn check_solution(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.num_variables()
            && within_bounds(x, &self.lower_bounds, &self.upper_bounds, tolerance)
            && self.max_constraint_violation(x) <= tolerance
    }
}

fn within_bounds(x: &[f64], lower: &[f64], upper: &[f64], tolerance: f64) -> bool {
    x.iter()
        .zip(lower.iter().zip(upper))
        .all(|(&xj, (&l, &u))| xj >= l - tolerance && xj <= u + tolerance)
}

pub(crate) fn check_dimension(what: &'static str, expected: usize, found: usize) -> SolverResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch { what, expected, found })
    }
}

fn check_row_bounds(row: usize, lower: f64, upper: f64) -> SolverResult<()> {
    if lower.is_nan() || upper.is_nan() || lower > upper {
        Err(SolverError::InvalidConstraintBounds { row, lower, upper })
    } else {
        Ok(())
    }
}
