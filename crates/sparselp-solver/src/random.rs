//! Random feasible LPs for tests, benchmarks and the CLI.

use sprs::CsMat;

use crate::error::SolverResult;
use crate::problem::SparseLp;
use crate::rng::SplitMix64;
use crate::sparse;

/// Shape of a random LP: `lower <= x <= upper`, `Aeq x == beq`, `Aineq x <= bupper`.
///
/// Entries are normal samples rounded to two decimals, kept with probability
/// `sparsity`. A hidden point `x*` is drawn first; bounds, `beq` and
/// `bupper` are built around it so the LP is always feasible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomLp {
    pub num_variables: usize,
    pub num_equalities: usize,
    pub num_inequalities: usize,
    pub sparsity: f64,
}

impl RandomLp {
    pub fn new(num_variables: usize, num_equalities: usize, num_inequalities: usize, sparsity: f64) -> Self {
        Self {
            num_variables,
            num_equalities,
            num_inequalities,
            sparsity,
        }
    }

    /// Generate the LP for `seed`, together with the feasible point it was built around.
    ///
    /// Constraint rows with fewer than two nonzeros are discarded.
    pub fn generate(&self, seed: u64) -> SolverResult<(SparseLp, Vec<f64>)> {
        let mut rng = SplitMix64::new(seed);
        let n = self.num_variables;
        let feasible = rand_sparse(&mut rng, n, 1.0);

        let mut ineq_rows = Vec::new();
        if self.num_inequalities > 0 && n >= 2 {
            loop {
                ineq_rows = self.random_rows(&mut rng, self.num_inequalities);
                if ineq_rows.iter().any(|row| row.len() >= 2) {
                    break;
                }
            }
        }
        let ineq_slack = rand_sparse(&mut rng, ineq_rows.len(), self.sparsity);

        let costs = rand_sparse(&mut rng, n, 1.0);
        let spread = rand_sparse(&mut rng, n, 1.0);
        let lower: Vec<f64> = feasible.iter().zip(&spread).map(|(x, t)| x + t.min(0.0)).collect();
        let upper: Vec<f64> = feasible.iter().zip(&spread).map(|(x, t)| x + t.max(0.0)).collect();

        let eq_rows = if self.num_equalities > 0 {
            self.random_rows(&mut rng, self.num_equalities)
        } else {
            Vec::new()
        };

        let mut lp = SparseLp::new();
        lp.add_variables(&lower, &upper, &costs)?;

        let (a_eq, _) = keep_dense_rows(eq_rows, Vec::new(), n);
        if a_eq.rows() > 0 {
            let b_eq: Vec<f64> = a_eq.outer_iterator().map(|row| sparse::row_dot(row, &feasible)).collect();
            lp.add_equalities(&a_eq, &b_eq)?;
        }

        let (a_ineq, slack) = keep_dense_rows(ineq_rows, ineq_slack, n);
        if a_ineq.rows() > 0 {
            let b_upper: Vec<f64> = a_ineq
                .outer_iterator()
                .zip(&slack)
                .map(|(row, s)| ((sparse::row_dot(row, &feasible) + s.abs()) * 1000.0).ceil() / 1000.0)
                .collect();
            lp.add_inequalities(&a_ineq, None, Some(b_upper.as_slice()))?;
        }

        Ok((lp, feasible))
    }

    fn random_rows(&self, rng: &mut SplitMix64, count: usize) -> Vec<Vec<(usize, f64)>> {
        (0..count)
            .map(|_| {
                rand_sparse(rng, self.num_variables, self.sparsity)
                    .into_iter()
                    .enumerate()
                    .filter(|&(_, v)| v != 0.0)
                    .collect()
            })
            .collect()
    }
}

/// Normal samples rounded to two decimals, zeroed with probability `1 - sparsity`.
fn rand_sparse(rng: &mut SplitMix64, len: usize, sparsity: f64) -> Vec<f64> {
    (0..len)
        .map(|_| {
            let value = (rng.next_normal() * 100.0).round() / 100.0;
            if rng.next_f64() < sparsity { value } else { 0.0 }
        })
        .collect()
}

/// CSR matrix of the rows with at least two nonzeros, and the matching `extra` entries.
fn keep_dense_rows(rows: Vec<Vec<(usize, f64)>>, extra: Vec<f64>, n: usize) -> (CsMat<f64>, Vec<f64>) {
    let mut kept_extra = Vec::new();
    let mut entries = Vec::new();
    let mut kept = 0;
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() < 2 {
            continue;
        }
        entries.extend(row.into_iter().map(|(j, v)| (kept, j, v)));
        if let Some(&e) = extra.get(i) {
            kept_extra.push(e);
        }
        kept += 1;
    }
    (sparse::assemble((kept, n), entries), kept_extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_lp_is_feasible() {
        for seed in 0..20 {
            let (lp, x) = RandomLp::new(30, 1, 30, 0.2).generate(seed).unwrap();
            assert_eq!(lp.num_variables(), 30);
            assert!(lp.num_inequalities() >= 1);
            assert!(lp.check_solution(&x, 1e-12), "seed {} not feasible", seed);
            assert!(lp.to_one_sided().check_solution(&x, 1e-12));
        }
    }

    #[test]
    fn test_generation_is_reproducible() {
        let shape = RandomLp::new(12, 2, 6, 0.5);
        let (a, xa) = shape.generate(3).unwrap();
        let (b, xb) = shape.generate(3).unwrap();
        assert_eq!(xa, xb);
        assert_eq!(a.costs(), b.costs());
        assert_eq!(a.upper_bounds(), b.upper_bounds());
        let (_, xc) = shape.generate(4).unwrap();
        assert_ne!(xa, xc);
    }

    #[test]
    fn test_no_constraints_requested() {
        let (lp, _) = RandomLp::new(5, 0, 0, 0.5).generate(1).unwrap();
        assert_eq!(lp.num_equalities(), 0);
        assert_eq!(lp.num_inequalities(), 0);
    }
}
