//! Small sparse helpers over `sprs` CSR matrices.

use sprs::{CsMat, CsVecView, TriMat};

/// Iterate the nonzeros of a matrix as `(row, col, value)` whatever its storage.
pub(crate) fn triplets(matrix: &CsMat<f64>) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
    let csr = matrix.is_csr();
    matrix.outer_iterator().enumerate().flat_map(move |(outer, vec)| {
        vec.iter()
            .map(move |(inner, &val)| if csr { (outer, inner, val) } else { (inner, outer, val) })
            .collect::<Vec<_>>()
    })
}

/// Assemble a CSR matrix of the given shape from `(row, col, value)` entries.
///
/// Explicit zeros are dropped; duplicate entries are summed.
pub(crate) fn assemble(
    shape: (usize, usize),
    entries: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CsMat<f64> {
    let mut tri = TriMat::new(shape);
    for (row, col, val) in entries {
        if val != 0.0 {
            tri.add_triplet(row, col, val);
        }
    }
    tri.to_csr()
}

pub(crate) fn row_dot(row: CsVecView<'_, f64>, x: &[f64]) -> f64 {
    row.iter().map(|(j, &a)| a * x[j]).sum()
}

/// Computes `A x - b` for a CSR matrix.
pub(crate) fn residual(a: &CsMat<f64>, x: &[f64], b: &[f64]) -> Vec<f64> {
    a.outer_iterator()
        .zip(b)
        .map(|(row, &bi)| row_dot(row, x) - bi)
        .collect()
}

/// Accumulates `yᵗA` into `out`, skipping rows whose multiplier is zero.
pub(crate) fn add_transposed_product(a: &CsMat<f64>, y: &[f64], out: &mut [f64]) {
    for (row, &yi) in a.outer_iterator().zip(y) {
        if yi == 0.0 {
            continue;
        }
        for (j, &aij) in row.iter() {
            out[j] += yi * aij;
        }
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
