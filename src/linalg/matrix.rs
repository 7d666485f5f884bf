//! Dense kernels for the small symmetric systems used by the regression.
//!
//! Conventions follow the posterior code that consumes them:
//!
//! - `cholesky` reads only the upper triangle (including the diagonal) of
//!   its input and returns a lower-triangular factor `L` with `A = L Lᵀ`.
//! - `cholesky_inverse` returns `L⁻ᵀ` as an upper-triangular matrix, so that
//!   `θ = μ + L⁻ᵀ z` has covariance `A⁻¹` for `z ~ N(0, I)`.
//! - `jacobi` works on the lower triangle and leaves the eigenvalues on the
//!   diagonal.

use ndarray::{Array1, Array2, ArrayView2};
use thiserror::Error;

/// Smallest acceptable squared pivot before a matrix is declared indefinite.
pub const CHOLESKY_THRESHOLD: f64 = 1e-10;
/// Off-diagonal entries with a squared magnitude below this are not rotated.
pub const JACOBI_THRESHOLD: f64 = 1e-10;
pub const MAX_JACOBI_SWEEPS: usize = 10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("matrix is not positive definite (pivot {pivot} = {value:.3e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },
    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
}

fn require_square(matrix: &ArrayView2<'_, f64>) -> Result<usize, LinalgError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(LinalgError::NotSquare { rows, cols });
    }
    Ok(rows)
}

/// Cholesky factorization of a symmetric positive-definite matrix.
///
/// Fails with [`LinalgError::NotPositiveDefinite`] as soon as a pivot drops
/// below [`CHOLESKY_THRESHOLD`]. Callers treat that as "fall back", never as
/// fatal.
pub fn cholesky(matrix: ArrayView2<'_, f64>) -> Result<Array2<f64>, LinalgError> {
    let n = require_square(&matrix)?;
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let mut sum = matrix[[i, j]];
            for k in 0..i {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if !(sum >= CHOLESKY_THRESHOLD) {
                    return Err(LinalgError::NotPositiveDefinite { pivot: i, value: sum });
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[j, i]] = sum / l[[i, i]];
            }
        }
    }
    Ok(l)
}

/// Inverse of a lower-triangular factor, returned transposed (upper triangle).
pub fn cholesky_inverse(l: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = l.nrows();
    let mut inv = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        inv[[i, i]] = 1.0 / l[[i, i]];
        for j in (i + 1)..n {
            let mut sum = 0.0;
            for k in i..j {
                sum -= l[[j, k]] * inv[[i, k]];
            }
            inv[[i, j]] = sum / l[[j, j]];
        }
    }
    inv
}

/// Solves `L Lᵀ x = v` in place by forward then back substitution.
pub fn cholesky_solve(l: ArrayView2<'_, f64>, v: &mut Array1<f64>) {
    let n = l.nrows();
    debug_assert_eq!(v.len(), n);
    for i in 0..n {
        for j in 0..i {
            v[i] -= v[j] * l[[i, j]];
        }
        v[i] /= l[[i, i]];
    }
    for i in (0..n).rev() {
        for j in (i + 1)..n {
            v[i] -= v[j] * l[[j, i]];
        }
        v[i] /= l[[i, i]];
    }
}

/// `Uᵀ U` for an upper-triangular `U`, returned as a full symmetric matrix.
///
/// With `U = Lᵀ` this rebuilds the matrix a Cholesky factor came from.
pub fn square(upper: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = upper.nrows();
    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..=j.min(i) {
                sum += upper[[k, i]] * upper[[k, j]];
            }
            out[[i, j]] = sum;
            out[[j, i]] = sum;
        }
    }
    out
}

/// Cyclic Jacobi eigenvalue iteration on a symmetric matrix.
///
/// On return the diagonal of `matrix` holds the eigenvalues and the returned
/// matrix holds the matching eigenvectors as columns. The off-diagonal part
/// of `matrix` is left with whatever residue fell below the rotation
/// threshold, mirrored so the matrix stays symmetric.
pub fn jacobi(matrix: &mut Array2<f64>) -> Array2<f64> {
    let n = matrix.nrows();
    let mut vectors = Array2::<f64>::eye(n);
    for sweep in 0..MAX_JACOBI_SWEEPS {
        let mut rotations = 0usize;
        for p in (0..n).rev() {
            for q in ((p + 1)..n).rev() {
                let a_qp = matrix[[q, p]];
                if a_qp * a_qp < JACOBI_THRESHOLD {
                    continue;
                }
                rotations += 1;

                let a_pp = matrix[[p, p]];
                let a_qq = matrix[[q, q]];
                let theta = 0.5 * (a_qq - a_pp) / a_qp;
                let t = if theta < 0.0 {
                    -1.0 / (-theta + (theta * theta + 1.0).sqrt())
                } else {
                    1.0 / (theta + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for r in 0..n {
                    let e_rp = vectors[[r, p]];
                    let e_rq = vectors[[r, q]];
                    vectors[[r, p]] = c * e_rp - s * e_rq;
                    vectors[[r, q]] = s * e_rp + c * e_rq;
                }

                matrix[[q, p]] = 0.0;
                matrix[[p, p]] -= t * a_qp;
                matrix[[q, q]] += t * a_qp;
                for r in 0..p {
                    let a_pr = matrix[[p, r]];
                    let a_qr = matrix[[q, r]];
                    matrix[[p, r]] = c * a_pr - s * a_qr;
                    matrix[[q, r]] = s * a_pr + c * a_qr;
                }
                for r in (p + 1)..q {
                    let a_rp = matrix[[r, p]];
                    let a_qr = matrix[[q, r]];
                    matrix[[r, p]] = c * a_rp - s * a_qr;
                    matrix[[q, r]] = s * a_rp + c * a_qr;
                }
                for r in (q + 1)..n {
                    let a_rp = matrix[[r, p]];
                    let a_rq = matrix[[r, q]];
                    matrix[[r, p]] = c * a_rp - s * a_rq;
                    matrix[[r, q]] = s * a_rp + c * a_rq;
                }
            }
        }
        if rotations == 0 {
            log::trace!("jacobi converged after {} sweeps", sweep + 1);
            break;
        }
    }
    for i in 0..n {
        for j in (i + 1)..n {
            matrix[[i, j]] = matrix[[j, i]];
        }
    }
    vectors
}

/// Permutation that orders the diagonal of `matrix` ascending.
///
/// The sort is stable, so equal eigenvalues keep their original order.
pub fn jacobi_sort(matrix: ArrayView2<'_, f64>) -> Vec<usize> {
    let n = matrix.nrows();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        matrix[[a, a]]
            .partial_cmp(&matrix[[b, b]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Eigenvalues (ascending) and matching eigenvector columns of a symmetric matrix.
pub fn symmetric_eigen(matrix: ArrayView2<'_, f64>) -> (Array1<f64>, Array2<f64>) {
    let mut work = matrix.to_owned();
    let vectors = jacobi(&mut work);
    let order = jacobi_sort(work.view());
    let n = order.len();
    let mut values = Array1::<f64>::zeros(n);
    let mut sorted = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        values[dst] = work[[src, src]];
        sorted.column_mut(dst).assign(&vectors.column(src));
    }
    (values, sorted)
}
