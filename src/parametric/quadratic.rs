use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction, pair_index};
use crate::linalg::{cholesky, cholesky_solve};
use ndarray::{Array1, Array2, ArrayView1};

/// Full quadratic form `c + bᵀx + Σ_{j≤i} q_ij x_i x_j`.
///
/// Parameter layout: the constant, the `D` linear coefficients, then the
/// `D(D+1)/2` quadratic coefficients ordered by `(i, j)` with `j ≤ i`.
#[derive(Clone, Debug)]
pub struct QuadraticFunction {
    dimensions: usize,
    prior_strength: f64,
}

impl QuadraticFunction {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }

    /// `M` such that the quadratic part equals `-xᵀ M x`.
    fn curvature(&self, params: ArrayView1<'_, f64>) -> Array2<f64> {
        let d = self.dimensions;
        let mut m = Array2::zeros((d, d));
        for i in 0..d {
            m[[i, i]] = -params[pair_index(d, i, i)];
            for j in 0..i {
                let half = -0.5 * params[pair_index(d, i, j)];
                m[[i, j]] = half;
                m[[j, i]] = half;
            }
        }
        m
    }
}

impl ParametricFunction for QuadraticFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        let d = self.dimensions;
        1 + d + d * (d + 1) / 2
    }

    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let d = self.dimensions;
        let mut m = Array1::zeros(self.parameters());
        m[0] = 1.0;
        for i in 0..d {
            m[1 + i] = x[i];
            for j in 0..=i {
                m[pair_index(d, i, j)] = x[i] * x[j];
            }
        }
        m
    }

    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let d = self.dimensions;
        let mut g = Array1::zeros(d);
        for i in 0..d {
            g[i] += params[1 + i];
            g[i] += 2.0 * params[pair_index(d, i, i)] * x[i];
            for j in 0..i {
                let q = params[pair_index(d, i, j)];
                g[i] += q * x[j];
                g[j] += q * x[i];
            }
        }
        g
    }

    fn prior_strength(&self) -> f64 {
        self.prior_strength
    }

    fn set_prior_strength(&mut self, strength: f64) {
        self.prior_strength = strength;
    }

    /// Stationary point `x = M⁻¹ b / 2`, when the form is concave and the
    /// point lies inside the box.
    fn maximum(&self, params: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
        let d = self.dimensions;
        let l = cholesky(self.curvature(params).view()).ok()?;
        let mut x = Array1::from_iter((0..d).map(|i| 0.5 * params[1 + i]));
        cholesky_solve(l.view(), &mut x);
        x.iter().all(|v| v.abs() <= 1.0).then_some(x)
    }

    fn input_hessian(&self, params: ArrayView1<'_, f64>) -> Option<Array2<f64>> {
        Some(self.curvature(params) * -2.0)
    }
}
