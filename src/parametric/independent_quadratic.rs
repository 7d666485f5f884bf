use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction};
use crate::linalg::utils::clamp_to_box;
use ndarray::{Array1, Array2, ArrayView1};

/// Separable quadratic `c + Σ b_i x_i + Σ a_i x_i²` without cross terms.
///
/// Layout: constant, `b` at `1 + i`, `a` at `1 + D + i`.
#[derive(Clone, Debug)]
pub struct IndependentQuadraticFunction {
    dimensions: usize,
    prior_strength: f64,
}

impl IndependentQuadraticFunction {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }
}

impl ParametricFunction for IndependentQuadraticFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        1 + 2 * self.dimensions
    }

    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let d = self.dimensions;
        let mut m = Array1::zeros(self.parameters());
        m[0] = 1.0;
        for i in 0..d {
            m[1 + i] = x[i];
            m[1 + d + i] = x[i] * x[i];
        }
        m
    }

    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let d = self.dimensions;
        Array1::from_iter((0..d).map(|i| params[1 + i] + 2.0 * params[1 + d + i] * x[i]))
    }

    fn prior_strength(&self) -> f64 {
        self.prior_strength
    }

    fn set_prior_strength(&mut self, strength: f64) {
        self.prior_strength = strength;
    }

    fn maximum(&self, params: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
        let d = self.dimensions;
        let mut x = Array1::zeros(d);
        for i in 0..d {
            let a = params[1 + d + i];
            if a >= 0.0 {
                return None;
            }
            x[i] = -params[1 + i] / (2.0 * a);
        }
        Some(clamp_to_box(x))
    }

    fn input_hessian(&self, params: ArrayView1<'_, f64>) -> Option<Array2<f64>> {
        let d = self.dimensions;
        Some(Array2::from_diag(&Array1::from_iter(
            (0..d).map(|i| 2.0 * params[1 + d + i]),
        )))
    }
}
