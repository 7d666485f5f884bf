use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction};
use ndarray::{Array1, ArrayView1};

/// A single rating independent of the input, useful as a null model.
#[derive(Clone, Debug)]
pub struct ConstantFunction {
    dimensions: usize,
    prior_strength: f64,
}

impl ConstantFunction {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }
}

impl ParametricFunction for ConstantFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        1
    }

    fn monomials(&self, _x: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::ones(1)
    }

    fn input_gradient(&self, _params: ArrayView1<'_, f64>, _x: ArrayView1<'_, f64>) -> Array1<f64> {
        Array1::zeros(self.dimensions)
    }

    fn prior_strength(&self) -> f64 {
        self.prior_strength
    }

    fn set_prior_strength(&mut self, strength: f64) {
        self.prior_strength = strength;
    }

    /// Every point is optimal; the centre is reported.
    fn maximum(&self, _params: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
        Some(Array1::zeros(self.dimensions))
    }
}
