use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction};
use ndarray::{Array1, ArrayView1};

/// Additive radial-basis model: per dimension, `resolution` Gaussian bumps
/// with evenly spaced centres covering `[-1, 1]`.
///
/// Parameter `i * resolution + j` weighs bump `j` of dimension `i`.
#[derive(Clone, Debug)]
pub struct GaussianFunction {
    dimensions: usize,
    resolution: usize,
    prior_strength: f64,
    scale: f64,
}

impl GaussianFunction {
    pub fn new(dimensions: usize, resolution: usize) -> Self {
        assert!(resolution >= 2, "radial basis needs at least two centres");
        Self {
            dimensions,
            resolution,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
            scale: (resolution - 1) as f64 / 2.0,
        }
    }

    fn center(&self, j: usize) -> f64 {
        -1.0 + 2.0 * j as f64 / (self.resolution - 1) as f64
    }

    fn bump(&self, delta: f64) -> f64 {
        let z = delta * self.scale;
        (-z * z).exp()
    }
}

impl ParametricFunction for GaussianFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        self.dimensions * self.resolution
    }

    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut m = Array1::zeros(self.parameters());
        for i in 0..self.dimensions {
            for j in 0..self.resolution {
                m[i * self.resolution + j] = self.bump(x[i] - self.center(j));
            }
        }
        m
    }

    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let s2 = self.scale * self.scale;
        let mut g = Array1::zeros(self.dimensions);
        for i in 0..self.dimensions {
            for j in 0..self.resolution {
                let delta = x[i] - self.center(j);
                g[i] -= 2.0 * params[i * self.resolution + j] * s2 * delta * self.bump(delta);
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
}
