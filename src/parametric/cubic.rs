use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction, maximize_by_gradient};
use crate::linalg::utils::clamp_to_box;
use ndarray::{Array1, ArrayView1};

/// All monomials of total degree at most three.
///
/// Each term is stored as the sorted list of variable indices it multiplies,
/// so `x0² x1` is `[1, 0, 0]`. Terms are ordered by degree, then by the
/// nested `(i, j ≤ i, k ≤ j)` enumeration.
#[derive(Clone, Debug)]
pub struct CubicFunction {
    dimensions: usize,
    prior_strength: f64,
    terms: Vec<Vec<usize>>,
}

impl CubicFunction {
    pub fn new(dimensions: usize) -> Self {
        let mut terms = vec![Vec::new()];
        for i in 0..dimensions {
            terms.push(vec![i]);
        }
        for i in 0..dimensions {
            for j in 0..=i {
                terms.push(vec![i, j]);
            }
        }
        for i in 0..dimensions {
            for j in 0..=i {
                for k in 0..=j {
                    terms.push(vec![i, j, k]);
                }
            }
        }
        Self {
            dimensions,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
            terms,
        }
    }
}

impl ParametricFunction for CubicFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        self.terms.len()
    }

    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.terms
            .iter()
            .map(|term| term.iter().map(|&v| x[v]).product())
            .collect()
    }

    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut g = Array1::zeros(self.dimensions);
        for (term, &p) in self.terms.iter().zip(params.iter()) {
            // Product rule over the factors of the term.
            for skip in 0..term.len() {
                let rest: f64 = term
                    .iter()
                    .enumerate()
                    .filter(|&(f, _)| f != skip)
                    .map(|(_, &v)| x[v])
                    .product();
                g[term[skip]] += p * rest;
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

    /// Closed form in one dimension: the root of the derivative where the
    /// second derivative is negative.
    fn maximum(&self, params: ArrayView1<'_, f64>) -> Option<Array1<f64>> {
        if self.dimensions != 1 {
            return maximize_by_gradient(self, params);
        }
        let a = 3.0 * params[3];
        let b = 2.0 * params[2];
        let c = params[1];
        let x = if a == 0.0 {
            if b >= 0.0 {
                return None;
            }
            -c / b
        } else {
            let delta = b * b - 4.0 * a * c;
            if delta < 0.0 {
                return None;
            }
            (-b - delta.sqrt()) / (2.0 * a)
        };
        Some(clamp_to_box(Array1::from_elem(1, x)))
    }
}
