use super::{DEFAULT_PRIOR_STRENGTH, ParametricFunction};
use ndarray::{Array1, Array2, ArrayView1};

/// Smallest value a positive parameter is clipped to before taking its log.
const POSITIVE_FLOOR: f64 = 1e-100;

#[inline]
fn make_positive(x: f64) -> f64 {
    x.max(POSITIVE_FLOOR)
}

/// `0` left of the origin, `-d` to its right.
#[inline]
fn hinge(d: f64) -> f64 {
    if d < 0.0 { 0.0 } else { -d }
}

/// Sum of one-sided linear hinges, concave whenever every hinge weight is
/// positive.
///
/// Each dimension carries `resolution` knots strictly inside `[-1, 1]`; every
/// knot contributes a rising hinge (flat right of the knot) and a falling
/// hinge (flat left of it). The hinges are offset so that their integral over
/// the box is zero, which decouples them from the constant term at
/// parameter 0. The prior on hinge weights is a Gamma-like
/// `s · (ln p - p)` that keeps them positive.
#[derive(Clone, Debug)]
pub struct ConcaveFunction {
    dimensions: usize,
    resolution: usize,
    prior_strength: f64,
}

impl ConcaveFunction {
    pub fn new(dimensions: usize, resolution: usize) -> Self {
        assert!(resolution >= 1, "hinge model needs at least one knot");
        Self {
            dimensions,
            resolution,
            prior_strength: DEFAULT_PRIOR_STRENGTH,
        }
    }

    fn knot(&self, j: usize) -> f64 {
        -1.0 + 2.0 * (j + 1) as f64 / (self.resolution + 1) as f64
    }

    /// Index of the rising hinge of knot `j` in dimension `i`; the falling
    /// hinge follows it.
    fn base(&self, i: usize, j: usize) -> usize {
        1 + 2 * (i * self.resolution + j)
    }
}

impl ParametricFunction for ConcaveFunction {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn parameters(&self) -> usize {
        1 + 2 * self.dimensions * self.resolution
    }

    fn monomials(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut m = Array1::zeros(self.parameters());
        m[0] = 1.0;
        for i in 0..self.dimensions {
            for j in 0..self.resolution {
                let c = self.knot(j);
                let delta = x[i] - c;
                let base = self.base(i, j);
                m[base] = hinge(-delta) + (c + 1.0) * (c + 1.0) / 4.0;
                m[base + 1] = hinge(delta) + (1.0 - c) * (1.0 - c) / 4.0;
            }
        }
        m
    }

    fn input_gradient(&self, params: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut g = Array1::zeros(self.dimensions);
        for i in 0..self.dimensions {
            for j in 0..self.resolution {
                let delta = x[i] - self.knot(j);
                let base = self.base(i, j);
                if delta > 0.0 {
                    g[i] -= params[base + 1];
                } else if delta < 0.0 {
                    g[i] += params[base];
                }
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

    fn prior_params(&self) -> Array1<f64> {
        let mut p = Array1::ones(self.parameters());
        p[0] = 0.0;
        p
    }

    fn log_prior(&self, params: ArrayView1<'_, f64>) -> f64 {
        let s = self.prior_strength;
        let hinges: f64 = params
            .iter()
            .skip(1)
            .map(|&p| make_positive(p).ln() - p)
            .sum();
        s * hinges - 0.5 * s * params[0] * params[0]
    }

    fn log_prior_gradient(&self, params: ArrayView1<'_, f64>) -> Array1<f64> {
        let s = self.prior_strength;
        let mut g = params.mapv(|p| s * (1.0 / make_positive(p) - 1.0));
        g[0] = -s * params[0];
        g
    }

    fn log_prior_negative_hessian(&self, params: ArrayView1<'_, f64>) -> Array2<f64> {
        let s = self.prior_strength;
        let mut diagonal = params.mapv(|p| {
            let q = make_positive(p);
            s / (q * q)
        });
        diagonal[0] = s;
        Array2::from_diag(&diagonal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parametric::test_support::{check_input_gradient, check_prior_derivatives};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn hinges_integrate_to_zero_over_the_box() {
        let pf = ConcaveFunction::new(1, 3);
        let steps = 20_000;
        let mut total = Array1::<f64>::zeros(pf.parameters());
        for k in 0..steps {
            let x = -1.0 + 2.0 * (k as f64 + 0.5) / steps as f64;
            total += &pf.monomials(array![x].view());
        }
        total /= steps as f64;
        assert_abs_diff_eq!(total[0], 1.0, epsilon = 1e-12);
        for p in 1..pf.parameters() {
            assert_abs_diff_eq!(total[p], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn positive_weights_make_a_concave_peak() {
        let pf = ConcaveFunction::new(1, 3);
        let params = pf.prior_params();
        let at = |x: f64| pf.value(params.view(), array![x].view());
        assert!(at(0.0) > at(-0.5));
        assert!(at(0.0) > at(0.5));
        assert!(at(-0.5) - at(-1.0) >= at(0.0) - at(-0.5));
    }

    #[test]
    fn gradient_matches_finite_differences_away_from_knots() {
        let pf = ConcaveFunction::new(2, 4);
        let params = Array1::from_iter((0..pf.parameters()).map(|k| 0.1 + (k % 5) as f64 * 0.3));
        check_input_gradient(&pf, params.view(), array![0.11, -0.73].view(), 1e-7);
    }

    #[test]
    fn prior_derivatives_are_consistent() {
        let pf = ConcaveFunction::new(1, 2);
        let params = array![0.4, 0.7, 1.3, 2.0, 0.9];
        check_prior_derivatives(&pf, params.view(), 1e-6);
        let g = pf.log_prior_gradient(pf.prior_params().view());
        assert!(g.iter().all(|&v| v.abs() < 1e-15));
    }
}
