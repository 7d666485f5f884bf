//! Log posterior of the outcome model and its derivatives.
//!
//! A sample point with model rating `r` wins with probability `f(r - δ)` and
//! loses with probability `f(-r - δ)`, where `δ` is the draw rating. A draw
//! has likelihood `f(r - δ) f(-r - δ)`, which stays positive at `δ = 0`. Each
//! distinct point contributes its weighted outcome counts to the log
//! likelihood.

use super::SampleData;
use crate::parametric::ParametricFunction;
use crate::probability::logistic;
use crate::solver::DiffFunction;
use crate::types::{FINAL_OUTCOMES, Outcome};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// `[P(loss), P(win)]` at rating `r`.
#[inline]
pub(crate) fn outcome_probabilities(rating: f64, draw_rating: f64) -> [f64; 2] {
    [logistic(-rating - draw_rating), logistic(rating - draw_rating)]
}

/// Likelihood of `outcome` at rating `r`.
///
/// The draw term is unnormalized: it differs from the draw band
/// `1 - P(win) - P(loss)` by the constant `e^{2δ} - 1`. Non-final outcomes
/// get probability 1, so they contribute nothing to a log likelihood.
pub(crate) fn result_probability(rating: f64, draw_rating: f64, outcome: Outcome) -> f64 {
    match outcome {
        Outcome::Loss => logistic(-rating - draw_rating),
        Outcome::Win => logistic(rating - draw_rating),
        Outcome::Draw => logistic(rating - draw_rating) * logistic(-rating - draw_rating),
        Outcome::Unknown | Outcome::InProgress => 1.0,
    }
}

/// Read-only view of everything the log posterior depends on.
#[derive(Clone, Copy)]
pub(crate) struct Posterior<'a> {
    pub(crate) pf: &'a dyn ParametricFunction,
    pub(crate) entries: &'a [SampleData],
    pub(crate) draw_rating: f64,
}

impl Posterior<'_> {
    /// Log posterior at `params`; fills `probabilities` with the per-entry
    /// `[P(loss), P(win)]` it used.
    pub(crate) fn log_posterior_with(
        &self,
        params: ArrayView1<'_, f64>,
        probabilities: &mut Vec<[f64; 2]>,
    ) -> f64 {
        probabilities.clear();
        let mut total = self.pf.log_prior(params);
        for entry in self.entries {
            let rating = params.dot(&entry.monomials);
            let p = outcome_probabilities(rating, self.draw_rating);
            probabilities.push(p);
            let mut ll = 0.0;
            for (k, &outcome) in Outcome::ALL[..FINAL_OUTCOMES].iter().enumerate() {
                let count = entry.counts[k];
                if count > 0 {
                    ll += f64::from(count) * result_probability(rating, self.draw_rating, outcome).ln();
                }
            }
            total += entry.weight * ll;
        }
        total
    }

    pub(crate) fn log_posterior(&self, params: ArrayView1<'_, f64>) -> f64 {
        let mut scratch = Vec::with_capacity(self.entries.len());
        self.log_posterior_with(params, &mut scratch)
    }

    pub(crate) fn gradient(
        &self,
        params: ArrayView1<'_, f64>,
        probabilities: &[[f64; 2]],
    ) -> Array1<f64> {
        let mut g = self.pf.log_prior_gradient(params);
        for (entry, &[p0, p1]) in self.entries.iter().zip(probabilities) {
            let [c0, c1, c2] = entry.counts.map(f64::from);
            let multiplier = entry.weight * (c0 * (p0 - 1.0) + c1 * (1.0 - p1) + c2 * (p0 - p1));
            g.scaled_add(multiplier, &entry.monomials);
        }
        g
    }

    /// Negated Hessian, full and symmetric.
    pub(crate) fn negative_hessian(
        &self,
        params: ArrayView1<'_, f64>,
        probabilities: &[[f64; 2]],
    ) -> Array2<f64> {
        let mut h = self.pf.log_prior_negative_hessian(params);
        let n = h.nrows();
        for (entry, &[p0, p1]) in self.entries.iter().zip(probabilities) {
            let [c0, c1, c2] = entry.counts.map(f64::from);
            let multiplier =
                entry.weight * ((c0 + c2) * p0 * (1.0 - p0) + (c1 + c2) * p1 * (1.0 - p1));
            if multiplier == 0.0 {
                continue;
            }
            let m = &entry.monomials;
            for i in 0..n {
                let mi = multiplier * m[i];
                for j in 0..=i {
                    h[[i, j]] += mi * m[j];
                }
            }
        }
        for i in 0..n {
            for j in 0..i {
                h[[j, i]] = h[[i, j]];
            }
        }
        h
    }
}

/// The log posterior as an objective over parameter vectors, for Newton.
pub(crate) struct PosteriorObjective<'a> {
    posterior: Posterior<'a>,
    params: Array1<f64>,
    probabilities: Vec<[f64; 2]>,
    gradient: Array1<f64>,
    negative_hessian: Array2<f64>,
}

impl<'a> PosteriorObjective<'a> {
    pub(crate) fn new(posterior: Posterior<'a>) -> Self {
        let n = posterior.pf.parameters();
        Self {
            posterior,
            params: Array1::zeros(n),
            probabilities: Vec::with_capacity(posterior.entries.len()),
            gradient: Array1::zeros(n),
            negative_hessian: Array2::zeros((n, n)),
        }
    }
}

impl DiffFunction for PosteriorObjective<'_> {
    fn dimensions(&self) -> usize {
        self.params.len()
    }

    fn output(&mut self, x: ArrayView1<'_, f64>) -> f64 {
        self.params.assign(&x);
        let value = self
            .posterior
            .log_posterior_with(self.params.view(), &mut self.probabilities);
        if value.is_nan() {
            log::warn!("log posterior is NaN");
        }
        value
    }

    fn compute_gradient(&mut self) {
        self.gradient = self.posterior.gradient(self.params.view(), &self.probabilities);
    }

    fn gradient(&self) -> ArrayView1<'_, f64> {
        self.gradient.view()
    }

    fn compute_hessian(&mut self) {
        self.negative_hessian = self
            .posterior
            .negative_hessian(self.params.view(), &self.probabilities);
    }

    fn negative_hessian(&self) -> Option<ArrayView2<'_, f64>> {
        Some(self.negative_hessian.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parametric::QuadraticFunction;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn entry(pf: &dyn ParametricFunction, x: f64, counts: [u32; 3], weight: f64) -> SampleData {
        let point = array![x];
        let mut data = SampleData::new(point, pf, 0, weight);
        data.counts = counts;
        data
    }

    #[test]
    fn draw_likelihood_is_the_product_of_both_sides() {
        for &r in &[-3.0, -0.2, 0.0, 1.7] {
            let [loss, win] = outcome_probabilities(r, 0.4);
            assert_abs_diff_eq!(result_probability(r, 0.4, Outcome::Draw), loss * win, epsilon = 1e-15);
            // Proportional to the draw band 1 - P(win) - P(loss).
            let band = 1.0 - loss - win;
            assert_abs_diff_eq!(
                result_probability(r, 0.4, Outcome::Draw) * (0.8f64.exp() - 1.0),
                band,
                epsilon = 1e-14
            );
        }
        assert_eq!(result_probability(0.3, 0.4, Outcome::Unknown), 1.0);
    }

    #[test]
    fn draws_keep_a_finite_likelihood_without_a_draw_band() {
        assert_abs_diff_eq!(result_probability(0.0, 0.0, Outcome::Draw), 0.25, epsilon = 1e-15);
        let pf = QuadraticFunction::new(1);
        let entries = vec![entry(&pf, 0.0, [1, 1, 1], 1.0)];
        let posterior = Posterior {
            pf: &pf,
            entries: &entries,
            draw_rating: 0.0,
        };
        assert!(posterior.log_posterior(array![0.0, 0.0, 0.0].view()).is_finite());
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let pf = QuadraticFunction::new(1);
        let entries = vec![
            entry(&pf, -0.6, [3, 1, 2], 1.0),
            entry(&pf, 0.1, [1, 4, 1], 0.7),
            entry(&pf, 0.8, [2, 2, 0], 0.3),
        ];
        let posterior = Posterior {
            pf: &pf,
            entries: &entries,
            draw_rating: 0.5,
        };
        let params = array![0.2, -0.4, -0.9];
        let mut probabilities = Vec::new();
        posterior.log_posterior_with(params.view(), &mut probabilities);
        let g = posterior.gradient(params.view(), &probabilities);
        let h = posterior.negative_hessian(params.view(), &probabilities);
        let step = 1e-6;
        for i in 0..3 {
            let mut plus = params.clone();
            let mut minus = params.clone();
            plus[i] += step;
            minus[i] -= step;
            let numeric =
                (posterior.log_posterior(plus.view()) - posterior.log_posterior(minus.view())) / (2.0 * step);
            assert_abs_diff_eq!(g[i], numeric, epsilon = 1e-6);

            let mut pp = Vec::new();
            let mut pm = Vec::new();
            posterior.log_posterior_with(plus.view(), &mut pp);
            posterior.log_posterior_with(minus.view(), &mut pm);
            let gp = posterior.gradient(plus.view(), &pp);
            let gm = posterior.gradient(minus.view(), &pm);
            for j in 0..3 {
                assert_abs_diff_eq!(h[[j, i]], -(gp[j] - gm[j]) / (2.0 * step), epsilon = 1e-5);
            }
        }
    }
}
