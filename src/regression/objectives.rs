//! Input-space objectives built on a fitted posterior.

use super::PosteriorView;
use crate::probability::logistic;
use crate::solver::{DiffFunction, normalize_unit};
use ndarray::{Array1, ArrayView1};

/// Fewest wins, and fewest losses, before the posterior variance is trusted.
pub const VARIANCE_MIN_SAMPLES: usize = 5;

/// Rating, variance and deviation of the posterior at one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Confidence {
    pub rating: f64,
    pub variance: f64,
    pub deviation: f64,
}

impl Confidence {
    pub fn at(view: &PosteriorView<'_>, x: ArrayView1<'_, f64>) -> Self {
        let rating = view.rating(x);
        let variance = view.variance(x);
        Self {
            rating,
            variance,
            deviation: variance.max(0.0).sqrt(),
        }
    }
}

/// Log of the delta-method variance of the win probability,
/// `½ ln(var · (s (1 - s))²)` with `s` the logistic of the MAP rating.
pub struct VarianceDelta<'a> {
    view: PosteriorView<'a>,
    gradient: Array1<f64>,
}

impl<'a> VarianceDelta<'a> {
    /// `None` until the posterior has seen enough wins and enough losses.
    pub fn new(view: PosteriorView<'a>) -> Option<Self> {
        if !Self::ready(view.wins, view.losses) {
            return None;
        }
        Some(Self {
            gradient: Array1::zeros(view.pf.dimensions()),
            view,
        })
    }
}

impl VarianceDelta<'_> {
    pub fn ready(wins: usize, losses: usize) -> bool {
        wins >= VARIANCE_MIN_SAMPLES && losses >= VARIANCE_MIN_SAMPLES
    }
}

impl DiffFunction for VarianceDelta<'_> {
    fn dimensions(&self) -> usize {
        self.view.pf.dimensions()
    }

    fn output(&mut self, x: ArrayView1<'_, f64>) -> f64 {
        let pf = self.view.pf;
        let m = pf.monomials(x);
        let sigma_m = self.view.covariance_times(&m);
        let variance = m.dot(&sigma_m);
        let s = logistic(self.view.rating(x));
        let spread = s * (1.0 - s);

        let mut gradient = pf.input_gradient(sigma_m.view(), x) / variance;
        gradient.scaled_add(1.0 - 2.0 * s, &pf.input_gradient(self.view.map, x));
        self.gradient = gradient;

        0.5 * (variance * spread * spread).ln()
    }

    fn gradient(&self) -> ArrayView1<'_, f64> {
        self.gradient.view()
    }

    fn normalize(&self, x: f64) -> f64 {
        normalize_unit(x)
    }
}

/// Optimistic rating `r + k √var`.
pub struct RatingUcb<'a> {
    view: PosteriorView<'a>,
    k: f64,
    gradient: Array1<f64>,
}

impl<'a> RatingUcb<'a> {
    /// `k = alpha · √ln N` for `N` samples.
    pub fn new(view: PosteriorView<'a>, alpha: f64) -> Self {
        let n = view.samples.max(1) as f64;
        Self {
            k: alpha * n.ln().max(0.0).sqrt(),
            gradient: Array1::zeros(view.pf.dimensions()),
            view,
        }
    }

    pub fn exploration(&self) -> f64 {
        self.k
    }
}

impl DiffFunction for RatingUcb<'_> {
    fn dimensions(&self) -> usize {
        self.view.pf.dimensions()
    }

    fn output(&mut self, x: ArrayView1<'_, f64>) -> f64 {
        let pf = self.view.pf;
        let m = pf.monomials(x);
        let sigma_m = self.view.covariance_times(&m);
        let deviation = m.dot(&sigma_m).max(f64::MIN_POSITIVE).sqrt();

        let mut gradient = pf.input_gradient(self.view.map, x);
        gradient.scaled_add(self.k / deviation, &pf.input_gradient(sigma_m.view(), x));
        self.gradient = gradient;

        self.view.rating(x) + self.k * deviation
    }

    fn gradient(&self) -> ArrayView1<'_, f64> {
        self.gradient.view()
    }

    fn normalize(&self, x: f64) -> f64 {
        normalize_unit(x)
    }
}
