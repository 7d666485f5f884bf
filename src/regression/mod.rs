//! Online Bayesian logistic regression of match outcomes.
//!
//! A [`Regression`] observes the results stream, folds consecutive repeats of
//! the same point into one [`SampleData`] entry, and fits the MAP parameters
//! of a [`ParametricFunction`] under the win/draw/loss model of
//! [`posterior`]. Everything derived from the MAP (log posterior, gradient,
//! Hessian, Cholesky factor and inverse) is computed lazily and cached; any
//! change to the data or the weights drops the cache.
//!
//! Localization down-weights samples whose predicted rating is far below the
//! current weighted mean, so that a low-order model only has to be accurate
//! near the optimum.

pub mod cache;
pub mod objectives;
mod posterior;

pub use cache::{CacheFlags, CacheStep, plan_step};

use crate::linalg::{cholesky, cholesky_inverse, cholesky_solve};
use crate::observer::{Observer, Results};
use crate::parametric::ParametricFunction;
use crate::probability::{logistic, logistic_difference, standard_normal};
use crate::solver::{OptimReport, newton};
use crate::types::{
    ALL_OUTCOMES, ConfigError, FINAL_OUTCOMES, Outcome, require_positive, require_range,
};
use posterior::{Posterior, PosteriorObjective};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};

/// A localization step that keeps more than this share of the total weight
/// counts as converged.
pub const LOCALIZATION_SHRINK: f64 = 0.99;
/// Bisection steps used to invert the win rate.
pub const RATING_BISECTIONS: usize = 30;
pub const RATING_BRACKET: f64 = 10.0;

pub fn default_draw_rating() -> f64 {
    // 100 Elo on the natural log-odds scale.
    100.0 * std::f64::consts::LN_10 / 400.0
}

pub fn default_refresh_rate() -> f64 {
    0.1
}

pub fn default_localization_height() -> f64 {
    3.0
}

pub fn default_localization_power() -> f64 {
    0.0
}

pub fn default_max_weight_iterations() -> usize {
    0
}

pub fn default_auto_localize() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Half-width, in rating units, of the draw band of the outcome model.
    #[serde(default = "default_draw_rating")]
    pub draw_rating: f64,
    /// Growth of the interval between forced refreshes; 0 refreshes after
    /// every outcome.
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: f64,
    /// Localization radius in deviations of the mean rating; 0 disables
    /// localization.
    #[serde(default = "default_localization_height")]
    pub localization_height: f64,
    /// Exponent of the sample count multiplying the localization radius.
    #[serde(default = "default_localization_power")]
    pub localization_power: f64,
    /// Cap on localization iterations per pass; 0 means uncapped.
    #[serde(default = "default_max_weight_iterations")]
    pub max_weight_iterations: usize,
    #[serde(default = "default_auto_localize")]
    pub auto_localize: bool,
    /// Overrides the model's own prior strength.
    #[serde(default)]
    pub prior_strength: Option<f64>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            draw_rating: default_draw_rating(),
            refresh_rate: default_refresh_rate(),
            localization_height: default_localization_height(),
            localization_power: default_localization_power(),
            max_weight_iterations: default_max_weight_iterations(),
            auto_localize: default_auto_localize(),
            prior_strength: None,
        }
    }
}

impl RegressionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_range("draw_rating", self.draw_rating, 0.0, f64::MAX)?;
        require_range("refresh_rate", self.refresh_rate, 0.0, f64::MAX)?;
        require_range("localization_height", self.localization_height, 0.0, f64::MAX)?;
        require_range("localization_power", self.localization_power, 0.0, 1.0)?;
        if let Some(strength) = self.prior_strength {
            require_positive("prior_strength", strength)?;
        }
        Ok(())
    }
}

/// One distinct sample point with its weighted outcome counts.
#[derive(Clone, Debug)]
pub struct SampleData {
    point: Array1<f64>,
    pub(crate) monomials: Array1<f64>,
    first_index: usize,
    pub(crate) weight: f64,
    pub(crate) counts: [u32; FINAL_OUTCOMES],
    pub(crate) probabilities: [f64; 2],
    replications: usize,
}

impl SampleData {
    pub(crate) fn new(
        point: Array1<f64>,
        pf: &dyn ParametricFunction,
        first_index: usize,
        weight: f64,
    ) -> Self {
        let monomials = pf.monomials(point.view());
        Self {
            point,
            monomials,
            first_index,
            weight,
            counts: [0; FINAL_OUTCOMES],
            probabilities: [0.0; 2],
            replications: 1,
        }
    }

    pub fn point(&self) -> ArrayView1<'_, f64> {
        self.point.view()
    }

    /// Index of the first sample merged into this entry.
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn counts(&self) -> [u32; FINAL_OUTCOMES] {
        self.counts
    }

    pub fn final_count(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// `[P(loss), P(win)]` at the MAP, valid while the log posterior is cached.
    pub fn probabilities(&self) -> [f64; 2] {
        self.probabilities
    }

    pub fn replications(&self) -> usize {
        self.replications
    }
}

/// One localization step: samples whose rating under `params` falls below
/// `mean` are weighted by `exp((rating - mean) / radius)`.
#[derive(Clone, Debug)]
pub struct WeightFunction {
    pub params: Array1<f64>,
    pub radius: f64,
    pub mean: f64,
}

/// MAP estimate with the Cholesky factor of the negated Hessian there.
#[derive(Clone, Copy)]
pub struct PosteriorView<'a> {
    pub pf: &'a dyn ParametricFunction,
    pub map: ArrayView1<'a, f64>,
    pub cholesky: ArrayView2<'a, f64>,
    pub samples: usize,
    pub wins: usize,
    pub losses: usize,
}

impl PosteriorView<'_> {
    pub fn rating(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.pf.value(self.map, x)
    }

    /// `Σ m` for monomials `m`, with `Σ` the Laplace covariance.
    pub fn covariance_times(&self, monomials: &Array1<f64>) -> Array1<f64> {
        let mut v = monomials.clone();
        cholesky_solve(self.cholesky, &mut v);
        v
    }

    /// Delta-method variance of the rating at `x`.
    pub fn variance(&self, x: ArrayView1<'_, f64>) -> f64 {
        let m = self.pf.monomials(x);
        m.dot(&self.covariance_times(&m))
    }
}

pub struct Regression {
    pf: Box<dyn ParametricFunction>,
    config: RegressionConfig,
    entries: Vec<SampleData>,
    sample_entry: Vec<usize>,
    tally: [usize; ALL_OUTCOMES],
    weight_functions: Vec<WeightFunction>,
    auto_localize: bool,
    outcome_counter: usize,
    next_refresh: usize,
    state: CacheFlags,
    map: Array1<f64>,
    log_p: f64,
    gradient: Array1<f64>,
    negative_hessian: Array2<f64>,
    cholesky: Option<Array2<f64>>,
    cholesky_inverse: Option<Array2<f64>>,
    last_fit: Option<OptimReport>,
}

impl Regression {
    pub fn new(
        mut pf: Box<dyn ParametricFunction>,
        config: RegressionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if pf.dimensions() == 0 {
            return Err(ConfigError::NoDimensions);
        }
        if let Some(strength) = config.prior_strength {
            pf.set_prior_strength(strength);
        }
        let n = pf.parameters();
        let map = pf.prior_params();
        Ok(Self {
            auto_localize: config.auto_localize,
            pf,
            config,
            entries: Vec::new(),
            sample_entry: Vec::new(),
            tally: [0; ALL_OUTCOMES],
            weight_functions: Vec::new(),
            outcome_counter: 0,
            next_refresh: 0,
            state: CacheFlags::EMPTY,
            map,
            log_p: 0.0,
            gradient: Array1::zeros(n),
            negative_hessian: Array2::zeros((n, n)),
            cholesky: None,
            cholesky_inverse: None,
            last_fit: None,
        })
    }

    pub fn with_defaults(pf: Box<dyn ParametricFunction>) -> Result<Self, ConfigError> {
        Self::new(pf, RegressionConfig::default())
    }

    pub fn pf(&self) -> &dyn ParametricFunction {
        &*self.pf
    }

    pub fn config(&self) -> &RegressionConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.pf.dimensions()
    }

    pub fn samples(&self) -> &[SampleData] {
        &self.entries
    }

    pub fn sample_weight(&self, entry: usize) -> f64 {
        self.entries[entry].weight
    }

    pub fn replications(&self, entry: usize) -> usize {
        self.entries[entry].replications
    }

    /// Entry holding sample `index` of the results stream.
    pub fn entry_of(&self, index: usize) -> usize {
        self.sample_entry[index]
    }

    /// Outcomes reported so far, including non-final ones.
    pub fn count(&self, outcome: Outcome) -> usize {
        self.tally[outcome.index()]
    }

    pub fn weight_functions(&self) -> &[WeightFunction] {
        &self.weight_functions
    }

    pub fn cache_state(&self) -> CacheFlags {
        self.state
    }

    /// Report of the most recent MAP fit.
    pub fn last_fit(&self) -> Option<OptimReport> {
        self.last_fit
    }

    pub fn auto_localize(&self) -> bool {
        self.auto_localize
    }

    // Setters. Anything that changes the posterior drops the cache.

    pub fn set_draw_rating(&mut self, draw_rating: f64) {
        self.config.draw_rating = draw_rating;
        self.invalidate();
    }

    pub fn set_refresh_rate(&mut self, rate: f64) {
        self.config.refresh_rate = rate;
    }

    pub fn set_localization_height(&mut self, height: f64) {
        self.config.localization_height = height;
    }

    pub fn set_localization_power(&mut self, power: f64) {
        self.config.localization_power = power;
    }

    pub fn set_max_weight_iterations(&mut self, iterations: usize) {
        self.config.max_weight_iterations = iterations;
    }

    pub fn set_auto_localize(&mut self, auto_localize: bool) {
        self.auto_localize = auto_localize;
    }

    pub fn set_prior_strength(&mut self, strength: f64) {
        self.pf.set_prior_strength(strength);
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.state = CacheFlags::EMPTY;
    }

    fn posterior(&self) -> Posterior<'_> {
        Posterior {
            pf: &*self.pf,
            entries: &self.entries,
            draw_rating: self.config.draw_rating,
        }
    }

    fn ensure(&mut self, need: CacheFlags) {
        while let Some(step) = plan_step(self.state, need) {
            self.compute(step);
            self.state.insert(step.flag());
        }
    }

    fn compute(&mut self, step: CacheStep) {
        match step {
            CacheStep::Map => self.fit_map(),
            CacheStep::LogP => {
                let mut probabilities = Vec::with_capacity(self.entries.len());
                self.log_p = self
                    .posterior()
                    .log_posterior_with(self.map.view(), &mut probabilities);
                for (entry, p) in self.entries.iter_mut().zip(probabilities) {
                    entry.probabilities = p;
                }
            }
            CacheStep::Gradient => {
                let probabilities = self.cached_probabilities();
                self.gradient = self.posterior().gradient(self.map.view(), &probabilities);
            }
            CacheStep::Hessian => {
                let probabilities = self.cached_probabilities();
                self.negative_hessian = self
                    .posterior()
                    .negative_hessian(self.map.view(), &probabilities);
            }
            CacheStep::Cholesky => {
                self.cholesky = match cholesky(self.negative_hessian.view()) {
                    Ok(l) => Some(l),
                    Err(err) => {
                        log::debug!("posterior is not usable: {err}");
                        None
                    }
                };
            }
            CacheStep::CholeskyInverse => {
                self.cholesky_inverse = self.cholesky.as_ref().map(|l| cholesky_inverse(l.view()));
            }
        }
    }

    fn cached_probabilities(&self) -> Vec<[f64; 2]> {
        self.entries.iter().map(|e| e.probabilities).collect()
    }

    fn fit_map(&mut self) {
        let warm = self.map.len() == self.pf.parameters() && self.map.iter().all(|v| v.is_finite());
        let mut x = if warm { self.map.clone() } else { self.pf.prior_params() };
        let report = {
            let mut objective = PosteriorObjective::new(self.posterior());
            newton(&mut objective, &mut x)
        };
        if !report.converged {
            log::debug!("MAP fit stopped after {} iterations without converging", report.iterations);
        }
        self.map = x;
        self.last_fit = Some(report);
    }

    /// MAP parameters, fitted on first access after a change.
    pub fn map(&mut self) -> &Array1<f64> {
        self.ensure(CacheFlags::MAP);
        &self.map
    }

    /// Log posterior at the MAP.
    pub fn log_p(&mut self) -> f64 {
        self.ensure(CacheFlags::LOG_P);
        self.log_p
    }

    /// Gradient of the log posterior at the MAP (near zero after a converged fit).
    pub fn gradient(&mut self) -> &Array1<f64> {
        self.ensure(CacheFlags::GRADIENT);
        &self.gradient
    }

    pub fn negative_hessian(&mut self) -> &Array2<f64> {
        self.ensure(CacheFlags::HESSIAN);
        &self.negative_hessian
    }

    /// Lower Cholesky factor of the negated Hessian, `None` when it is not
    /// positive definite.
    pub fn cholesky(&mut self) -> Option<&Array2<f64>> {
        self.ensure(CacheFlags::CHOLESKY);
        self.cholesky.as_ref()
    }

    /// `L⁻ᵀ` as an upper triangle.
    pub fn cholesky_inverse(&mut self) -> Option<&Array2<f64>> {
        self.ensure(CacheFlags::CHOLESKY_INVERSE);
        self.cholesky_inverse.as_ref()
    }

    /// Laplace covariance `(-H)⁻¹ = L⁻ᵀ L⁻¹`.
    pub fn posterior_covariance(&mut self) -> Option<Array2<f64>> {
        let u = self.cholesky_inverse()?;
        Some(u.dot(&u.t()))
    }

    pub fn posterior_view(&mut self) -> Option<PosteriorView<'_>> {
        self.ensure(CacheFlags::CHOLESKY);
        let l = self.cholesky.as_ref()?;
        Some(PosteriorView {
            pf: &*self.pf,
            map: self.map.view(),
            cholesky: l.view(),
            samples: self.sample_entry.len(),
            wins: self.tally[Outcome::Win.index()],
            losses: self.tally[Outcome::Loss.index()],
        })
    }

    /// Log posterior at arbitrary parameters.
    pub fn log_posterior(&self, params: ArrayView1<'_, f64>) -> f64 {
        self.posterior().log_posterior(params)
    }

    pub fn result_probability(&self, rating: f64, outcome: Outcome) -> f64 {
        posterior::result_probability(rating, self.config.draw_rating, outcome)
    }

    /// Expected score at `rating`, counting a draw as half a win.
    pub fn win_rate(&self, rating: f64) -> f64 {
        let delta = self.config.draw_rating;
        logistic(rating - delta) + 0.5 * logistic_difference(rating + delta, rating - delta)
    }

    /// Rating whose expected score is `win_rate`, by bisection on
    /// `[-10, 10]`.
    pub fn rating(&self, win_rate: f64) -> f64 {
        let mut low = -RATING_BRACKET;
        let mut high = RATING_BRACKET;
        for _ in 0..RATING_BISECTIONS {
            let middle = 0.5 * (low + high);
            if self.win_rate(middle) < win_rate {
                low = middle;
            } else {
                high = middle;
            }
        }
        0.5 * (low + high)
    }

    /// Draw from the Laplace approximation `N(MAP, (-H)⁻¹)`; the MAP itself
    /// when the posterior is not usable.
    pub fn gaussian_sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Array1<f64> {
        self.ensure(CacheFlags::CHOLESKY_INVERSE);
        let Some(u) = self.cholesky_inverse.as_ref() else {
            log::debug!("gaussian sample falls back to the MAP");
            return self.map.clone();
        };
        let z = Array1::from_shape_fn(self.map.len(), |_| standard_normal(&mut *rng));
        &self.map + &u.dot(&z)
    }

    /// Metropolis-Hastings chain proposing from the Laplace approximation.
    /// The first proposal is always accepted.
    pub fn mcmc_sample<R: Rng + ?Sized>(&mut self, rng: &mut R, steps: usize) -> Array1<f64> {
        let mut current = self.map().clone();
        let mut current_log_p = self.log_p();
        for step in 0..steps {
            let proposal = self.gaussian_sample(rng);
            let proposal_log_p = self.log_posterior(proposal.view());
            let delta = proposal_log_p - current_log_p;
            let accept = step == 0 || delta >= 0.0 || rng.random::<f64>() < delta.exp();
            if accept {
                current = proposal;
                current_log_p = proposal_log_p;
            }
        }
        current
    }

    fn log_weight_of(&self, monomials: &Array1<f64>) -> f64 {
        self.weight_functions
            .iter()
            .map(|w| (w.params.dot(monomials) - w.mean) / w.radius)
            .fold(0.0, f64::min)
    }

    /// Log of the localization weight at `x`; 0 inside the trusted region.
    pub fn log_weight(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.log_weight_of(&self.pf.monomials(x))
    }

    pub fn weight(&self, x: ArrayView1<'_, f64>) -> f64 {
        self.log_weight(x).exp()
    }

    /// Sum of weight times final outcome count over all entries.
    pub fn total_weight(&self) -> f64 {
        let mut sum = crate::linalg::utils::KahanSum::default();
        for entry in &self.entries {
            sum.add(entry.weight * f64::from(entry.final_count()));
        }
        sum.sum()
    }

    /// Weighted `[losses, wins, draws]`.
    pub fn weighted_counts(&self) -> [f64; FINAL_OUTCOMES] {
        let mut totals = [0.0; FINAL_OUTCOMES];
        for entry in &self.entries {
            for (total, &count) in totals.iter_mut().zip(&entry.counts) {
                *total += entry.weight * f64::from(count);
            }
        }
        totals
    }

    /// Weighted average of the sample points, `None` before any outcome.
    pub fn average_sample(&self) -> Option<Array1<f64>> {
        let mut sum = Array1::zeros(self.dimensions());
        let mut total = 0.0;
        for entry in &self.entries {
            let w = entry.weight * f64::from(entry.final_count());
            sum.scaled_add(w, &entry.point);
            total += w;
        }
        (total > 0.0).then(|| sum / total)
    }

    fn compute_weights(&mut self) {
        for i in 0..self.entries.len() {
            let log_weight = self.log_weight_of(&self.entries[i].monomials);
            let weight = log_weight.exp();
            if !weight.is_finite() {
                log::warn!("non-finite localization weight {weight} at entry {i}");
            }
            self.entries[i].weight = weight;
        }
        self.invalidate();
    }

    pub fn set_uniform_weights(&mut self) {
        self.weight_functions.clear();
        for entry in &mut self.entries {
            entry.weight = 1.0;
        }
        self.invalidate();
    }

    /// Maximum-likelihood rating of the weighted outcome pool and its
    /// standard deviation.
    ///
    /// With `u = e^r` and `t = e^δ`, the likelihood equation is the quadratic
    /// `(L + D) u² + (L - W) t u - (W + D) = 0`, whose positive root is the
    /// estimate. `None` when the pool has no loss-like or no win-like result.
    pub fn mean_and_deviation(&self) -> Option<(f64, f64)> {
        let [l, w, d] = self.weighted_counts();
        let (loss_side, win_side) = (l + d, w + d);
        if !(loss_side > 0.0 && win_side > 0.0) {
            return None;
        }
        let t = self.config.draw_rating.exp();
        let b = (l - w) * t;
        let u = (-b + (b * b + 4.0 * loss_side * win_side).sqrt()) / (2.0 * loss_side);
        let mean = u.ln();
        let [p0, p1] = posterior::outcome_probabilities(mean, self.config.draw_rating);
        let information = loss_side * p0 * (1.0 - p0) + win_side * p1 * (1.0 - p1);
        Some((mean, 1.0 / information.sqrt()))
    }

    /// Appends one weighting function built from the current MAP.
    ///
    /// Returns `false` without changing anything when localization is
    /// disabled or at most one win or one loss has been reported.
    pub fn localization_iteration(&mut self) -> bool {
        let height = self.config.localization_height;
        if height <= 0.0 || self.count(Outcome::Loss) <= 1 || self.count(Outcome::Win) <= 1 {
            return false;
        }
        let Some((mean, deviation)) = self.mean_and_deviation() else {
            return false;
        };
        let samples = self.sample_entry.len() as f64;
        let radius = height * deviation * samples.powf(self.config.localization_power);
        if !(radius > 0.0 && radius.is_finite()) {
            log::warn!("skipping localization with radius {radius}");
            return false;
        }
        let params = self.map().clone();
        self.weight_functions.push(WeightFunction {
            params,
            radius,
            mean,
        });
        self.compute_weights();
        true
    }

    /// Rebuilds the weighting from scratch, adding weighting functions until
    /// the total weight stops shrinking by more than 1%.
    ///
    /// Without an iteration cap the last step, the one that over-shrinks,
    /// is discarded. A capped pass keeps every step.
    pub fn compute_local_weights(&mut self) {
        self.set_uniform_weights();
        let cap = self.config.max_weight_iterations;
        let mut iterations = 0;
        loop {
            let previous = self.total_weight();
            self.localization_iteration();
            iterations += 1;
            if cap > 0 && iterations >= cap {
                log::debug!("localization stopped at its cap of {cap} iterations");
                break;
            }
            if self.total_weight() >= LOCALIZATION_SHRINK * previous {
                break;
            }
        }
        if cap == 0 && self.weight_functions.pop().is_some() {
            self.compute_weights();
        }
    }

    /// MAP rating at `x` and its delta-method variance.
    pub fn posterior_info(&mut self, x: ArrayView1<'_, f64>) -> Option<(f64, f64)> {
        let view = self.posterior_view()?;
        Some((view.rating(x), view.variance(x)))
    }

    /// MAP value of parameter `i` scaled by the square root of its
    /// posterior precision, `√H_ii · θ_i`.
    ///
    /// `Φ` of this value is the conditional probability that the parameter
    /// is positive.
    pub fn param_positivity(&mut self, i: usize) -> f64 {
        let precision = self.negative_hessian()[[i, i]];
        precision.sqrt() * self.map[i]
    }

    fn ingest_sample(&mut self, index: usize, point: ArrayView1<'_, f64>) {
        assert_eq!(
            index,
            self.sample_entry.len(),
            "regression expected sample {} but got {index}",
            self.sample_entry.len()
        );
        if let Some(last) = self.entries.last_mut() {
            if last.point == point {
                last.replications += 1;
                self.sample_entry.push(self.entries.len() - 1);
                return;
            }
        }
        let mut entry = SampleData::new(point.to_owned(), &*self.pf, index, 1.0);
        entry.weight = self.log_weight_of(&entry.monomials).exp();
        self.entries.push(entry);
        self.sample_entry.push(self.entries.len() - 1);
    }

    fn ingest_outcome(&mut self, index: usize, outcome: Outcome) {
        self.tally[outcome.index()] += 1;
        if outcome.is_final() {
            let entry = self.sample_entry[index];
            self.entries[entry].counts[outcome.index()] += 1;
        }
        self.invalidate();
    }
}

impl Observer for Regression {
    /// Clears everything, then replays whatever the results already hold.
    fn on_reset(&mut self, results: &Results) {
        self.entries.clear();
        self.sample_entry.clear();
        self.tally = [0; ALL_OUTCOMES];
        self.weight_functions.clear();
        self.auto_localize = self.config.auto_localize;
        self.outcome_counter = 0;
        self.next_refresh = 0;
        self.map = self.pf.prior_params();
        self.invalidate();
        for i in 0..results.len() {
            self.ingest_sample(i, results.sample(i));
            let outcome = results.outcome(i);
            if outcome != Outcome::InProgress {
                self.ingest_outcome(i, outcome);
            }
        }
    }

    fn on_sample(&mut self, results: &Results) {
        let index = results.len() - 1;
        self.ingest_sample(index, results.sample(index));
    }

    fn on_outcome(&mut self, results: &Results, index: usize) {
        self.ingest_outcome(index, results.outcome(index));
        if self.outcome_counter == self.next_refresh {
            self.next_refresh += 1 + (self.next_refresh as f64 * self.config.refresh_rate) as usize;
            if self.auto_localize {
                self.compute_local_weights();
            }
        }
        self.outcome_counter += 1;
    }

    fn on_refresh(&mut self, _results: &Results) {
        self.invalidate();
        if self.auto_localize {
            self.compute_local_weights();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parametric::QuadraticFunction;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    fn plain_regression(dimensions: usize) -> Regression {
        let config = RegressionConfig {
            auto_localize: false,
            ..RegressionConfig::default()
        };
        Regression::new(Box::new(QuadraticFunction::new(dimensions)), config).expect("valid config")
    }

    fn feed(regression: &mut Regression, results: &mut Results, x: Array1<f64>, outcome: Outcome) {
        let index = results.add_sample(x);
        regression.on_sample(results);
        results.add_outcome(index, outcome);
        regression.on_outcome(results, index);
    }

    /// Outcomes drawn from a logistic peak at `x = 0.3` on a 1-D grid.
    fn peaked_history(regression: &mut Regression, samples: usize, seed: u64) -> Results {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut results = Results::new(1);
        for k in 0..samples {
            let x = -1.0 + 2.0 * (k % 41) as f64 / 40.0;
            let strength = 1.0 - 6.0 * (x - 0.3) * (x - 0.3);
            let outcome = if rng.random::<f64>() < logistic(strength) {
                Outcome::Win
            } else {
                Outcome::Loss
            };
            feed(regression, &mut results, array![x], outcome);
        }
        results
    }

    #[test]
    fn a_win_and_a_loss_tilt_the_ratings_apart() {
        let mut regression = plain_regression(1);
        let mut results = Results::new(1);
        feed(&mut regression, &mut results, array![0.5], Outcome::Win);
        feed(&mut regression, &mut results, array![-0.5], Outcome::Loss);
        let (up, _) = regression.posterior_info(array![0.5].view()).expect("prior keeps it definite");
        let (down, _) = regression.posterior_info(array![-0.5].view()).expect("definite");
        assert!(up > 0.0, "rating at the win is {up}");
        assert!(down < 0.0, "rating at the loss is {down}");
    }

    #[test]
    fn consecutive_repeats_share_an_entry() {
        let mut regression = plain_regression(1);
        let mut results = Results::new(1);
        feed(&mut regression, &mut results, array![0.2], Outcome::Win);
        feed(&mut regression, &mut results, array![0.2], Outcome::Draw);
        feed(&mut regression, &mut results, array![-0.1], Outcome::Loss);
        feed(&mut regression, &mut results, array![0.2], Outcome::Unknown);
        assert_eq!(regression.samples().len(), 3);
        assert_eq!(regression.replications(0), 2);
        assert_eq!(regression.samples()[0].counts(), [0, 1, 1]);
        assert_eq!(regression.entry_of(3), 2);
        assert_eq!(regression.samples()[2].final_count(), 0);
        assert_eq!(regression.count(Outcome::Unknown), 1);
        let tallied: u32 = regression.samples().iter().map(SampleData::final_count).sum();
        assert_eq!(tallied, 3);
    }

    #[test]
    fn map_is_cached_until_the_data_changes() {
        let mut regression = plain_regression(1);
        let mut results = peaked_history(&mut regression, 120, 7);
        let first = regression.map().clone();
        let second = regression.map().clone();
        assert_eq!(first, second);
        assert!(regression.cache_state().contains(CacheFlags::MAP));

        let before = regression.negative_hessian()[[2, 2]];
        feed(&mut regression, &mut results, array![0.95], Outcome::Win);
        assert_eq!(regression.cache_state(), CacheFlags::EMPTY);
        let after = regression.negative_hessian()[[2, 2]];
        assert_ne!(before, after);
    }

    #[test]
    fn fitted_map_is_a_stationary_point() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 200, 11);
        let gradient = regression.gradient().clone();
        for g in gradient.iter() {
            assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-2);
        }
        // Curvature of the fitted model points the right way.
        assert!(regression.map()[2] < 0.0);
    }

    #[test]
    fn gaussian_samples_match_the_laplace_covariance() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 300, 3);
        let covariance = regression.posterior_covariance().expect("definite posterior");
        let mean = regression.map().clone();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 10_000;
        let n = mean.len();
        let mut empirical = Array2::<f64>::zeros((n, n));
        for _ in 0..draws {
            let d = regression.gaussian_sample(&mut rng) - &mean;
            for i in 0..n {
                for j in 0..n {
                    empirical[[i, j]] += d[i] * d[j];
                }
            }
        }
        empirical /= draws as f64;
        for i in 0..n {
            for j in 0..n {
                let scale = (covariance[[i, i]] * covariance[[j, j]]).sqrt();
                assert_abs_diff_eq!(empirical[[i, j]] / scale, covariance[[i, j]] / scale, epsilon = 0.06);
            }
        }
    }

    #[test]
    fn mcmc_chain_starts_from_an_accepted_proposal() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 80, 5);
        let mut rng = StdRng::seed_from_u64(9);
        let map = regression.map().clone();
        assert_eq!(regression.mcmc_sample(&mut rng, 0), map);
        let sample = regression.mcmc_sample(&mut rng, 20);
        assert_eq!(sample.len(), 3);
        assert!(sample.iter().all(|v| v.is_finite()));
        assert!(regression.log_posterior(sample.view()) <= regression.log_p() + 1e-4);
    }

    #[test]
    fn rating_inverts_the_win_rate() {
        let regression = plain_regression(1);
        for &r in &[-2.0, -0.3, 0.0, 0.8, 4.0] {
            assert_abs_diff_eq!(regression.rating(regression.win_rate(r)), r, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(regression.win_rate(0.0), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn pool_rating_solves_the_likelihood_equation() {
        let mut regression = plain_regression(1);
        let mut results = Results::new(1);
        for (x, outcome) in [
            (0.1, Outcome::Win),
            (0.2, Outcome::Win),
            (0.3, Outcome::Draw),
            (0.4, Outcome::Loss),
            (0.5, Outcome::Win),
        ] {
            feed(&mut regression, &mut results, array![x], outcome);
        }
        let (mean, deviation) = regression.mean_and_deviation().expect("both sides present");
        let [l, w, d] = regression.weighted_counts();
        let [p0, p1] = posterior::outcome_probabilities(mean, regression.config().draw_rating);
        assert_abs_diff_eq!(w * (1.0 - p1) + l * (p0 - 1.0) + d * (p0 - p1), 0.0, epsilon = 1e-12);
        assert!(mean > 0.0);
        assert!(deviation > 0.0);
    }

    #[test]
    fn localization_down_weights_the_far_side() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 400, 21);
        regression.compute_local_weights();
        assert!(!regression.weight_functions().is_empty());
        let weights: Vec<f64> = regression.samples().iter().map(SampleData::weight).collect();
        assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        assert!(regression.weight(array![-1.0].view()) < regression.weight(array![0.3].view()));

        regression.set_uniform_weights();
        assert!(regression.weight_functions().is_empty());
        assert_abs_diff_eq!(regression.total_weight(), 400.0, epsilon = 1e-9);
    }

    #[test]
    fn localization_needs_a_positive_height() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 100, 2);
        regression.set_localization_height(0.0);
        assert!(!regression.localization_iteration());
        regression.compute_local_weights();
        assert!(regression.weight_functions().is_empty());
    }

    #[test]
    fn positivity_scales_by_the_precision_diagonal() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 300, 13);
        let z = regression.param_positivity(2);
        let h = regression.negative_hessian()[[2, 2]];
        let theta = regression.map()[2];
        assert_abs_diff_eq!(z, h.sqrt() * theta, epsilon = 1e-12);
        assert!(z < -1.0, "quadratic coefficient positivity {z}");
        // The marginal z-score is smaller whenever parameters correlate.
        let covariance = regression.posterior_covariance().expect("definite posterior");
        assert!(z.abs() >= theta.abs() / covariance[[2, 2]].sqrt() - 1e-9);
    }

    #[test]
    fn draws_fit_without_a_draw_band() {
        let config = RegressionConfig {
            draw_rating: 0.0,
            auto_localize: false,
            ..RegressionConfig::default()
        };
        let mut regression =
            Regression::new(Box::new(QuadraticFunction::new(1)), config).expect("valid config");
        let mut results = Results::new(1);
        feed(&mut regression, &mut results, array![0.5], Outcome::Win);
        feed(&mut regression, &mut results, array![-0.5], Outcome::Loss);
        feed(&mut regression, &mut results, array![0.0], Outcome::Draw);
        assert!(regression.log_p().is_finite());
        let report = regression.last_fit().expect("fitted");
        assert!(report.converged, "{report:?}");
        assert!(regression.cholesky().is_some());
        assert!(regression.map().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn localization_waits_for_two_reported_wins_and_losses() {
        let mut regression = plain_regression(1);
        let mut results = Results::new(1);
        feed(&mut regression, &mut results, array![0.1], Outcome::Win);
        feed(&mut regression, &mut results, array![0.2], Outcome::Win);
        feed(&mut regression, &mut results, array![0.3], Outcome::Loss);
        for _ in 0..5 {
            feed(&mut regression, &mut results, array![0.4], Outcome::Draw);
        }
        assert!(!regression.localization_iteration());
        feed(&mut regression, &mut results, array![-0.9], Outcome::Loss);
        assert!(regression.localization_iteration());
        // Radius is height times deviation at power 0.
        let (_, deviation) = {
            regression.set_uniform_weights();
            regression.mean_and_deviation().expect("both sides present")
        };
        assert!(regression.localization_iteration());
        let radius = regression.weight_functions()[0].radius;
        assert_abs_diff_eq!(radius, 3.0 * deviation, epsilon = 1e-12);
    }

    #[test]
    fn localization_radius_grows_with_the_sample_count() {
        let mut regression = plain_regression(1);
        let results = peaked_history(&mut regression, 100, 4);
        regression.set_localization_power(0.5);
        let (_, deviation) = regression.mean_and_deviation().expect("both sides present");
        assert!(regression.localization_iteration());
        let radius = regression.weight_functions()[0].radius;
        assert_abs_diff_eq!(radius, 3.0 * deviation * (results.len() as f64).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn a_capped_pass_keeps_every_step() {
        let mut regression = plain_regression(1);
        peaked_history(&mut regression, 400, 21);
        regression.set_max_weight_iterations(1);
        regression.compute_local_weights();
        assert_eq!(regression.weight_functions().len(), 1);

        // The uncapped pass drops its final step, so one iteration that
        // already fails to shrink leaves no weighting at all.
        regression.set_max_weight_iterations(0);
        regression.set_localization_height(1e9);
        regression.compute_local_weights();
        assert!(regression.weight_functions().is_empty());
        assert_abs_diff_eq!(regression.total_weight(), 400.0, epsilon = 1e-6);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = RegressionConfig {
            localization_power: 2.0,
            ..RegressionConfig::default()
        };
        assert!(Regression::new(Box::new(QuadraticFunction::new(1)), config).is_err());
        assert!(matches!(
            Regression::with_defaults(Box::new(QuadraticFunction::new(0))),
            Err(ConfigError::NoDimensions)
        ));
    }
}
