use super::{PolicyContext, SamplingPolicy, check_index};
use crate::estimator::MaxEstimator;
use crate::linalg::cholesky;
use crate::observer::{Observer, Results};
use crate::probability::standard_normal;
use crate::types::{ConfigError, Outcome, require_range};
use ndarray::{Array1, Array2};
use rand::{RngExt, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_ce_smoothing() -> f64 {
    1.0
}

pub fn default_ce_dynamic() -> f64 {
    0.1
}

pub fn default_ce_distribution_smoothing() -> bool {
    true
}

pub fn default_ce_population() -> usize {
    100
}

pub fn default_ce_selection() -> usize {
    10
}

pub fn default_ce_batch() -> usize {
    10
}

pub fn default_ce_batch_growth() -> f64 {
    1.15
}

pub fn default_ce_diagonal() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossEntropyConfig {
    /// Weight of the elite mean in the new mean.
    #[serde(default = "default_ce_smoothing")]
    pub smoothing: f64,
    /// Decay of the variance smoothing, `x_G = s / (1 + √(G - 2) · dynamic)`.
    #[serde(default = "default_ce_dynamic")]
    pub dynamic: f64,
    /// Add the shift of the mean to the previous variance before smoothing.
    #[serde(default = "default_ce_distribution_smoothing")]
    pub distribution_smoothing: bool,
    #[serde(default = "default_ce_population")]
    pub population: usize,
    #[serde(default = "default_ce_selection")]
    pub selection: usize,
    /// Passes over the population in the first generation.
    #[serde(default = "default_ce_batch")]
    pub batch: usize,
    #[serde(default = "default_ce_batch_growth")]
    pub batch_growth: f64,
    /// Fit independent coordinates instead of a full covariance.
    #[serde(default = "default_ce_diagonal")]
    pub diagonal: bool,
}

impl Default for CrossEntropyConfig {
    fn default() -> Self {
        Self {
            smoothing: default_ce_smoothing(),
            dynamic: default_ce_dynamic(),
            distribution_smoothing: default_ce_distribution_smoothing(),
            population: default_ce_population(),
            selection: default_ce_selection(),
            batch: default_ce_batch(),
            batch_growth: default_ce_batch_growth(),
            diagonal: default_ce_diagonal(),
        }
    }
}

impl CrossEntropyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection > self.population {
            return Err(ConfigError::SelectionExceedsPopulation {
                selection: self.selection,
                population: self.population,
            });
        }
        if self.selection < 2 {
            return Err(ConfigError::SelectionTooSmall(self.selection));
        }
        require_range("smoothing", self.smoothing, f64::MIN_POSITIVE, 1.0)?;
        require_range("dynamic", self.dynamic, 0.0, f64::MAX)?;
        if self.batch == 0 {
            return Err(ConfigError::NonPositive {
                name: "batch",
                value: 0.0,
            });
        }
        require_range("batch_growth", self.batch_growth, 1.0, f64::MAX)
    }

    /// Weight of the elite variance when generation `generation >= 2` is
    /// built.
    pub fn variance_smoothing(&self, generation: usize) -> f64 {
        let age = generation.saturating_sub(2) as f64;
        self.smoothing / (1.0 + age.sqrt() * self.dynamic)
    }
}

#[derive(Clone, Debug)]
struct Individual {
    point: Array1<f64>,
    victories: usize,
    games: usize,
}

/// Cross-entropy search over a Gaussian sampling distribution.
///
/// The first generation is uniform in the box. Each generation is played in
/// passes over the population, highest index first. `scores[v]` counts the
/// individuals that already have more than `v` wins; an individual that can
/// no longer reach the top `selection` even by winning every remaining pass
/// is skipped. After the last pass the population is ranked by wins, the
/// elite's mean and variance (`n - 1` denominator) are smoothed with the
/// previous distribution, and a new population is drawn from it. The number
/// of passes grows by `batch_growth` each generation.
///
/// Outcomes of games still pending when a generation ends are dropped.
pub struct CrossEntropy {
    config: CrossEntropyConfig,
    dimensions: usize,
    population: Vec<Individual>,
    scores: Vec<usize>,
    mean: Array1<f64>,
    covariance: Array2<f64>,
    previous_mean: Array1<f64>,
    previous_covariance: Array2<f64>,
    generation: usize,
    batch_size: usize,
    population_index: usize,
    batch_index: usize,
    in_progress: HashMap<usize, (usize, usize)>,
    elite: Vec<usize>,
    last_victories: Vec<usize>,
    requested: usize,
    rng: StdRng,
}

impl CrossEntropy {
    pub fn new(dimensions: usize, config: CrossEntropyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            dimensions,
            population: Vec::new(),
            scores: Vec::new(),
            mean: Array1::zeros(dimensions),
            covariance: Array2::zeros((dimensions, dimensions)),
            previous_mean: Array1::zeros(dimensions),
            previous_covariance: Array2::zeros((dimensions, dimensions)),
            generation: 0,
            batch_size: config.batch,
            population_index: 0,
            batch_index: 0,
            in_progress: HashMap::new(),
            elite: Vec::new(),
            last_victories: Vec::new(),
            requested: 0,
            rng: StdRng::seed_from_u64(0),
            config,
        })
    }

    /// Mean of the distribution the current generation was drawn from.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Generations started so far; 0 before the first sample.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Passes over the population planned for the next generation.
    pub fn batch(&self) -> usize {
        self.batch_size
    }

    /// Population indices selected when the current generation was built.
    pub fn last_elite(&self) -> &[usize] {
        &self.elite
    }

    /// Wins of the previous generation, by population index.
    pub fn last_victories(&self) -> &[usize] {
        &self.last_victories
    }

    /// Mean before the last refit.
    pub fn previous_mean(&self) -> &Array1<f64> {
        &self.previous_mean
    }

    /// Sample mean and variance of the first `n` individuals. Off-diagonal
    /// terms stay 0 in diagonal mode.
    fn fit(&mut self, n: usize) {
        let d = self.dimensions;
        let mut mean = Array1::<f64>::zeros(d);
        for individual in &self.population[..n] {
            mean += &individual.point;
        }
        mean /= n as f64;
        let mut covariance = Array2::<f64>::zeros((d, d));
        for i in 0..d {
            for j in i..d {
                if i != j && self.config.diagonal {
                    continue;
                }
                let sum: f64 = self.population[..n]
                    .iter()
                    .map(|ind| (mean[i] - ind.point[i]) * (mean[j] - ind.point[j]))
                    .sum();
                covariance[[i, j]] = sum / (n - 1) as f64;
                covariance[[j, i]] = covariance[[i, j]];
            }
        }
        self.mean = mean;
        self.covariance = covariance;
    }

    fn uniform_population(&mut self) {
        self.population = (0..self.config.population)
            .map(|_| Individual {
                point: Array1::from_shape_fn(self.dimensions, |_| self.rng.random_range(-1.0..1.0)),
                victories: 0,
                games: 0,
            })
            .collect();
    }

    /// Ranks the finished generation by wins and refits the smoothed
    /// distribution to its elite.
    fn select(&mut self) {
        self.last_victories = self.population.iter().map(|ind| ind.victories).collect();
        let mut order: Vec<usize> = (0..self.population.len()).collect();
        order.sort_by(|&a, &b| self.last_victories[b].cmp(&self.last_victories[a]));
        self.population = order.iter().map(|&i| self.population[i].clone()).collect();
        order.truncate(self.config.selection);
        self.elite = order;
        self.fit(self.config.selection);

        let s = self.config.smoothing;
        self.mean = &self.mean * s + &self.previous_mean * (1.0 - s);
        let x = self.config.variance_smoothing(self.generation);
        let shift = &self.mean - &self.previous_mean;
        for i in 0..self.dimensions {
            for j in i..self.dimensions {
                let mut old = self.previous_covariance[[i, j]];
                if self.config.distribution_smoothing {
                    old += shift[i] * shift[j];
                }
                let v = x * self.covariance[[i, j]] + (1.0 - x) * old;
                self.covariance[[i, j]] = v;
                self.covariance[[j, i]] = v;
            }
        }
    }

    fn gaussian_population(&mut self) {
        let factor = match cholesky(self.covariance.view()) {
            Ok(l) => Some(l),
            Err(err) => {
                log::debug!("cross-entropy covariance unusable ({err}), sampling at the mean");
                None
            }
        };
        let d = self.dimensions;
        for individual in &mut self.population {
            let z = Array1::from_shape_fn(d, |_| standard_normal(&mut self.rng));
            let mut point = self.mean.clone();
            if let Some(l) = factor.as_ref() {
                // Each partial sum is kept inside the box.
                for i in 0..d {
                    for j in 0..=i {
                        point[i] = (point[i] + z[j] * l[[i, j]]).clamp(-1.0, 1.0);
                    }
                }
            }
            *individual = Individual {
                point,
                victories: 0,
                games: 0,
            };
        }
    }

    fn new_generation(&mut self) {
        self.generation += 1;
        if self.generation == 1 {
            self.uniform_population();
            self.fit(self.config.population);
        } else {
            self.select();
            self.gaussian_population();
            self.batch_size = (self.batch_size as f64 * self.config.batch_growth) as usize;
        }
        self.previous_mean = self.mean.clone();
        self.previous_covariance = self.covariance.clone();
        self.scores = vec![0; self.batch_size];
        log::debug!(
            "cross-entropy generation {} starts at sample {}",
            self.generation,
            self.requested
        );
    }

    /// Whether the individual could still finish among the elite.
    fn contends(&self, individual: usize) -> bool {
        let wins = self.population[individual].victories + self.batch_index;
        self.scores
            .get(wins)
            .is_none_or(|&ahead| ahead < self.config.selection)
    }
}

impl Observer for CrossEntropy {
    fn on_reset(&mut self, _results: &Results) {
        self.population.clear();
        self.scores.clear();
        self.in_progress.clear();
        self.elite.clear();
        self.last_victories.clear();
        self.generation = 0;
        self.population_index = 0;
        self.batch_index = 0;
        self.batch_size = self.config.batch;
        self.previous_mean.fill(0.0);
        self.requested = 0;
    }

    /// Counts the game for its individual. Only a win raises the score, so
    /// draws and unknown results are played non-wins.
    fn on_outcome(&mut self, results: &Results, index: usize) {
        let Some((generation, individual)) = self.in_progress.remove(&index) else {
            log::warn!("ignoring outcome {index}: not requested from this policy");
            return;
        };
        if generation != self.generation {
            log::debug!("dropping outcome {index} from generation {generation}");
            return;
        }
        let member = &mut self.population[individual];
        if results.outcome(index) == Outcome::Win {
            if let Some(ahead) = self.scores.get_mut(member.victories) {
                *ahead += 1;
            }
            member.victories += 1;
        }
        member.games += 1;
    }
}

impl SamplingPolicy for CrossEntropy {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        check_index(self.requested, index);
        self.requested += 1;
        loop {
            if self.population_index == 0 {
                self.population_index = self.config.population;
                if self.batch_index == 0 {
                    self.batch_index = self.batch_size;
                    if !self.in_progress.is_empty() {
                        log::debug!(
                            "cross-entropy generation {} ends with {} games pending",
                            self.generation,
                            self.in_progress.len()
                        );
                    }
                    self.new_generation();
                }
                self.batch_index -= 1;
            }
            self.population_index -= 1;
            let individual = self.population_index;
            if self.contends(individual) {
                self.in_progress.insert(index, (self.generation, individual));
                return self.population[individual].point.clone();
            }
        }
    }

    fn is_flexible(&self) -> bool {
        false
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn as_max_estimator(&mut self) -> Option<&mut dyn MaxEstimator> {
        Some(self)
    }
}

impl MaxEstimator for CrossEntropy {
    /// Nothing before the first sample, the individual with the most wins
    /// during the uniform generation, then the distribution mean.
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        match self.generation {
            0 => None,
            1 => self
                .population
                .iter()
                .enumerate()
                .max_by(|(a, x), (b, y)| x.victories.cmp(&y.victories).then(b.cmp(a)))
                .map(|(_, best)| best.point.clone()),
            _ => Some(self.mean.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn small(population: usize, selection: usize, batch: usize) -> CrossEntropyConfig {
        CrossEntropyConfig {
            population,
            selection,
            batch,
            ..CrossEntropyConfig::default()
        }
    }

    fn request(policy: &mut CrossEntropy, results: &mut Results) -> (usize, Array1<f64>) {
        let index = results.len();
        let x = {
            let mut ctx = PolicyContext::new(results, None);
            policy.next_sample(index, &mut ctx)
        };
        results.add_sample(x.clone());
        (index, x)
    }

    fn report(policy: &mut CrossEntropy, results: &mut Results, index: usize, outcome: Outcome) {
        results.add_outcome(index, outcome);
        policy.on_outcome(results, index);
    }

    #[test]
    fn first_generation_is_uniform_with_unbiased_variance() {
        let mut policy = CrossEntropy::new(2, small(50, 5, 1)).expect("valid");
        policy.seed(4);
        assert_eq!(policy.generation(), 0);
        let mut results = Results::new(2);
        request(&mut policy, &mut results);
        assert_eq!(policy.generation(), 1);
        let points: Vec<&Array1<f64>> = policy.population.iter().map(|i| &i.point).collect();
        assert!(points.iter().all(|p| p.iter().all(|v| (-1.0..1.0).contains(v))));
        let n = points.len() as f64;
        let mean0 = points.iter().map(|p| p[0]).sum::<f64>() / n;
        let var0 = points.iter().map(|p| (p[0] - mean0).powi(2)).sum::<f64>() / (n - 1.0);
        assert_abs_diff_eq!(policy.mean()[0], mean0, epsilon = 1e-12);
        assert_abs_diff_eq!(policy.covariance()[[0, 0]], var0, epsilon = 1e-12);
        assert_eq!(policy.covariance()[[0, 1]], 0.0);
    }

    #[test]
    fn hopeless_individuals_are_skipped() {
        let mut policy = CrossEntropy::new(1, small(4, 2, 3)).expect("valid");
        policy.seed(9);
        let mut results = Results::new(1);
        let mut points = Vec::new();
        for k in 0..8 {
            let (i, x) = request(&mut policy, &mut results);
            points.push(x);
            let outcome = if k == 2 || k == 3 { Outcome::Loss } else { Outcome::Win };
            report(&mut policy, &mut results, i, outcome);
        }
        assert_eq!(policy.generation(), 1);
        // Pass one visits individuals 3, 2, 1, 0. The two losers cannot catch
        // the two winners after that, so later passes only replay 3 and 2.
        assert_eq!(points[4], points[0]);
        assert_eq!(points[5], points[1]);
        assert_eq!(points[6], points[0]);
        assert_eq!(points[7], points[1]);
        request(&mut policy, &mut results);
        assert_eq!(policy.generation(), 2);
        // Ties keep population order.
        assert_eq!(policy.last_elite(), &[2, 3]);
    }

    #[test]
    fn ranking_counts_wins_only() {
        let mut policy = CrossEntropy::new(1, small(4, 2, 5)).expect("valid");
        let mut results = Results::new(1);
        request(&mut policy, &mut results);
        // Three wins against two wins and three draws.
        policy.population[0].victories = 3;
        policy.population[0].games = 3;
        policy.population[1].victories = 2;
        policy.population[1].games = 5;
        policy.population[2].victories = 2;
        policy.population[2].games = 2;
        policy.new_generation();
        assert_eq!(policy.last_elite(), &[0, 1]);
        assert_eq!(policy.last_victories(), &[3, 2, 2, 0]);
    }

    #[test]
    fn draws_and_unknown_results_are_played_non_wins() {
        let mut policy = CrossEntropy::new(1, small(4, 2, 2)).expect("valid");
        let mut results = Results::new(1);
        let outcomes = [Outcome::Draw, Outcome::Unknown, Outcome::Win];
        for outcome in outcomes {
            let (i, _) = request(&mut policy, &mut results);
            report(&mut policy, &mut results, i, outcome);
        }
        let played: Vec<(usize, usize)> =
            policy.population.iter().map(|i| (i.victories, i.games)).collect();
        assert_eq!(played, vec![(0, 0), (1, 1), (0, 1), (0, 1)]);
        assert_eq!(policy.scores[0], 1);
    }

    #[test]
    fn variance_smoothing_decays_with_the_generation() {
        let config = CrossEntropyConfig {
            smoothing: 0.8,
            ..CrossEntropyConfig::default()
        };
        assert_abs_diff_eq!(config.variance_smoothing(2), 0.8, epsilon = 1e-15);
        assert_abs_diff_eq!(config.variance_smoothing(6), 0.8 / 1.2, epsilon = 1e-15);
    }

    #[test]
    fn distribution_smoothing_adds_the_mean_shift() {
        let build = |distribution_smoothing: bool| {
            let config = CrossEntropyConfig {
                smoothing: 0.5,
                distribution_smoothing,
                diagonal: false,
                ..small(6, 3, 1)
            };
            let mut policy = CrossEntropy::new(2, config).expect("valid");
            policy.seed(12);
            let mut results = Results::new(2);
            request(&mut policy, &mut results);
            for k in 0..3 {
                policy.population[k].victories = 1;
            }
            let before = policy.mean().clone();
            policy.new_generation();
            (policy, before)
        };
        let (with, before) = build(true);
        let (without, _) = build(false);
        assert_eq!(with.mean(), without.mean());
        let shift = with.mean() - &before;
        let x = with.config.variance_smoothing(2);
        for i in 0..2 {
            for j in 0..2 {
                let extra = with.covariance()[[i, j]] - without.covariance()[[i, j]];
                assert_abs_diff_eq!(extra, (1.0 - x) * shift[i] * shift[j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn max_parameter_tracks_the_generation() {
        let mut policy = CrossEntropy::new(1, small(4, 2, 1)).expect("valid");
        assert_eq!(policy.max_parameter(), None);
        let mut results = Results::new(1);
        request(&mut policy, &mut results);
        policy.population[2].victories = 1;
        let best = policy.population[2].point.clone();
        assert_eq!(policy.max_parameter(), Some(best));
        policy.new_generation();
        assert_eq!(policy.max_parameter(), Some(policy.mean().clone()));
    }

    #[test]
    fn selection_constraints_are_validated() {
        let too_big = CrossEntropyConfig {
            selection: 101,
            ..CrossEntropyConfig::default()
        };
        assert_eq!(
            too_big.validate(),
            Err(ConfigError::SelectionExceedsPopulation {
                selection: 101,
                population: 100
            })
        );
        let too_small = CrossEntropyConfig {
            selection: 1,
            ..CrossEntropyConfig::default()
        };
        assert_eq!(too_small.validate(), Err(ConfigError::SelectionTooSmall(1)));
    }
}
