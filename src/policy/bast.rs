use super::{PolicyContext, SamplingPolicy, check_index};
use crate::estimator::MaxEstimator;
use crate::observer::{Observer, Results};
use crate::types::{ConfigError, Outcome, require_range};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub fn default_bast_exploration() -> f64 {
    1.0
}

pub fn default_bast_max_depth() -> usize {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BastConfig {
    /// Scale of the `√(ln N / n)` exploration bonus.
    #[serde(default = "default_bast_exploration")]
    pub exploration: f64,
    /// Leaves at this depth are never split and are handed out again.
    #[serde(default = "default_bast_max_depth")]
    pub max_depth: usize,
}

impl Default for BastConfig {
    fn default() -> Self {
        Self {
            exploration: default_bast_exploration(),
            max_depth: default_bast_max_depth(),
        }
    }
}

impl BastConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_range("exploration", self.exploration, 0.0, f64::MAX)
    }
}

#[derive(Clone, Debug)]
struct Node {
    lower: Array1<f64>,
    upper: Array1<f64>,
    depth: usize,
    games: usize,
    victories: usize,
    /// `Unknown` for a leaf that was never played, `InProgress` while its
    /// game is pending, then the reported outcome.
    outcome: Outcome,
    children: Option<[usize; 2]>,
}

impl Node {
    fn centre(&self) -> Array1<f64> {
        (&self.lower + &self.upper) * 0.5
    }
}

/// Bandit search tree over the box.
///
/// Node `n` at depth `k` is split in half along axis `k mod d`. Every request
/// descends from the root, counting a game on each node it passes, and picks
/// the child with the larger `(v + 1)/(n + 2) + e √(ln N / 2(n + 2))` where
/// `v` counts wins only. A fresh leaf is marked in progress and its centre is
/// returned; a leaf that was already handed out is split and the descent
/// continues into its upper half. Because games are counted on the way down,
/// pending requests spread over the tree. Nodes live in one arena and refer
/// to their children by index.
pub struct Bast {
    config: BastConfig,
    dimensions: usize,
    nodes: Vec<Node>,
    paths: HashMap<usize, Vec<usize>>,
    requested: usize,
}

impl Bast {
    pub fn new(dimensions: usize, config: BastConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut bast = Self {
            config,
            dimensions,
            nodes: Vec::new(),
            paths: HashMap::new(),
            requested: 0,
        };
        bast.reset_tree();
        Ok(bast)
    }

    fn reset_tree(&mut self) {
        self.nodes.clear();
        // The root is never sampled itself.
        self.nodes.push(Node {
            lower: Array1::from_elem(self.dimensions, -1.0),
            upper: Array1::from_elem(self.dimensions, 1.0),
            depth: 0,
            games: 0,
            victories: 0,
            outcome: Outcome::InProgress,
            children: None,
        });
        self.paths.clear();
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn split(&mut self, parent: usize) -> [usize; 2] {
        let node = &self.nodes[parent];
        let axis = node.depth % self.dimensions;
        let middle = 0.5 * (node.lower[axis] + node.upper[axis]);
        let mut lower_half = Node {
            lower: node.lower.clone(),
            upper: node.upper.clone(),
            depth: node.depth + 1,
            games: 0,
            victories: 0,
            outcome: Outcome::Unknown,
            children: None,
        };
        let mut upper_half = lower_half.clone();
        lower_half.upper[axis] = middle;
        upper_half.lower[axis] = middle;
        let first = self.nodes.len();
        self.nodes.push(lower_half);
        self.nodes.push(upper_half);
        let children = [first, first + 1];
        self.nodes[parent].children = Some(children);
        children
    }

    /// Child with the larger upper confidence bound; the upper half on ties.
    fn choose(&self, parent: usize, [left, right]: [usize; 2]) -> usize {
        let log_t = 0.5 * (self.nodes[parent].games as f64).ln();
        let e = self.config.exploration;
        let prior = |c: usize| {
            let node = &self.nodes[c];
            (node.victories as f64 + 1.0, node.games as f64 + 2.0)
        };
        let (v0, n0) = prior(left);
        let (v1, n1) = prior(right);
        if n1 * (v0 + e * (log_t * n0).sqrt()) > n0 * (v1 + e * (log_t * n1).sqrt()) {
            left
        } else {
            right
        }
    }

    fn descend(&mut self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = 0;
        loop {
            self.nodes[current].games += 1;
            path.push(current);
            current = match self.nodes[current].children {
                Some(children) => self.choose(current, children),
                None => {
                    let node = &self.nodes[current];
                    if node.outcome == Outcome::Unknown || node.depth >= self.config.max_depth {
                        self.nodes[current].outcome = Outcome::InProgress;
                        return path;
                    }
                    self.split(current)[1]
                }
            };
        }
    }
}

impl Observer for Bast {
    fn on_reset(&mut self, _results: &Results) {
        self.reset_tree();
        self.requested = 0;
    }

    /// Stores the outcome on the leaf and counts a win along the path. An
    /// unknown outcome makes the leaf fresh again.
    fn on_outcome(&mut self, results: &Results, index: usize) {
        let Some(path) = self.paths.remove(&index) else {
            log::warn!("ignoring outcome {index}: not requested from this tree");
            return;
        };
        let outcome = results.outcome(index);
        if let Some(&leaf) = path.last() {
            self.nodes[leaf].outcome = outcome;
        }
        if outcome == Outcome::Win {
            for node in path {
                self.nodes[node].victories += 1;
            }
        }
    }
}

impl SamplingPolicy for Bast {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        check_index(self.requested, index);
        self.requested += 1;
        let path = self.descend();
        let leaf = path[path.len() - 1];
        self.paths.insert(index, path);
        self.nodes[leaf].centre()
    }

    fn is_flexible(&self) -> bool {
        false
    }

    // Deterministic.
    fn seed(&mut self, _seed: u64) {}

    fn as_max_estimator(&mut self) -> Option<&mut dyn MaxEstimator> {
        Some(self)
    }
}

impl MaxEstimator for Bast {
    /// Follows the better raw win rate (the lower half on exact ties) while
    /// the node has won and both children have been played with at least one
    /// win between them, and reports the centre of the last node.
    fn max_parameter(&mut self) -> Option<Array1<f64>> {
        let mut current = 0;
        while let Some([left, right]) = self.nodes[current].children {
            let (node, a, b) = (&self.nodes[current], &self.nodes[left], &self.nodes[right]);
            if node.victories == 0 || a.games == 0 || b.games == 0 || a.victories + b.victories == 0 {
                break;
            }
            let (v0, n0) = (a.victories as f64, a.games as f64);
            let (v1, n1) = (b.victories as f64, b.games as f64);
            current = if v1 * n0 > v0 * n1 { right } else { left };
        }
        Some(self.nodes[current].centre())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn request(bast: &mut Bast, results: &mut Results) -> (usize, Array1<f64>) {
        let index = results.len();
        let x = {
            let mut ctx = PolicyContext::new(results, None);
            bast.next_sample(index, &mut ctx)
        };
        results.add_sample(x.clone());
        (index, x)
    }

    fn report(bast: &mut Bast, results: &mut Results, index: usize, outcome: Outcome) {
        results.add_outcome(index, outcome);
        bast.on_outcome(results, index);
    }

    #[test]
    fn splits_alternate_axes() {
        let mut bast = Bast::new(2, BastConfig::default()).expect("valid");
        let [a, _] = bast.split(0);
        assert_eq!(bast.nodes[a].upper, array![0.0, 1.0]);
        let [c, d] = bast.split(a);
        assert_eq!(bast.nodes[c].upper, array![0.0, 0.0]);
        assert_eq!(bast.nodes[d].lower, array![-1.0, 0.0]);
    }

    #[test]
    fn max_parameter_with_no_data_is_the_centre() {
        let mut bast = Bast::new(3, BastConfig::default()).expect("valid");
        assert_eq!(bast.max_parameter(), Some(Array1::zeros(3)));
    }

    #[test]
    fn samples_are_cell_centres_starting_in_the_upper_half() {
        let mut bast = Bast::new(1, BastConfig::default()).expect("valid");
        let mut results = Results::new(1);
        let (i, x) = request(&mut bast, &mut results);
        assert_eq!(x, array![0.5]);
        report(&mut bast, &mut results, i, Outcome::Draw);
        let (_, y) = request(&mut bast, &mut results);
        assert_eq!(y, array![-0.5]);
        assert_eq!(bast.nodes[0].games, 2);
        assert_eq!(bast.nodes[0].victories, 0);
    }

    #[test]
    fn pending_requests_spread_over_both_halves() {
        let mut bast = Bast::new(1, BastConfig::default()).expect("valid");
        let mut results = Results::new(1);
        let (first, _) = request(&mut bast, &mut results);
        report(&mut bast, &mut results, first, Outcome::Win);
        let points: Vec<f64> = (0..6).map(|_| request(&mut bast, &mut results).1[0]).collect();
        assert!(points.iter().any(|&x| x < 0.0), "{points:?}");
        assert!(points.iter().any(|&x| x > 0.0), "{points:?}");
        let mut distinct = points.clone();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();
        assert_eq!(distinct.len(), points.len(), "{points:?}");
    }

    #[test]
    fn only_wins_count_as_victories() {
        let mut bast = Bast::new(1, BastConfig::default()).expect("valid");
        let mut results = Results::new(1);
        for outcome in [Outcome::Win, Outcome::Draw, Outcome::Loss] {
            let (i, _) = request(&mut bast, &mut results);
            report(&mut bast, &mut results, i, outcome);
        }
        assert_eq!(bast.nodes[0].games, 3);
        assert_eq!(bast.nodes[0].victories, 1);
    }

    #[test]
    fn an_unknown_outcome_frees_the_leaf() {
        let mut bast = Bast::new(1, BastConfig::default()).expect("valid");
        let mut results = Results::new(1);
        let (i, x) = request(&mut bast, &mut results);
        report(&mut bast, &mut results, i, Outcome::Unknown);
        let leaf = bast.nodes.len() - 1;
        assert_eq!(bast.nodes[leaf].outcome, Outcome::Unknown);
        assert_eq!(bast.nodes[0].victories, 0);
        // The lower half is still cheaper to try, but the freed leaf is
        // reused rather than split once its turn comes.
        let (_, y) = request(&mut bast, &mut results);
        assert_ne!(x, y);
        let (_, z) = request(&mut bast, &mut results);
        assert_eq!(z, x);
        assert_eq!(bast.node_count(), 3);
    }
}
