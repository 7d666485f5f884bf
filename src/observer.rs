//! Append-only sample history and the notifications that keep derived
//! state in sync with it.

use crate::types::{ALL_OUTCOMES, Outcome};
use ndarray::{Array1, ArrayView1};

/// Parameter vectors tried so far and their outcomes, indexed from 0.
#[derive(Clone, Debug)]
pub struct Results {
    dimensions: usize,
    samples: Vec<Array1<f64>>,
    outcomes: Vec<Outcome>,
    tally: [usize; ALL_OUTCOMES],
}

impl Results {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            samples: Vec::new(),
            outcomes: Vec::new(),
            tally: [0; ALL_OUTCOMES],
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends a pending sample and returns its index.
    pub fn add_sample(&mut self, point: Array1<f64>) -> usize {
        assert_eq!(
            point.len(),
            self.dimensions,
            "sample has {} coordinates, results store has {}",
            point.len(),
            self.dimensions
        );
        self.samples.push(point);
        self.outcomes.push(Outcome::InProgress);
        self.tally[Outcome::InProgress.index()] += 1;
        self.samples.len() - 1
    }

    /// Resolves a pending sample. Each index is resolved exactly once.
    pub fn add_outcome(&mut self, index: usize, outcome: Outcome) {
        assert!(index < self.len(), "outcome for unknown sample {index}");
        assert_eq!(
            self.outcomes[index],
            Outcome::InProgress,
            "sample {index} already has an outcome"
        );
        assert_ne!(outcome, Outcome::InProgress, "cannot resolve sample {index} to InProgress");
        self.tally[Outcome::InProgress.index()] -= 1;
        self.tally[outcome.index()] += 1;
        self.outcomes[index] = outcome;
    }

    pub fn sample(&self, index: usize) -> ArrayView1<'_, f64> {
        self.samples[index].view()
    }

    pub fn outcome(&self, index: usize) -> Outcome {
        self.outcomes[index]
    }

    /// Number of samples with `outcome` among indices `min_index..`.
    pub fn count_outcomes(&self, outcome: Outcome, min_index: usize) -> usize {
        if min_index == 0 {
            return self.tally[outcome.index()];
        }
        self.outcomes
            .iter()
            .skip(min_index)
            .filter(|&&o| o == outcome)
            .count()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.outcomes.clear();
        self.tally = [0; ALL_OUTCOMES];
    }
}

/// Receiver of results-stream events.
///
/// The driver calls `on_sample` once per appended sample and `on_outcome`
/// once per resolved index, after the store itself has been updated.
pub trait Observer {
    fn on_reset(&mut self, _results: &Results) {}

    fn on_sample(&mut self, _results: &Results) {}

    fn on_outcome(&mut self, _results: &Results, _index: usize) {}

    fn on_refresh(&mut self, _results: &Results) {}
}
