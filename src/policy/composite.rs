use super::{PolicyContext, SamplingPolicy};
use crate::estimator::MaxEstimator;
use crate::observer::{Observer, Results};
use ndarray::Array1;

/// Runs `first` for the first `switch_at` samples, then `second`.
///
/// Both policies see every results event, so the second one starts with the
/// full history.
pub struct Composite {
    first: Box<dyn SamplingPolicy + Send>,
    second: Box<dyn SamplingPolicy + Send>,
    switch_at: usize,
    requested: usize,
}

impl Composite {
    pub fn new(
        first: Box<dyn SamplingPolicy + Send>,
        second: Box<dyn SamplingPolicy + Send>,
        switch_at: usize,
    ) -> Self {
        Self {
            first,
            second,
            switch_at,
            requested: 0,
        }
    }

    fn active(&mut self) -> &mut (dyn SamplingPolicy + Send) {
        if self.requested < self.switch_at {
            &mut *self.first
        } else {
            &mut *self.second
        }
    }
}

impl Observer for Composite {
    fn on_reset(&mut self, results: &Results) {
        self.requested = results.len();
        self.first.on_reset(results);
        self.second.on_reset(results);
    }

    fn on_sample(&mut self, results: &Results) {
        self.first.on_sample(results);
        self.second.on_sample(results);
    }

    fn on_outcome(&mut self, results: &Results, index: usize) {
        self.first.on_outcome(results, index);
        self.second.on_outcome(results, index);
    }

    fn on_refresh(&mut self, results: &Results) {
        self.first.on_refresh(results);
        self.second.on_refresh(results);
    }
}

impl SamplingPolicy for Composite {
    fn next_sample(&mut self, index: usize, ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        let x = self.active().next_sample(index, ctx);
        self.requested = index + 1;
        x
    }

    fn is_flexible(&self) -> bool {
        self.first.is_flexible() && self.second.is_flexible()
    }

    fn seed(&mut self, seed: u64) {
        self.first.seed(seed);
        self.second.seed(seed.wrapping_add(1));
    }

    fn as_max_estimator(&mut self) -> Option<&mut dyn MaxEstimator> {
        self.active().as_max_estimator()
    }

    fn needs_regression(&self) -> bool {
        self.first.needs_regression() || self.second.needs_regression()
    }
}
