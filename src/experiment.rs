//! The driver that ties a results store, a regression and a policy together.

use crate::estimator::{MaxEstimator, RegressionMapMax};
use crate::observer::{Observer, Results};
use crate::policy::{PolicyContext, SamplingPolicy};
use crate::regression::Regression;
use crate::types::{ConfigError, Outcome};
use ndarray::Array1;

/// One tuning run.
///
/// Every results event reaches the regression first, then the policy, then
/// the extra observers in the order they were added.
pub struct Experiment {
    results: Results,
    regression: Option<Regression>,
    policy: Box<dyn SamplingPolicy + Send>,
    observers: Vec<Box<dyn Observer + Send>>,
}

impl Experiment {
    pub fn new(
        dimensions: usize,
        policy: Box<dyn SamplingPolicy + Send>,
        regression: Option<Regression>,
    ) -> Result<Self, ConfigError> {
        if dimensions == 0 {
            return Err(ConfigError::NoDimensions);
        }
        match &regression {
            Some(regression) if regression.dimensions() != dimensions => {
                return Err(ConfigError::DimensionMismatch {
                    expected: dimensions,
                    found: regression.dimensions(),
                });
            }
            None if policy.needs_regression() => {
                return Err(ConfigError::RegressionRequired("selected"));
            }
            _ => {}
        }
        Ok(Self {
            results: Results::new(dimensions),
            regression,
            policy,
            observers: Vec::new(),
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer + Send>) {
        self.observers.push(observer);
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn regression(&self) -> Option<&Regression> {
        self.regression.as_ref()
    }

    pub fn regression_mut(&mut self) -> Option<&mut Regression> {
        self.regression.as_mut()
    }

    pub fn policy_mut(&mut self) -> &mut (dyn SamplingPolicy + Send) {
        &mut *self.policy
    }

    /// Asks the policy for the next point and records it as pending.
    pub fn next_sample(&mut self) -> (usize, Array1<f64>) {
        let index = self.results.len();
        let point = {
            let mut ctx = PolicyContext::new(&self.results, self.regression.as_mut());
            self.policy.next_sample(index, &mut ctx)
        };
        self.push_sample(point.clone());
        (index, point)
    }

    pub fn report(&mut self, index: usize, outcome: Outcome) {
        self.results.add_outcome(index, outcome);
        self.broadcast(Event::Outcome(index));
    }

    /// Records a point chosen outside the policy together with its outcome.
    ///
    /// Only flexible policies can absorb foreign samples.
    pub fn add_sample_with_outcome(&mut self, point: Array1<f64>, outcome: Outcome) -> usize {
        assert!(
            self.policy.is_flexible(),
            "the policy cannot absorb samples it did not request"
        );
        let index = self.push_sample(point);
        self.report(index, outcome);
        index
    }

    pub fn reset(&mut self) {
        self.results.reset();
        self.broadcast(Event::Reset);
    }

    pub fn refresh(&mut self) {
        self.broadcast(Event::Refresh);
    }

    /// The policy's own estimate when it keeps one, else the regression's.
    pub fn max_parameter(&mut self) -> Option<Array1<f64>> {
        if let Some(estimator) = self.policy.as_max_estimator() {
            return estimator.max_parameter();
        }
        let regression = self.regression.as_mut()?;
        RegressionMapMax::new(regression).max_parameter()
    }

    fn push_sample(&mut self, point: Array1<f64>) -> usize {
        let index = self.results.add_sample(point);
        self.broadcast(Event::Sample);
        index
    }

    fn broadcast(&mut self, event: Event) {
        let results = &self.results;
        if let Some(regression) = self.regression.as_mut() {
            event.deliver(regression, results);
        }
        event.deliver(&mut *self.policy, results);
        for observer in &mut self.observers {
            event.deliver(&mut **observer, results);
        }
    }
}

#[derive(Clone, Copy)]
enum Event {
    Reset,
    Sample,
    Outcome(usize),
    Refresh,
}

impl Event {
    fn deliver<O: Observer + ?Sized>(self, observer: &mut O, results: &Results) {
        match self {
            Event::Reset => observer.on_reset(results),
            Event::Sample => observer.on_sample(results),
            Event::Outcome(index) => observer.on_outcome(results, index),
            Event::Refresh => observer.on_refresh(results),
        }
    }
}
