use super::{PolicyContext, SamplingPolicy};
use crate::observer::Observer;
use ndarray::Array1;
use rand::{RngExt, SeedableRng, rngs::StdRng};

/// Independent uniform draws from the box.
pub struct Uniform {
    dimensions: usize,
    rng: StdRng,
}

impl Uniform {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn draw(&mut self) -> Array1<f64> {
        Array1::from_shape_fn(self.dimensions, |_| self.rng.random_range(-1.0..=1.0))
    }
}

impl Observer for Uniform {}

impl SamplingPolicy for Uniform {
    fn next_sample(&mut self, _index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        self.draw()
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Results;

    #[test]
    fn draws_stay_in_the_box_and_follow_the_seed() {
        let results = Results::new(3);
        let mut ctx = PolicyContext::new(&results, None);
        let mut a = Uniform::new(3);
        let mut b = Uniform::new(3);
        a.seed(5);
        b.seed(5);
        for i in 0..200 {
            let x = a.next_sample(i, &mut ctx);
            assert!(x.iter().all(|v| (-1.0..=1.0).contains(v)));
            assert_eq!(x, b.next_sample(i, &mut ctx));
        }
    }
}
