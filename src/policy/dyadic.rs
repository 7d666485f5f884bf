use super::{PolicyContext, SamplingPolicy};
use crate::observer::Observer;
use ndarray::Array1;

/// Deterministic space-filling sequence of dyadic cell centres.
///
/// Level `l` splits every axis into `2^l` cells and visits all `2^(l d)`
/// cell centres before moving on to level `l + 1`. Within a level the bits
/// of the cell counter are dealt to the axes most significant bit first, so
/// consecutive points land far apart.
pub struct Dyadic {
    dimensions: usize,
}

impl Dyadic {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// The `index`-th point of the sequence.
    pub fn point(&self, index: usize) -> Array1<f64> {
        let d = self.dimensions as u32;
        let mut remaining = index as u128;
        let mut level = 0u32;
        loop {
            let cells = 1u128.checked_shl(level * d).unwrap_or(u128::MAX);
            if remaining < cells {
                break;
            }
            remaining -= cells;
            level += 1;
        }
        let mut coords = vec![0u128; self.dimensions];
        for bit in 0..level * d {
            if remaining >> bit & 1 == 1 {
                let axis = (bit % d) as usize;
                let position = level - 1 - bit / d;
                coords[axis] |= 1 << position;
            }
        }
        let width = (level as f64).exp2();
        Array1::from_iter(coords.into_iter().map(|c| -1.0 + (2.0 * c as f64 + 1.0) / width))
    }
}

impl Observer for Dyadic {}

impl SamplingPolicy for Dyadic {
    fn next_sample(&mut self, index: usize, _ctx: &mut PolicyContext<'_>) -> Array1<f64> {
        self.point(index)
    }

    fn seed(&mut self, _seed: u64) {}
}
