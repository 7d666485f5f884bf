use ndarray::{Array1, ArrayView1};

/// Compensated summation for long runs of weighted sample totals.
#[derive(Default, Clone, Copy, Debug)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Clamps `x` to `[-max, max]`.
#[inline]
pub(crate) fn bound(x: f64, max: f64) -> f64 {
    if x < -max {
        -max
    } else if x > max {
        max
    } else {
        x
    }
}

/// Clamps every coordinate to the unit box `[-1, 1]`.
pub(crate) fn clamp_to_box(mut x: Array1<f64>) -> Array1<f64> {
    x.mapv_inplace(|v| bound(v, 1.0));
    x
}

/// True when any coordinate sits exactly on the box boundary.
pub(crate) fn on_border(x: ArrayView1<'_, f64>) -> bool {
    x.iter().any(|&v| v == -1.0 || v == 1.0)
}
