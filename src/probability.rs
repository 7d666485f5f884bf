use rand_distr::StandardNormal;

/// Logistic sigmoid f(x) = 1 / (1 + e^-x).
#[inline]
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// f(x1) - f(x0), evaluated on the side of the curve that keeps precision.
#[inline]
pub fn logistic_difference(x1: f64, x0: f64) -> f64 {
    if x1 < 0.0 {
        logistic(x1) - logistic(x0)
    } else {
        logistic(-x0) - logistic(-x1)
    }
}

/// f'(x) = 1 / (e^{x/2} + e^{-x/2})².
#[inline]
pub fn logistic_derivative(x: f64) -> f64 {
    let h = 0.5 * x;
    let s = h.exp() + (-h).exp();
    1.0 / (s * s)
}

/// Inverse sigmoid (logit) for p in (0, 1).
#[inline]
pub fn logistic_inverse(p: f64) -> f64 {
    -(1.0 / p - 1.0).ln()
}

/// One N(0, 1) draw.
#[inline]
pub fn standard_normal<R: rand::Rng + ?Sized>(rng: &mut R) -> f64 {
    rand_distr::Distribution::sample(&StandardNormal, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sigmoid_is_antisymmetric_around_half() {
        for &x in &[-30.0, -7.5, -1.0, -1e-3, 0.0, 0.25, 3.0, 12.0, 40.0] {
            assert_abs_diff_eq!(logistic(x) + logistic(-x), 1.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn inverse_recovers_the_argument() {
        for &x in &[-8.0, -2.5, -0.1, 0.0, 0.7, 4.0, 9.0] {
            assert_abs_diff_eq!(logistic_inverse(logistic(x)), x, epsilon = 1e-9);
        }
    }

    #[test]
    fn derivative_matches_closed_form() {
        for &x in &[-5.0, -0.3, 0.0, 1.1, 6.0] {
            let s = logistic(x);
            assert_abs_diff_eq!(logistic_derivative(x), s * (1.0 - s), epsilon = 1e-14);
        }
    }

    #[test]
    fn difference_stays_accurate_in_the_upper_tail() {
        let stable = logistic_difference(35.0, 34.0);
        let exact = (-34.0f64).exp() / (1.0 + (-34.0f64).exp())
            - (-35.0f64).exp() / (1.0 + (-35.0f64).exp());
        assert!(stable > 0.0);
        assert_abs_diff_eq!(stable / exact, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            logistic_difference(0.5, -0.5),
            logistic(0.5) - logistic(-0.5),
            epsilon = 1e-15
        );
    }
}
