//! Scalar helpers shared by the estimators and the summarizer.

pub use statrs::function::gamma::{digamma, ln_gamma};

/// `ln(1 + e^x)` without overflow.
pub fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// `ln(sigmoid(x))` and `ln(1 - sigmoid(x))`.
pub fn ln_sigmoid_pair(x: f64) -> (f64, f64) {
    (-softplus(-x), -softplus(x))
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Quantile of already-sorted data, linearly interpolating between order
/// statistics at position `(n - 1) * p`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let p = p.clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = h - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Log-density kernel of the improper `(a + b)^(-5/2)` prior over a Beta
/// population's shape pair, and its derivative with respect to `a` (equal to
/// the derivative with respect to `b`).
pub fn beta_pair_potential(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    (-2.5 * s.ln(), -2.5 / s)
}

/// Log-density of a half-normal with scale `sigma`, up to a constant, and its
/// derivative.
pub fn half_normal_kernel(x: f64, sigma: f64) -> (f64, f64) {
    let s2 = sigma * sigma;
    (-0.5 * x * x / s2, -x / s2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_pairs_are_stable_in_tails() {
        let (lp, lq) = ln_sigmoid_pair(800.0);
        assert!(lp.abs() < 1e-12);
        assert!((lq + 800.0).abs() < 1e-9);
        assert!((sigmoid(logit(0.3)) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn linear_quantiles_interpolate() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&xs, 0.5), 3.0);
        assert!((quantile_sorted(&xs, 0.125) - 1.5).abs() < 1e-12);
        assert_eq!(quantile_sorted(&xs, 1.0), 5.0);
    }

    #[test]
    fn potential_penalises_large_concentration() {
        let (small, _) = beta_pair_potential(1.0, 1.0);
        let (large, grad) = beta_pair_potential(50.0, 50.0);
        assert!(large < small);
        assert!(grad < 0.0);
    }
}
