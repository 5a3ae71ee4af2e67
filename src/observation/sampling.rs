//! Poisson random variates.
//!
//! Small rates use Knuth's multiplication method; rates at or above
//! [`PTRS_THRESHOLD`] use Hörmann's transformed rejection (PTRS), whose cost
//! does not grow with the rate.

use rand::Rng;

use crate::math::ln_gamma;

const PTRS_THRESHOLD: f64 = 30.0;

/// Draw one Poisson(`lambda`) count. Non-positive or non-finite rates yield 0.
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    if !(lambda > 0.0) || !lambda.is_finite() {
        return 0;
    }
    if lambda < PTRS_THRESHOLD {
        knuth(rng, lambda)
    } else {
        ptrs(rng, lambda)
    }
}

fn knuth<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    let limit = (-lambda).exp();
    let mut k = 0;
    let mut p: f64 = rng.gen();
    while p > limit {
        k += 1;
        p *= rng.gen::<f64>();
    }
    k
}

fn ptrs<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    let slam = lambda.sqrt();
    let loglam = lambda.ln();
    let b = 0.931 + 2.53 * slam;
    let a = -0.059 + 0.02483 * b;
    let inv_alpha = 1.1239 + 1.1328 / (b - 3.4);
    let vr = 0.9277 - 3.6224 / (b - 2.0);

    loop {
        let u = rng.gen::<f64>() - 0.5;
        let v: f64 = rng.gen();
        let us = 0.5 - u.abs();
        let k = ((2.0 * a / us + b) * u + lambda + 0.43).floor();

        if us >= 0.07 && v <= vr {
            return k as u64;
        }
        if k < 0.0 || (us < 0.013 && v > us) {
            continue;
        }
        let lhs = v.ln() + inv_alpha.ln() - (a / (us * us) + b).ln();
        let rhs = -lambda + k * loglam - ln_gamma(k + 1.0);
        if lhs <= rhs {
            return k as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_and_var(lambda: f64, n: usize) -> (f64, f64) {
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f64> = (0..n).map(|_| sample_poisson(&mut rng, lambda) as f64).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        (mean, var)
    }

    #[test]
    fn test_small_rate_moments() {
        let (mean, var) = mean_and_var(2.5, 20_000);
        assert!((mean - 2.5).abs() < 0.1, "mean {mean}");
        assert!((var - 2.5).abs() < 0.2, "var {var}");
    }

    #[test]
    fn test_large_rate_moments() {
        let (mean, var) = mean_and_var(80.0, 20_000);
        assert!((mean - 80.0).abs() < 0.5, "mean {mean}");
        assert!((var - 80.0).abs() < 5.0, "var {var}");
    }

    #[test]
    fn test_degenerate_rates() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_poisson(&mut rng, 0.0), 0);
        assert_eq!(sample_poisson(&mut rng, f64::NAN), 0);
        assert_eq!(sample_poisson(&mut rng, -1.0), 0);
    }
}
