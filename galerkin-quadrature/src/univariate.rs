//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{check_degree, gauss_points_for_degree, Error, Rule};
use std::f64::consts::PI;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x`.
///
/// The derivative formula is singular at `|x| == 1`, so this is only used in the open interval.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
    let mut p_current = 1.0;
    let mut p_previous = 0.0;
    for m in 1..=n {
        let m = m as f64;
        let p_next = ((2.0 * m - 1.0) * x * p_current - (m - 1.0) * p_previous) / m;
        p_previous = p_current;
        p_current = p_next;
    }
    let n = n as f64;
    let derivative = n * (x * p_current - p_previous) / (x * x - 1.0);
    (p_current, derivative)
}

/// Gauss–Legendre quadrature with the given number of points.
///
/// Given `n` points, the rule integrates polynomials of degree up to `2n - 1` exactly.
/// Points are returned in ascending order.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Roots are symmetric about the origin, so only the upper half is computed
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = legendre(n, x).1;
        for _ in 0..100 {
            let (p, p_prime) = legendre(n, x);
            let dx = p / p_prime;
            x -= dx;
            dp = p_prime;
            if dx.abs() <= 1e-15 {
                dp = legendre(n, x).1;
                break;
            }
        }

        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[n - 1 - i] = [x];
        points[i] = [-x];
        weights[n - 1 - i] = w;
        weights[i] = w;
    }

    (weights, points)
}

/// The Gauss rule with the fewest points that integrates polynomials of degree `degree` exactly.
pub fn segment(degree: usize) -> Result<Rule<1>, Error> {
    check_degree(degree)?;
    Ok(gauss(gauss_points_for_degree(degree)))
}
